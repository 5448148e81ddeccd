//! Error types for capture planning, stitching and pagination

use thiserror::Error;

/// Result type alias for scrollstitch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing, stitching or paginating
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid page or viewport dimensions; aborts planning before any capture
    #[error("Invalid page geometry: {0}")]
    Geometry(String),

    /// The viewport is too wide to rasterize at any positive device pixel ratio
    #[error("Capture too wide: {viewport_width}px viewport exceeds the {max_dimension}px limit")]
    CaptureTooWide {
        viewport_width: u32,
        max_dimension: u32,
    },

    /// Not even a single viewport fits the raster limits after DPR reduction
    #[error(
        "Page too large: {w}x{h} viewport, max dimension {max_dimension}px, max area {max_area}",
        w = .viewport_width,
        h = .viewport_height
    )]
    PageTooLarge {
        viewport_width: u32,
        viewport_height: u32,
        max_dimension: u32,
        max_area: u64,
    },

    /// A viewport capture could not be composited into its segment
    #[error("Stitching failed: {0}")]
    StitchFailed(String),

    /// Raster pixels cannot be inspected (pagination degrades instead of failing)
    #[error("Pixel data unavailable: {0}")]
    PixelReadUnavailable(String),

    /// The capture-acquisition collaborator failed to scroll or capture
    #[error("Capture failed: {0}")]
    Capture(String),

    /// The capture was cancelled at a suspension point
    #[error("Capture cancelled: {0}")]
    Cancelled(String),

    /// Segment persistence failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Image decoding or encoding failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error reports a violated raster size limit.
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Error::CaptureTooWide { .. } | Error::PageTooLarge { .. })
    }

    /// Recoverable errors only degrade output quality and never abort an export.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::PixelReadUnavailable(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(format!("metadata (de)serialization failed: {}", err))
    }
}

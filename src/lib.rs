//! scrollstitch
//!
//! Assembles independently captured viewport rasters of a scrollable page
//! into size-bounded segment images, then re-paginates finished rasters into
//! print-ready pages without cutting through lines of text.
//!
//! # Features
//!
//! - **Planning**: scroll offsets and raster-limit aware capture segments
//! - **Stitching**: seam-free compositing of overlapping viewport captures
//! - **Pagination**: page cuts placed on detected whitespace bands, with a
//!   footer reservation and an overlap fallback for pages with no clean cut
//! - **Pipeline**: an async capture task with one in-flight stitch and atomic
//!   discard on failure
//!
//! # Example
//!
//! ```
//! use scrollstitch::{plan_capture, PageGeometry, RasterLimits};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let geometry = PageGeometry {
//!     total_height: 12000,
//!     viewport_width: 1280,
//!     viewport_height: 720,
//!     device_pixel_ratio: 2.0,
//! };
//!
//! let (strategy, segments) = plan_capture(&geometry, &RasterLimits::default())?;
//! assert!(strategy.effective_dpr > 0.0);
//! assert_eq!(segments[0].start_y, 0);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

// Scroll offsets and segment partitioning
pub mod planning;

// Viewport compositing within a segment
pub mod stitch;

// Whitespace-aware pagination, page layout and page composition
pub mod paginate;

// Persistence collaborator: segment blobs keyed by capture id + index
pub mod store;

// Async capture pipeline driving a `CaptureSource`
pub mod capture;

pub use capture::{capture_page, CancelFlag, CaptureOutcome};
pub use paginate::{
    paginate, paginate_segments, PageFormat, PagePlacement, PageSlice, PageSpec, PaginationPlan,
    RasterSource, WhitespaceBand,
};
pub use planning::{
    build_capture_segments, plan_capture, plan_scroll_positions, CaptureStrategy, Segment,
};
pub use stitch::{SegmentCanvas, StitchCursor};
pub use store::{DirStore, MemoryStore, SegmentMeta, SegmentRaster, SegmentStore};

/// Geometry of the page being captured
///
/// Heights and widths are CSS pixels. The geometry is fixed once a capture
/// starts; a page that changes height mid-capture is captured at the height
/// reported up front.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Full scrollable height of the document
    pub total_height: u32,
    /// Width of the visible viewport
    pub viewport_width: u32,
    /// Height of the visible viewport
    pub viewport_height: u32,
    /// Native device pixel ratio of the display
    pub device_pixel_ratio: f64,
}

impl PageGeometry {
    /// Reject geometry that cannot be planned.
    pub fn validate(&self) -> Result<()> {
        if self.total_height == 0 {
            return Err(Error::Geometry("total height must be positive".into()));
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(Error::Geometry(format!(
                "viewport must be positive, got {}x{}",
                self.viewport_width, self.viewport_height
            )));
        }
        if !self.device_pixel_ratio.is_finite() || self.device_pixel_ratio <= 0.0 {
            return Err(Error::Geometry(format!(
                "device pixel ratio must be a positive number, got {}",
                self.device_pixel_ratio
            )));
        }
        Ok(())
    }
}

/// Platform raster caps
///
/// Canvas backends limit both a single dimension and the total pixel area of
/// a raster. The defaults match the common browser limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterLimits {
    /// Maximum width or height of one raster, in physical pixels
    pub max_dimension: u32,
    /// Maximum `width * height` of one raster, in physical pixels
    pub max_area: u64,
}

impl Default for RasterLimits {
    fn default() -> Self {
        Self {
            max_dimension: 32_767,
            max_area: 268_435_456,
        }
    }
}

/// Configuration for a capture run
///
/// # Examples
///
/// ```
/// let cfg = scrollstitch::CaptureConfig::default();
/// assert_eq!(cfg.limits.max_dimension, 32_767);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Identifier segments are persisted under
    pub capture_id: String,
    /// Raster caps the segments must respect
    pub limits: RasterLimits,
    /// Delay after each scroll before capturing, in milliseconds
    pub scroll_settle_ms: u64,
    /// Minimum interval between two captures (host rate limit), in milliseconds
    pub min_capture_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_id: "capture".to_string(),
            limits: RasterLimits::default(),
            scroll_settle_ms: 100,
            min_capture_interval_ms: 500,
        }
    }
}

/// The capture-acquisition collaborator
///
/// Implementations talk to whatever hosts the page (a browser tab, a
/// headless engine, a fixture). Calls are made from a dedicated worker
/// thread, strictly one at a time, in increasing scroll order.
pub trait CaptureSource: Send + 'static {
    /// Report the geometry of the page to capture
    fn geometry(&mut self) -> Result<PageGeometry>;

    /// Scroll so the viewport's top edge sits at `y` CSS pixels and return
    /// once the host confirms the scroll has completed
    fn scroll_to(&mut self, y: u32) -> Result<()>;

    /// Capture the currently visible viewport at native device pixel ratio
    fn capture_viewport(&mut self) -> Result<image::RgbaImage>;

    /// Restore the page after capture (scroll position, hidden overlays).
    /// Called once whether the capture succeeded or not.
    fn restore(&mut self) -> Result<()> {
        Ok(())
    }
}

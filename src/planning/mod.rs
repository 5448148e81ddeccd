//! Capture planning: which scroll offsets to visit and how they group into
//! raster-limit bounded segments.

pub mod scroll;
pub mod segment;

pub use scroll::plan_scroll_positions;
pub use segment::{build_capture_segments, physical_edge, plan_capture, CaptureStrategy, Segment};

//! Raster-limit aware capture segments
//!
//! A page taller than one raster can hold is captured as several segments.
//! The device pixel ratio is the only input that can be reduced without
//! distorting the output, so it absorbs both the dimension and the area cap.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::scroll::plan_scroll_positions;
use crate::{Error, PageGeometry, RasterLimits, Result};

/// Lowest DPR a capture is rendered at unless the limits force it lower
const MIN_PREFERRED_DPR: f64 = 0.5;

/// How a page is rasterized into segments
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureStrategy {
    /// DPR actually used for rasterization (3 decimals)
    pub effective_dpr: f64,
    /// Tallest segment, in CSS pixels, that fits the raster limits
    pub max_segment_height_css: u32,
    /// Number of scroll positions grouped into one segment
    pub viewports_per_segment: usize,
}

impl CaptureStrategy {
    /// Physical pixel size of a raster covering `width_css` x `height_css`.
    pub fn physical_size(&self, width_css: u32, height_css: u32) -> (u32, u32) {
        (
            physical_edge(width_css as f64, self.effective_dpr).max(0) as u32,
            physical_edge(height_css as f64, self.effective_dpr).max(0) as u32,
        )
    }
}

/// Physical row or column of a CSS coordinate at `dpr`.
///
/// Edges are floored so a raster never outgrows the size checked against the
/// limits, and adjacent spans tile without gaps. The product is snapped to a
/// micro-pixel grid first so float noise (`1001 * 1.25`) cannot move an edge.
pub fn physical_edge(css: f64, dpr: f64) -> i64 {
    ((css * dpr * 1e6).round() / 1e6).floor() as i64
}

/// One independently rasterized vertical slice of the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// 0-based, contiguous
    pub index: usize,
    /// Index of `positions[0]` within the full scroll plan
    pub start_position_index: usize,
    /// Scroll offsets captured into this segment
    pub positions: Vec<u32>,
    /// Page-space top edge, CSS px
    pub start_y: u32,
    /// Page-space bottom edge (exclusive), CSS px
    pub end_y: u32,
}

impl Segment {
    pub fn height(&self) -> u32 {
        self.end_y - self.start_y
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn floor3(v: f64) -> f64 {
    (v * 1000.0).floor() / 1000.0
}

/// Plan the capture of a page: effective DPR, segment height and the
/// segments themselves.
pub fn plan_capture(
    geometry: &PageGeometry,
    limits: &RasterLimits,
) -> Result<(CaptureStrategy, Vec<Segment>)> {
    geometry.validate()?;
    if limits.max_dimension == 0 || limits.max_area == 0 {
        return Err(Error::Config("raster limits must be positive".into()));
    }

    let vw = geometry.viewport_width as f64;
    let vh = geometry.viewport_height as f64;
    let max_dim = limits.max_dimension as f64;
    let max_area = limits.max_area as f64;

    let width_cap = max_dim / vw;
    let clamped = geometry.device_pixel_ratio.max(MIN_PREFERRED_DPR).min(width_cap);
    let mut dpr = round3(clamped);
    if dpr * vw > max_dim {
        dpr = floor3(clamped);
    }
    if dpr <= 0.0 {
        return Err(Error::CaptureTooWide {
            viewport_width: geometry.viewport_width,
            max_dimension: limits.max_dimension,
        });
    }

    // A single viewport must always fit, otherwise no segment can be drawn.
    let viewport_cap = (max_dim / vh).min((max_area / (vw * vh)).sqrt());
    if dpr > viewport_cap {
        let reduced = floor3(viewport_cap);
        debug!("Reducing DPR from {} to {} so one viewport fits the raster limits", dpr, reduced);
        dpr = reduced;
    }
    if dpr <= 0.0 {
        return Err(page_too_large(geometry, limits));
    }

    let by_dimension = max_dim / dpr;
    let by_area = max_area / (vw * dpr * dpr);
    let max_segment_height = vh.max(by_dimension.min(by_area)).floor();
    if max_segment_height <= 0.0 {
        return Err(page_too_large(geometry, limits));
    }
    let mut max_segment_height_css = max_segment_height.min(u32::MAX as f64) as u32;

    // The real-valued caps above can still be off by a row once edges are
    // snapped to whole pixels; settle on a height whose raster really fits.
    let width_px = physical_edge(vw, dpr).max(0) as u64;
    let fits = |height_css: u32| {
        let height_px = physical_edge(height_css as f64, dpr).max(0) as u64;
        width_px <= limits.max_dimension as u64
            && height_px <= limits.max_dimension as u64
            && width_px * height_px <= limits.max_area
    };
    while max_segment_height_css > geometry.viewport_height && !fits(max_segment_height_css) {
        max_segment_height_css -= 1;
    }
    if !fits(max_segment_height_css) {
        return Err(page_too_large(geometry, limits));
    }
    let viewports_per_segment =
        ((max_segment_height_css / geometry.viewport_height) as usize).max(1);

    let strategy = CaptureStrategy {
        effective_dpr: dpr,
        max_segment_height_css,
        viewports_per_segment,
    };

    let positions = plan_scroll_positions(geometry.total_height, geometry.viewport_height);
    let segments = build_capture_segments(
        &positions,
        viewports_per_segment,
        geometry.total_height,
        geometry.viewport_height,
    );

    info!(
        "Planned {} scroll positions in {} segment(s) at DPR {} ({} viewports per segment)",
        positions.len(),
        segments.len(),
        dpr,
        viewports_per_segment
    );

    Ok((strategy, segments))
}

fn page_too_large(geometry: &PageGeometry, limits: &RasterLimits) -> Error {
    Error::PageTooLarge {
        viewport_width: geometry.viewport_width,
        viewport_height: geometry.viewport_height,
        max_dimension: limits.max_dimension,
        max_area: limits.max_area,
    }
}

/// Group scroll offsets into consecutive segments of `viewports_per_segment`
/// entries.
///
/// Segment edges are kept strictly contiguous: a segment whose first capture
/// starts above the previous segment's end has its `start_y` clamped to that
/// end. The stitcher crops the rows above `start_y` from that capture.
pub fn build_capture_segments(
    positions: &[u32],
    viewports_per_segment: usize,
    total_height: u32,
    viewport_height: u32,
) -> Vec<Segment> {
    let per_segment = viewports_per_segment.max(1);
    let mut segments = Vec::with_capacity(positions.len().div_ceil(per_segment));
    let mut prev_end = 0u32;

    for (index, chunk) in positions.chunks(per_segment).enumerate() {
        let first = chunk[0];
        let last = chunk[chunk.len() - 1];
        let end_y = total_height.min(last.saturating_add(viewport_height));
        let start_y = if index == 0 { first } else { first.max(prev_end).min(end_y) };

        segments.push(Segment {
            index,
            start_position_index: index * per_segment,
            positions: chunk.to_vec(),
            start_y,
            end_y,
        });
        prev_end = end_y;
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(total: u32, vw: u32, vh: u32, dpr: f64) -> PageGeometry {
        PageGeometry {
            total_height: total,
            viewport_width: vw,
            viewport_height: vh,
            device_pixel_ratio: dpr,
        }
    }

    #[test]
    fn segments_are_clamped_contiguous() {
        let segments = build_capture_segments(&[0, 1000, 1500], 2, 2500, 1000);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].positions, vec![0, 1000]);
        assert_eq!((segments[0].start_y, segments[0].end_y), (0, 2000));
        assert_eq!(segments[1].positions, vec![1500]);
        assert_eq!(segments[1].start_position_index, 2);
        assert_eq!((segments[1].start_y, segments[1].end_y), (2000, 2500));
        assert_eq!(segments[1].height(), 500);
    }

    #[test]
    fn small_page_keeps_native_dpr() {
        let (strategy, segments) =
            plan_capture(&geometry(3000, 1280, 800, 2.0), &RasterLimits::default()).unwrap();
        assert_eq!(strategy.effective_dpr, 2.0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end_y, 3000);
    }

    #[test]
    fn wide_viewport_reduces_dpr() {
        let limits = RasterLimits {
            max_dimension: 4000,
            max_area: u64::MAX / 4,
        };
        let (strategy, _) = plan_capture(&geometry(1000, 3000, 500, 2.0), &limits).unwrap();
        assert_eq!(strategy.effective_dpr, 1.333);
        assert!(strategy.effective_dpr * 3000.0 <= 4000.0);
    }

    #[test]
    fn low_native_dpr_is_raised_to_half() {
        let (strategy, _) =
            plan_capture(&geometry(1000, 800, 600, 0.25), &RasterLimits::default()).unwrap();
        assert_eq!(strategy.effective_dpr, 0.5);
    }

    #[test]
    fn area_cap_splits_tall_pages() {
        let limits = RasterLimits {
            max_dimension: 32_767,
            max_area: 16_000_000,
        };
        let (strategy, segments) =
            plan_capture(&geometry(40_000, 1000, 1000, 2.0), &limits).unwrap();
        assert_eq!(strategy.effective_dpr, 2.0);
        // 16e6 / (1000 * 4) = 4000 CSS px
        assert_eq!(strategy.max_segment_height_css, 4000);
        assert_eq!(strategy.viewports_per_segment, 4);
        assert_eq!(segments.len(), 10);
    }

    #[test]
    fn fractional_dpr_rasters_fit_the_area_cap() {
        let limits = RasterLimits {
            max_dimension: 32_767,
            max_area: 1_000_003,
        };
        let (strategy, segments) = plan_capture(&geometry(20_000, 333, 333, 0.5), &limits).unwrap();
        for segment in &segments {
            let (w, h) = strategy.physical_size(333, segment.height());
            assert!(w as u64 * h as u64 <= limits.max_area, "{}x{} raster", w, h);
        }
        let (w, h) = strategy.physical_size(333, strategy.max_segment_height_css);
        assert!(w as u64 * h as u64 <= limits.max_area);
    }

    #[test]
    fn physical_edges_tile() {
        assert_eq!(physical_edge(1001.0, 1.25), 1251);
        assert_eq!(physical_edge(2002.0, 1.25), 2502);
        assert_eq!(physical_edge(-5.0, 1.25), -7);
        assert_eq!(physical_edge(3000.0, 1.333), 3999);
    }

    #[test]
    fn oversized_viewport_shrinks_dpr_to_fit() {
        let limits = RasterLimits {
            max_dimension: 32_767,
            max_area: 1_000_000,
        };
        let (strategy, _) = plan_capture(&geometry(5000, 1000, 1000, 2.0), &limits).unwrap();
        assert_eq!(strategy.effective_dpr, 1.0);
        assert_eq!(strategy.viewports_per_segment, 1);
    }

    #[test]
    fn absurdly_wide_viewport_is_rejected() {
        let limits = RasterLimits {
            max_dimension: 10,
            max_area: 1_000_000,
        };
        let err = plan_capture(&geometry(100, 100_000, 100, 1.0), &limits).unwrap_err();
        assert!(matches!(err, Error::CaptureTooWide { .. }));
    }

    #[test]
    fn invalid_geometry_is_rejected_before_planning() {
        let err = plan_capture(&geometry(0, 800, 600, 1.0), &RasterLimits::default()).unwrap_err();
        assert!(matches!(err, Error::Geometry(_)));
    }
}

//! Viewport stitching
//!
//! Composites one segment's viewport captures, in scroll order, into a
//! single raster. Consecutive captures usually overlap (the last scroll
//! position is clamped to the page end, and a segment may start below its
//! first capture's offset). Each physical row is written by exactly one
//! capture, the later one, so independent re-renders of the same region never
//! leave a seam.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use log::{debug, warn};

use crate::planning::{physical_edge, CaptureStrategy, Segment};
use crate::store::SegmentRaster;
use crate::{Error, Result};

/// Position of the bottom-most row written so far in a segment canvas
///
/// Threaded through successive [`stitch`] calls; a fresh segment starts from
/// `StitchCursor::default()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StitchCursor {
    /// Physical row just below the last drawn capture
    pub last_drawn_bottom_y: u32,
}

/// Draw one viewport capture into a segment canvas.
///
/// `page_y_offset` is the capture's scroll offset relative to the segment's
/// top edge, in CSS pixels; it is negative when the capture starts above the
/// segment. Rows of the capture that fall on already drawn canvas rows are
/// cropped from the top of the source before drawing. Returns the advanced
/// cursor.
pub fn stitch(
    canvas: &mut RgbaImage,
    capture: &RgbaImage,
    page_y_offset: i64,
    viewport_height_css: u32,
    dpr: f64,
    cursor: StitchCursor,
) -> Result<StitchCursor> {
    let (canvas_w, canvas_h) = canvas.dimensions();
    if canvas_w == 0 || canvas_h == 0 {
        return Err(Error::StitchFailed("segment canvas is empty".into()));
    }
    let (src_w, src_h) = capture.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(Error::StitchFailed(format!("capture has zero size ({}x{})", src_w, src_h)));
    }
    if viewport_height_css == 0 || !(dpr > 0.0) {
        return Err(Error::StitchFailed(format!(
            "invalid viewport height {} or DPR {}",
            viewport_height_css, dpr
        )));
    }

    // Both edges come from page-space coordinates so consecutive captures
    // and the canvas bottom line up row for row.
    let draw_y = physical_edge(page_y_offset as f64, dpr);
    let draw_bottom = physical_edge((page_y_offset + viewport_height_css as i64) as f64, dpr);
    let dest_h = (draw_bottom - draw_y).max(1);
    let src_rows_per_dest = src_h as f64 / dest_h as f64;
    let last_bottom = cursor.last_drawn_bottom_y as i64;

    let (dest_crop_y, overlap_px) = if draw_y < last_bottom {
        (last_bottom, last_bottom - draw_y)
    } else {
        if draw_y > last_bottom {
            warn!(
                "Capture at row {} leaves rows {}..{} of the segment undrawn",
                draw_y, last_bottom, draw_y
            );
        }
        (draw_y, 0)
    };

    let visible_bottom = (draw_y + dest_h).min(canvas_h as i64);
    let dest_draw_h = visible_bottom - dest_crop_y;
    if dest_draw_h <= 0 {
        debug!("Capture at row {} is fully covered by earlier captures; skipped", draw_y);
        return Ok(cursor);
    }

    let src_crop_y = ((overlap_px as f64 * src_rows_per_dest).round() as u32).min(src_h - 1);
    let src_crop_h = ((dest_draw_h as f64 * src_rows_per_dest).round() as u32)
        .max(1)
        .min(src_h - src_crop_y);

    let region = imageops::crop_imm(capture, 0, src_crop_y, src_w, src_crop_h).to_image();
    let dest_draw_h = dest_draw_h as u32;
    let patch = if region.dimensions() == (canvas_w, dest_draw_h) {
        region
    } else {
        imageops::resize(&region, canvas_w, dest_draw_h, FilterType::Triangle)
    };
    imageops::replace(canvas, &patch, 0, dest_crop_y);

    debug!(
        "Stitched capture rows {}..{} onto canvas rows {}..{} (overlap {}px)",
        src_crop_y,
        src_crop_y + src_crop_h,
        dest_crop_y,
        dest_crop_y + dest_draw_h as i64,
        overlap_px
    );

    Ok(StitchCursor {
        last_drawn_bottom_y: (dest_crop_y + dest_draw_h as i64) as u32,
    })
}

/// The in-progress raster of one segment
///
/// Owns its pixel buffer exclusively until [`SegmentCanvas::finish`] hands it
/// over as a [`SegmentRaster`].
#[derive(Debug)]
pub struct SegmentCanvas {
    segment: Segment,
    effective_dpr: f64,
    viewport_height_css: u32,
    canvas: RgbaImage,
    cursor: StitchCursor,
}

impl SegmentCanvas {
    /// Allocate an empty (transparent) canvas sized for `segment`.
    pub fn new(
        segment: &Segment,
        strategy: &CaptureStrategy,
        viewport_width_css: u32,
        viewport_height_css: u32,
    ) -> Result<Self> {
        let (width, height) = strategy.physical_size(viewport_width_css, segment.height());
        if width == 0 || height == 0 {
            return Err(Error::StitchFailed(format!(
                "segment {} has an empty raster ({}x{})",
                segment.index, width, height
            )));
        }
        Ok(Self {
            segment: segment.clone(),
            effective_dpr: strategy.effective_dpr,
            viewport_height_css,
            canvas: RgbaImage::new(width, height),
            cursor: StitchCursor::default(),
        })
    }

    /// Draw the capture taken at page-space scroll offset `page_y`.
    pub fn apply(&mut self, capture: &RgbaImage, page_y: u32) -> Result<()> {
        let local = page_y as i64 - self.segment.start_y as i64;
        self.cursor = stitch(
            &mut self.canvas,
            capture,
            local,
            self.viewport_height_css,
            self.effective_dpr,
            self.cursor,
        )?;
        Ok(())
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn cursor(&self) -> StitchCursor {
        self.cursor
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    /// Hand the finished pixels over for persistence.
    pub fn finish(self, capture_id: &str) -> SegmentRaster {
        let height = self.canvas.height();
        if self.cursor.last_drawn_bottom_y < height {
            warn!(
                "Segment {} finished with rows {}..{} undrawn",
                self.segment.index, self.cursor.last_drawn_bottom_y, height
            );
        }
        SegmentRaster::new(
            capture_id,
            self.segment.index,
            self.segment.start_y,
            self.segment.end_y,
            self.canvas,
        )
    }
}

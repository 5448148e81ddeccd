//! Whitespace-aware pagination
//!
//! A finished raster is cut into page-sized slices. Cuts are placed inside
//! horizontal whitespace bands so no page boundary falls through a line of
//! text or a graphic. When no band is close enough to the nominal page
//! boundary, the page is cut at the boundary and the next page repeats the
//! last `OVERLAP_PX` rows instead.
//!
//! Pixel access is allowed to fail (for example a raster the host refuses to
//! read back). Pagination then runs with no bands and every page falls back
//! to overlap cuts; the export itself never fails on that account.

pub mod analysis;
pub mod compose;
pub mod layout;

pub use analysis::{find_whitespace_bands, WhitespaceBand, BLANK_THRESHOLD, MIN_BAND_PX};
pub use compose::compose_page;
pub use layout::{FooterBlock, FooterLine, PageFormat, PagePlacement, PageSpec, RectMm};

use image::RgbaImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Rows repeated at the top of the page following a cut with no whitespace
pub const OVERLAP_PX: u32 = 60;
/// How far past the nominal boundary (fraction of a page) a band may lie
pub const LOOKAHEAD_FRACTION: f64 = 0.5;
/// Slices shorter than this fraction of a page are discarded
pub const MIN_SLICE_FRACTION: f64 = 0.05;

/// A raster whose pixels may or may not be readable
pub trait RasterSource {
    /// Width and height in pixels
    fn dimensions(&self) -> (u32, u32);

    /// Pixel access; `Error::PixelReadUnavailable` when the pixels cannot be
    /// inspected
    fn pixels(&self) -> Result<&RgbaImage>;
}

impl RasterSource for RgbaImage {
    fn dimensions(&self) -> (u32, u32) {
        RgbaImage::dimensions(self)
    }

    fn pixels(&self) -> Result<&RgbaImage> {
        Ok(self)
    }
}

/// A raster known only by its size, such as a cross-origin image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueRaster {
    pub width: u32,
    pub height: u32,
}

impl RasterSource for OpaqueRaster {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn pixels(&self) -> Result<&RgbaImage> {
        Err(Error::PixelReadUnavailable(format!(
            "{}x{} raster is not readable",
            self.width, self.height
        )))
    }
}

/// The source region of one output page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSlice {
    pub src_y: u32,
    pub src_h: u32,
    /// The page was cut with no whitespace evidence; the next page starts
    /// `OVERLAP_PX` rows before this slice ends
    pub used_overlap: bool,
    pub consumed_band: Option<WhitespaceBand>,
}

impl PageSlice {
    pub fn end(&self) -> u32 {
        self.src_y + self.src_h
    }
}

/// Pagination of one raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationPlan {
    pub slices: Vec<PageSlice>,
    /// Source rows that fill one page
    pub page_height_px: u32,
    pub bands: Vec<WhitespaceBand>,
    /// False when pixels could not be read and no bands were detected
    pub bands_available: bool,
}

/// Paginate one raster.
pub fn paginate(raster: &dyn RasterSource, spec: &PageSpec) -> Result<PaginationPlan> {
    spec.validate()?;
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Ok(PaginationPlan {
            slices: Vec::new(),
            page_height_px: 0,
            bands: Vec::new(),
            bands_available: false,
        });
    }

    let page_height_px = spec.page_height_px(width, height);
    let (bands, bands_available) = match raster.pixels() {
        Ok(img) => (find_whitespace_bands(img), true),
        Err(e) if e.is_recoverable() => {
            warn!("Paginating without whitespace detection: {}", e);
            (Vec::new(), false)
        }
        Err(e) => return Err(e),
    };

    let slices = select_cuts(height, page_height_px, &bands);
    info!(
        "Paginated {}x{} raster into {} page(s) ({} rows per page, {} bands, {} overlap cut(s))",
        width,
        height,
        slices.len(),
        page_height_px,
        bands.len(),
        slices.iter().filter(|s| s.used_overlap).count()
    );

    Ok(PaginationPlan {
        slices,
        page_height_px,
        bands,
        bands_available,
    })
}

/// Paginate the rasters of an export in order and place every page.
///
/// Page numbers run across all rasters.
pub fn paginate_segments<R: RasterSource>(
    rasters: &[R],
    spec: &PageSpec,
) -> Result<Vec<PagePlacement>> {
    let mut plans = Vec::with_capacity(rasters.len());
    for raster in rasters {
        plans.push(paginate(raster, spec)?);
    }
    let page_count: usize = plans.iter().map(|p| p.slices.len()).sum();

    let mut placements = Vec::with_capacity(page_count);
    for (segment_index, (raster, plan)) in rasters.iter().zip(&plans).enumerate() {
        let (w, h) = raster.dimensions();
        for slice in &plan.slices {
            let page_number = placements.len() + 1;
            placements.push(spec.place(w, h, *slice, segment_index, page_number, page_count));
        }
    }
    Ok(placements)
}

/// Choose page cuts for a raster of `raster_height` rows.
///
/// `bands` must be ascending by start. Every row left out of the returned
/// slices lies inside a band.
pub fn select_cuts(
    raster_height: u32,
    page_height_px: u32,
    bands: &[WhitespaceBand],
) -> Vec<PageSlice> {
    let page_h = page_height_px.max(1);
    let lookahead = (page_h as f64 * LOOKAHEAD_FRACTION) as u32;
    let min_slice = ((page_h as f64 * MIN_SLICE_FRACTION).ceil() as u32).max(1);
    // Tiny pages cannot afford to repeat rows and still make progress.
    let overlap = if page_h > OVERLAP_PX * 2 { OVERLAP_PX } else { 0 };

    let mut slices = Vec::new();
    let mut prev_cut_y = 0u32;

    while prev_cut_y < raster_height {
        if !slices.is_empty() && is_blank_tail(prev_cut_y, raster_height, bands) {
            debug!("Rows {}..{} are blank; no further page", prev_cut_y, raster_height);
            break;
        }

        let nominal_end_y = prev_cut_y.saturating_add(page_h);
        if nominal_end_y >= raster_height {
            slices.push(PageSlice {
                src_y: prev_cut_y,
                src_h: raster_height - prev_cut_y,
                used_overlap: false,
                consumed_band: None,
            });
            break;
        }

        let (slice, next_cut_y) = match choose_band(prev_cut_y, nominal_end_y, lookahead, bands) {
            Some((band, cut_y)) if cut_y - prev_cut_y >= min_slice => {
                debug!(
                    "Page at row {} cut at {} inside band {}..={}",
                    prev_cut_y, cut_y, band.start, band.end
                );
                let slice = PageSlice {
                    src_y: prev_cut_y,
                    src_h: (cut_y - prev_cut_y).min(page_h),
                    used_overlap: false,
                    consumed_band: Some(band),
                };
                // Skip the whole band; stopping at its start would leave its
                // centre ahead of the cursor and select it again.
                (slice, band.end + 1)
            }
            Some((band, cut_y)) => {
                debug!(
                    "Band {}..={} would leave a {} row page at row {}; advancing one page",
                    band.start,
                    band.end,
                    cut_y - prev_cut_y,
                    prev_cut_y
                );
                let slice = PageSlice {
                    src_y: prev_cut_y,
                    src_h: page_h,
                    used_overlap: false,
                    consumed_band: None,
                };
                (slice, nominal_end_y)
            }
            None => {
                debug!("No whitespace near row {}; overlap cut", nominal_end_y);
                let slice = PageSlice {
                    src_y: prev_cut_y,
                    src_h: page_h,
                    used_overlap: overlap > 0,
                    consumed_band: None,
                };
                (slice, nominal_end_y - overlap)
            }
        };

        slices.push(slice);
        prev_cut_y = next_cut_y;
    }

    slices
}

/// Pick the band to cut in and the row to cut at.
///
/// Pass 1 looks at or past the nominal boundary; the cut then lands on the
/// boundary itself, so the band must reach back to it. Pass 2 looks behind
/// the boundary and cuts at the band centre.
fn choose_band(
    prev_cut_y: u32,
    nominal_end_y: u32,
    lookahead: u32,
    bands: &[WhitespaceBand],
) -> Option<(WhitespaceBand, u32)> {
    let unconsumed = || bands.iter().filter(move |b| b.end > prev_cut_y);

    let ahead = unconsumed()
        .filter(|b| b.centre >= nominal_end_y && b.start <= nominal_end_y)
        .filter(|b| b.centre - nominal_end_y <= lookahead)
        .min_by_key(|b| b.centre - nominal_end_y);
    if let Some(band) = ahead {
        return Some((*band, nominal_end_y));
    }

    unconsumed()
        .filter(|b| b.centre > prev_cut_y && b.centre < nominal_end_y)
        .min_by_key(|b| nominal_end_y - b.centre)
        .map(|b| (*b, b.centre))
}

fn is_blank_tail(from: u32, raster_height: u32, bands: &[WhitespaceBand]) -> bool {
    bands
        .iter()
        .any(|b| b.start <= from && b.end + 1 >= raster_height)
}

//! Page sizes, margins, footer reservation and per-page placement metadata

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PageSlice;
use crate::{Error, Result};

/// Vertical padding around the footer lines, mm
pub const FOOTER_PADDING_MM: f64 = 3.0;
/// Height of one footer line, mm
pub const FOOTER_LINE_HEIGHT_MM: f64 = 4.0;
/// Footer text size, pt
pub const FOOTER_FONT_PT: f64 = 8.0;
/// Raster pixels per mm for `PageFormat::Full` (96 dpi)
pub const FULL_PAGE_PX_PER_MM: f64 = 96.0 / 25.4;

/// Target page size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    A3,
    A4,
    A5,
    Letter,
    Legal,
    Custom { width_mm: f64, height_mm: f64 },
    /// One page per raster at native size
    Full,
}

impl PageFormat {
    /// Portrait dimensions in mm; `None` for `Full`.
    pub fn portrait_mm(&self) -> Option<(f64, f64)> {
        match *self {
            PageFormat::A3 => Some((297.0, 420.0)),
            PageFormat::A4 => Some((210.0, 297.0)),
            PageFormat::A5 => Some((148.0, 210.0)),
            PageFormat::Letter => Some((215.9, 279.4)),
            PageFormat::Legal => Some((215.9, 355.6)),
            PageFormat::Custom { width_mm, height_mm } => Some((width_mm, height_mm)),
            PageFormat::Full => None,
        }
    }
}

impl FromStr for PageFormat {
    type Err = Error;

    /// Accepts `a3`, `a4`, `a5`, `letter`, `legal`, `full` or `<w>x<h>` in mm.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "a3" => Ok(PageFormat::A3),
            "a4" => Ok(PageFormat::A4),
            "a5" => Ok(PageFormat::A5),
            "letter" => Ok(PageFormat::Letter),
            "legal" => Ok(PageFormat::Legal),
            "full" => Ok(PageFormat::Full),
            other => {
                let (w, h) = other
                    .split_once('x')
                    .ok_or_else(|| Error::Config(format!("unknown page format '{}'", s)))?;
                let parse = |v: &str| {
                    v.trim().parse::<f64>().map_err(|_| {
                        Error::Config(format!("invalid page dimension '{}' in '{}'", v, s))
                    })
                };
                Ok(PageFormat::Custom {
                    width_mm: parse(w)?,
                    height_mm: parse(h)?,
                })
            }
        }
    }
}

/// How a raster is laid out onto pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSpec {
    pub format: PageFormat,
    pub landscape: bool,
    /// Margin on every side, mm
    pub margin_mm: f64,
    /// Footer lines drawn at the bottom of every page. `{page}` and
    /// `{pages}` are replaced with the page number and page count.
    pub footer_lines: Vec<String>,
}

impl Default for PageSpec {
    fn default() -> Self {
        Self {
            format: PageFormat::A4,
            landscape: false,
            margin_mm: 10.0,
            footer_lines: Vec::new(),
        }
    }
}

/// A rectangle on the page, mm from the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectMm {
    pub x_mm: f64,
    pub y_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FooterLine {
    pub text: String,
    pub x_mm: f64,
    pub baseline_mm: f64,
    pub size_pt: f64,
}

/// Footer zone of a page: an opaque mask drawn over the image, then the lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FooterBlock {
    pub mask: RectMm,
    pub lines: Vec<FooterLine>,
}

/// Everything a page-assembly layer needs to place one output page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePlacement {
    /// 1-based, across all segments of the export
    pub page_number: usize,
    /// Which raster of the export the slice is cut from
    pub segment_index: usize,
    pub slice: PageSlice,
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    /// Where the slice's pixels are drawn
    pub image: RectMm,
    pub footer: Option<FooterBlock>,
}

impl PageSpec {
    pub fn validate(&self) -> Result<()> {
        if !self.margin_mm.is_finite() || self.margin_mm < 0.0 {
            return Err(Error::Config(format!(
                "margin must be non-negative, got {}",
                self.margin_mm
            )));
        }
        if let Some((w, h)) = self.format.portrait_mm() {
            if !(w > 0.0 && h > 0.0) || !w.is_finite() || !h.is_finite() {
                return Err(Error::Config(format!("page size must be positive, got {}x{}mm", w, h)));
            }
            let content_h = h.min(w) - 2.0 * self.margin_mm - self.footer_reserve_mm();
            if w - 2.0 * self.margin_mm <= 0.0 || content_h <= 0.0 {
                return Err(Error::Config(format!(
                    "margins of {}mm and {} footer line(s) leave no room on a {}x{}mm page",
                    self.margin_mm,
                    self.footer_lines.len(),
                    w,
                    h
                )));
            }
        }
        Ok(())
    }

    /// Height reserved at the bottom of every page for footer lines.
    pub fn footer_reserve_mm(&self) -> f64 {
        if self.footer_lines.is_empty() {
            0.0
        } else {
            FOOTER_PADDING_MM + FOOTER_LINE_HEIGHT_MM * self.footer_lines.len() as f64
        }
    }

    /// Page size in mm for a raster of `raster_w` x `raster_h` pixels.
    pub fn page_size_mm(&self, raster_w: u32, raster_h: u32) -> (f64, f64) {
        match self.format.portrait_mm() {
            Some((w, h)) if self.landscape => (h, w),
            Some(size) => size,
            None => (
                raster_w as f64 / FULL_PAGE_PX_PER_MM + 2.0 * self.margin_mm,
                raster_h as f64 / FULL_PAGE_PX_PER_MM
                    + 2.0 * self.margin_mm
                    + self.footer_reserve_mm(),
            ),
        }
    }

    /// Area available to the image: page minus margins minus footer.
    pub fn content_area_mm(&self, raster_w: u32, raster_h: u32) -> RectMm {
        let (page_w, page_h) = self.page_size_mm(raster_w, raster_h);
        RectMm {
            x_mm: self.margin_mm,
            y_mm: self.margin_mm,
            width_mm: page_w - 2.0 * self.margin_mm,
            height_mm: page_h - 2.0 * self.margin_mm - self.footer_reserve_mm(),
        }
    }

    /// Source rows that fill one page's content area when the raster is
    /// scaled to the content width. Never zero.
    pub fn page_height_px(&self, raster_w: u32, raster_h: u32) -> u32 {
        if self.format == PageFormat::Full {
            return raster_h.max(1);
        }
        let area = self.content_area_mm(raster_w, raster_h);
        let rows = (area.height_mm * raster_w as f64 / area.width_mm).floor();
        rows.clamp(1.0, u32::MAX as f64) as u32
    }

    /// Place one slice on its page.
    pub fn place(
        &self,
        raster_w: u32,
        raster_h: u32,
        slice: PageSlice,
        segment_index: usize,
        page_number: usize,
        page_count: usize,
    ) -> PagePlacement {
        let (page_w, page_h) = self.page_size_mm(raster_w, raster_h);
        let content = self.content_area_mm(raster_w, raster_h);
        let mm_per_px = content.width_mm / raster_w.max(1) as f64;

        let image = RectMm {
            x_mm: content.x_mm,
            y_mm: content.y_mm,
            width_mm: content.width_mm,
            height_mm: (slice.src_h as f64 * mm_per_px).min(content.height_mm),
        };

        let footer = if self.footer_lines.is_empty() {
            None
        } else {
            let mask_y = content.y_mm + content.height_mm;
            let first_baseline = mask_y + FOOTER_PADDING_MM / 2.0 + FOOTER_LINE_HEIGHT_MM * 0.8;
            let lines = self
                .footer_lines
                .iter()
                .enumerate()
                .map(|(i, template)| FooterLine {
                    text: template
                        .replace("{page}", &page_number.to_string())
                        .replace("{pages}", &page_count.to_string()),
                    x_mm: content.x_mm,
                    baseline_mm: first_baseline + FOOTER_LINE_HEIGHT_MM * i as f64,
                    size_pt: FOOTER_FONT_PT,
                })
                .collect();
            Some(FooterBlock {
                mask: RectMm {
                    x_mm: 0.0,
                    y_mm: mask_y,
                    width_mm: page_w,
                    height_mm: page_h - mask_y,
                },
                lines,
            })
        };

        PagePlacement {
            page_number,
            segment_index,
            slice,
            page_width_mm: page_w,
            page_height_mm: page_h,
            image,
            footer,
        }
    }
}

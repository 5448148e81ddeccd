//! Row analysis: background detection, per-row blankness scores and
//! whitespace band extraction.

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Rows with a score below this (0-255 luminance scale) count as blank
pub const BLANK_THRESHOLD: f32 = 12.0;
/// Shortest run of blank rows that forms a band
pub const MIN_BAND_PX: u32 = 2;
/// Fraction of rows sampled at the top and at the bottom for the background
pub const EDGE_SAMPLE_FRACTION: f64 = 0.03;
/// Every n-th column is sampled
pub const COLUMN_STEP: usize = 4;

/// A maximal run of blank rows; `end` is inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitespaceBand {
    pub start: u32,
    pub end: u32,
    pub centre: u32,
    pub width: u32,
}

impl WhitespaceBand {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            centre: start + (end - start) / 2,
            width: end - start + 1,
        }
    }

    pub fn contains(&self, row: u32) -> bool {
        row >= self.start && row <= self.end
    }
}

/// Luminance of a pixel composited over white.
///
/// Unwritten (transparent) canvas rows therefore read as white paper.
#[inline]
pub fn luminance(p: &Rgba<u8>) -> f32 {
    let [r, g, b, a] = p.0;
    let lum = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    let alpha = a as f32 / 255.0;
    lum * alpha + 255.0 * (1.0 - alpha)
}

fn row_sample_sum(img: &RgbaImage, y: u32, f: impl Fn(f32) -> f32) -> (f64, u32) {
    let mut sum = 0f64;
    let mut count = 0u32;
    for x in (0..img.width()).step_by(COLUMN_STEP) {
        sum += f(luminance(img.get_pixel(x, y))) as f64;
        count += 1;
    }
    (sum, count)
}

/// Mean luminance of the top and bottom edge rows.
pub fn detect_background(img: &RgbaImage) -> f32 {
    let h = img.height();
    if h == 0 || img.width() == 0 {
        return 255.0;
    }
    let edge = ((h as f64 * EDGE_SAMPLE_FRACTION).ceil() as u32).clamp(1, h);

    let rows: Box<dyn Iterator<Item = u32>> = if edge * 2 >= h {
        Box::new(0..h)
    } else {
        Box::new((0..edge).chain(h - edge..h))
    };

    let mut sum = 0f64;
    let mut count = 0u64;
    for y in rows {
        let (s, c) = row_sample_sum(img, y, |l| l);
        sum += s;
        count += c as u64;
    }
    if count == 0 {
        255.0
    } else {
        (sum / count as f64) as f32
    }
}

/// Mean absolute deviation of each row's luminance from `background`.
///
/// Rows are scored independently; no smoothing is applied, since blurring
/// scores across rows erases genuine one- or two-row gaps between lines.
pub fn score_rows(img: &RgbaImage, background: f32) -> Vec<f32> {
    (0..img.height())
        .map(|y| {
            let (sum, count) = row_sample_sum(img, y, |l| (l - background).abs());
            if count == 0 {
                0.0
            } else {
                (sum / count as f64) as f32
            }
        })
        .collect()
}

/// Maximal runs of rows scoring below `threshold` that are at least
/// `min_len` rows tall, ascending by start.
pub fn extract_bands(scores: &[f32], threshold: f32, min_len: u32) -> Vec<WhitespaceBand> {
    let mut bands = Vec::new();
    let mut run_start: Option<u32> = None;

    for (y, &score) in scores.iter().enumerate() {
        let y = y as u32;
        match (score < threshold, run_start) {
            (true, None) => run_start = Some(y),
            (false, Some(start)) => {
                if y - start >= min_len {
                    bands.push(WhitespaceBand::new(start, y - 1));
                }
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        let end = scores.len() as u32;
        if end - start >= min_len {
            bands.push(WhitespaceBand::new(start, end - 1));
        }
    }
    bands
}

/// Background detection, row scoring and band extraction in one pass.
pub fn find_whitespace_bands(img: &RgbaImage) -> Vec<WhitespaceBand> {
    let background = detect_background(img);
    let scores = score_rows(img, background);
    extract_bands(&scores, BLANK_THRESHOLD, MIN_BAND_PX)
}

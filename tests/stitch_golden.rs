//! Stitching determinism, checked through SHA-256 pixel digests

mod common;

use common::render_page;
use image::{imageops, RgbaImage};
use scrollstitch::store::pixel_digest;
use scrollstitch::{plan_capture, PageGeometry, RasterLimits, SegmentCanvas};

fn geometry() -> PageGeometry {
    PageGeometry {
        total_height: 2350,
        viewport_width: 120,
        viewport_height: 400,
        device_pixel_ratio: 1.0,
    }
}

/// Stitch every segment of the fixture page and return their digests.
fn stitch_all(page: &RgbaImage, limits: &RasterLimits) -> Vec<String> {
    let g = geometry();
    let (strategy, segments) = plan_capture(&g, limits).unwrap();
    segments
        .iter()
        .map(|segment| {
            let mut canvas =
                SegmentCanvas::new(segment, &strategy, g.viewport_width, g.viewport_height)
                    .unwrap();
            for &y in &segment.positions {
                let h = g.viewport_height.min(g.total_height - y);
                let capture = imageops::crop_imm(page, 0, y, page.width(), h).to_image();
                canvas.apply(&capture, y).unwrap();
            }
            canvas.finish("golden").digest().to_string()
        })
        .collect()
}

#[test]
fn restitching_is_byte_identical() {
    let page = render_page(&geometry());
    let limits = RasterLimits {
        max_dimension: 1000,
        ..Default::default()
    };
    let first = stitch_all(&page, &limits);
    let second = stitch_all(&page, &limits);
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[test]
fn stitched_segments_match_the_page() {
    let page = render_page(&geometry());
    let limits = RasterLimits {
        max_dimension: 1000,
        ..Default::default()
    };
    let (_, segments) = plan_capture(&geometry(), &limits).unwrap();
    let expected: Vec<String> = segments
        .iter()
        .map(|s| {
            let region =
                imageops::crop_imm(&page, 0, s.start_y, page.width(), s.height()).to_image();
            pixel_digest(&region)
        })
        .collect();

    assert_eq!(stitch_all(&page, &limits), expected);
}

#[test]
fn single_segment_covers_the_page() {
    let page = render_page(&geometry());
    let digests = stitch_all(&page, &RasterLimits::default());
    assert_eq!(digests, vec![pixel_digest(&page)]);
}

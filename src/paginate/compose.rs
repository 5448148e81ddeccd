//! Page composition
//!
//! Renders one placed page: white paper, the slice scaled into its image
//! rectangle, an opaque mask over the footer zone, then the footer lines.
//! The mask goes down before the text so no image pixel can bleed into the
//! footer.

use embedded_graphics::mono_font::ascii::{FONT_10X20, FONT_6X10, FONT_8X13};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use super::layout::{PagePlacement, RectMm};
use super::RasterSource;
use crate::{Error, Result};

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Adapter letting embedded-graphics draw into an RGBA page
struct PageCanvas<'a> {
    image: &'a mut RgbaImage,
}

impl OriginDimensions for PageCanvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for PageCanvas<'_> {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> std::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (w, h) = (self.image.width() as i32, self.image.height() as i32);
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 || point.x >= w || point.y >= h {
                continue;
            }
            self.image.put_pixel(
                point.x as u32,
                point.y as u32,
                Rgba([color.r(), color.g(), color.b(), 255]),
            );
        }
        Ok(())
    }
}

fn font_for(size_px: f64) -> &'static MonoFont<'static> {
    if size_px < 13.0 {
        &FONT_6X10
    } else if size_px < 20.0 {
        &FONT_8X13
    } else {
        &FONT_10X20
    }
}

fn to_px(rect: &RectMm, px_per_mm: f64) -> (i64, i64, u32, u32) {
    (
        (rect.x_mm * px_per_mm).round() as i64,
        (rect.y_mm * px_per_mm).round() as i64,
        (rect.width_mm * px_per_mm).round().max(1.0) as u32,
        (rect.height_mm * px_per_mm).round().max(1.0) as u32,
    )
}

/// Render a placed page at `dpi`.
///
/// Composition needs the pixels, so an unreadable raster is an error here
/// even though pagination itself tolerates it.
pub fn compose_page(
    raster: &dyn RasterSource,
    placement: &PagePlacement,
    dpi: f64,
) -> Result<RgbaImage> {
    if !(dpi > 0.0) {
        return Err(Error::Config(format!("dpi must be positive, got {}", dpi)));
    }
    let px_per_mm = dpi / 25.4;
    let page_w = (placement.page_width_mm * px_per_mm).round().max(1.0) as u32;
    let page_h = (placement.page_height_mm * px_per_mm).round().max(1.0) as u32;
    let mut page = RgbaImage::from_pixel(page_w, page_h, PAPER);

    let pixels = raster.pixels()?;
    let slice = placement.slice;
    if slice.src_h > 0 && slice.end() <= pixels.height() {
        let region =
            imageops::crop_imm(pixels, 0, slice.src_y, pixels.width(), slice.src_h).to_image();
        let (x, y, w, h) = to_px(&placement.image, px_per_mm);
        let scaled = imageops::resize(&region, w, h, FilterType::Triangle);
        imageops::overlay(&mut page, &scaled, x, y);
    } else {
        return Err(Error::Other(format!(
            "slice rows {}..{} fall outside a {}-row raster",
            slice.src_y,
            slice.end(),
            pixels.height()
        )));
    }

    if let Some(footer) = &placement.footer {
        let (x, y, w, h) = to_px(&footer.mask, px_per_mm);
        let mask = RgbaImage::from_pixel(w, h, PAPER);
        imageops::replace(&mut page, &mask, x, y);

        let mut canvas = PageCanvas { image: &mut page };
        for line in &footer.lines {
            let size_px = line.size_pt / 72.0 * dpi;
            let style = MonoTextStyle::new(font_for(size_px), Rgb888::BLACK);
            let origin = Point::new(
                (line.x_mm * px_per_mm).round() as i32,
                (line.baseline_mm * px_per_mm).round() as i32,
            );
            let _ = Text::new(&line.text, origin, style).draw(&mut canvas);
        }
    }

    Ok(page)
}

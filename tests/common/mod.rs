//! Shared fixtures: a synthetic scrollable page and a scripted capture source

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use image::{imageops, Rgba, RgbaImage};
use scrollstitch::planning::physical_edge;
use scrollstitch::{CancelFlag, CaptureSource, Error, PageGeometry, Result};

/// Pixel value of page row `y` (physical), column `x`; distinct per row
pub fn page_pixel(x: u32, y: u32) -> Rgba<u8> {
    Rgba([(y % 251) as u8, ((y / 251) % 251) as u8, ((x % 7) * 30) as u8, 255])
}

/// Render a whole page at `dpr`
pub fn render_page(geometry: &PageGeometry) -> RgbaImage {
    let dpr = geometry.device_pixel_ratio;
    let w = physical_edge(geometry.viewport_width as f64, dpr) as u32;
    let h = physical_edge(geometry.total_height as f64, dpr) as u32;
    RgbaImage::from_fn(w, h, page_pixel)
}

/// What the source observed, shared with the test
#[derive(Default)]
pub struct SourceLog {
    pub scrolls: Mutex<Vec<u32>>,
    pub captures: Mutex<usize>,
    pub restored: AtomicBool,
}

impl SourceLog {
    pub fn scrolls(&self) -> Vec<u32> {
        self.scrolls.lock().unwrap().clone()
    }

    pub fn captures(&self) -> usize {
        *self.captures.lock().unwrap()
    }

    pub fn restored(&self) -> bool {
        self.restored.load(Ordering::SeqCst)
    }
}

/// Serves viewport crops of a pre-rendered page
pub struct ScriptedSource {
    geometry: PageGeometry,
    page: RgbaImage,
    current: u32,
    pub fail_on_capture: Option<usize>,
    pub cancel_on_capture: Option<(usize, CancelFlag)>,
    pub log: Arc<SourceLog>,
}

impl ScriptedSource {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            page: render_page(&geometry),
            geometry,
            current: 0,
            fail_on_capture: None,
            cancel_on_capture: None,
            log: Arc::new(SourceLog::default()),
        }
    }

    pub fn page(&self) -> &RgbaImage {
        &self.page
    }
}

impl CaptureSource for ScriptedSource {
    fn geometry(&mut self) -> Result<PageGeometry> {
        Ok(self.geometry)
    }

    fn scroll_to(&mut self, y: u32) -> Result<()> {
        self.log.scrolls.lock().unwrap().push(y);
        self.current = y;
        Ok(())
    }

    fn capture_viewport(&mut self) -> Result<RgbaImage> {
        let n = {
            let mut count = self.log.captures.lock().unwrap();
            *count += 1;
            *count
        };
        if self.fail_on_capture == Some(n) {
            return Err(Error::Capture(format!("capture {} refused", n)));
        }
        if let Some((at, flag)) = &self.cancel_on_capture {
            if *at == n {
                flag.cancel();
            }
        }

        let dpr = self.geometry.device_pixel_ratio;
        let top = physical_edge(self.current as f64, dpr) as u32;
        let viewport_bottom = self.current + self.geometry.viewport_height;
        let bottom = physical_edge(viewport_bottom as f64, dpr) as u32;
        let h = bottom.min(self.page.height()) - top;
        Ok(imageops::crop_imm(&self.page, 0, top, self.page.width(), h).to_image())
    }

    fn restore(&mut self) -> Result<()> {
        self.log.restored.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// White raster with black "text" rows
pub fn text_raster(width: u32, height: u32, text_rows: &[std::ops::Range<u32>]) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    for range in text_rows {
        for y in range.clone() {
            for x in 0..width {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
    }
    img
}

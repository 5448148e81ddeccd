//! Segment persistence
//!
//! Finished segment rasters are handed to a [`SegmentStore`], an opaque blob
//! store keyed by capture id and segment index. Two implementations ship:
//! [`MemoryStore`] for tests and short-lived pipelines, and [`DirStore`] which
//! writes one PNG plus one JSON sidecar per segment.

pub mod dir;

pub use dir::DirStore;

use std::collections::BTreeMap;
use std::sync::Mutex;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::paginate::RasterSource;
use crate::{Error, Result};

/// Pixel-free description of a persisted segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub capture_id: String,
    pub index: usize,
    /// Physical pixels
    pub width: u32,
    pub height: u32,
    /// Page-space CSS px covered by the segment
    pub y_start: u32,
    pub y_end: u32,
    /// Hex SHA-256 of the RGBA pixels
    pub digest: String,
}

/// A committed segment: metadata plus its pixels
#[derive(Debug, Clone)]
pub struct SegmentRaster {
    pub meta: SegmentMeta,
    pub image: RgbaImage,
}

impl SegmentRaster {
    pub fn new(capture_id: &str, index: usize, y_start: u32, y_end: u32, image: RgbaImage) -> Self {
        let meta = SegmentMeta {
            capture_id: capture_id.to_string(),
            index,
            width: image.width(),
            height: image.height(),
            y_start,
            y_end,
            digest: pixel_digest(&image),
        };
        Self { meta, image }
    }

    pub fn digest(&self) -> &str {
        &self.meta.digest
    }
}

impl RasterSource for SegmentRaster {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn pixels(&self) -> Result<&RgbaImage> {
        Ok(&self.image)
    }
}

/// Hex SHA-256 over the raw RGBA buffer (dimensions included).
pub fn pixel_digest(image: &RgbaImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(image.as_raw());
    hex::encode(hasher.finalize())
}

/// The persistence collaborator
pub trait SegmentStore: Send + Sync {
    /// Persist a segment, replacing any previous blob at the same key
    fn put(&self, raster: &SegmentRaster) -> Result<()>;

    /// Load a segment if present
    fn get(&self, capture_id: &str, index: usize) -> Result<Option<SegmentRaster>>;

    /// Metadata of every segment of a capture, ordered by index
    fn list(&self, capture_id: &str) -> Result<Vec<SegmentMeta>>;

    /// Remove every segment of a capture
    fn delete_capture(&self, capture_id: &str) -> Result<()>;

    /// Load all segments of a capture, ordered by index
    fn load_all(&self, capture_id: &str) -> Result<Vec<SegmentRaster>> {
        let mut out = Vec::new();
        for meta in self.list(capture_id)? {
            match self.get(capture_id, meta.index)? {
                Some(raster) => out.push(raster),
                None => {
                    return Err(Error::Storage(format!(
                        "segment {} of '{}' disappeared while loading",
                        meta.index, capture_id
                    )))
                }
            }
        }
        Ok(out)
    }
}

/// In-memory store backed by a mutex-guarded map
#[derive(Default)]
pub struct MemoryStore {
    segments: Mutex<BTreeMap<(String, usize), SegmentRaster>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<(String, usize), SegmentRaster>>> {
        self.segments
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }
}

impl SegmentStore for MemoryStore {
    fn put(&self, raster: &SegmentRaster) -> Result<()> {
        let mut g = self.lock()?;
        g.insert((raster.meta.capture_id.clone(), raster.meta.index), raster.clone());
        Ok(())
    }

    fn get(&self, capture_id: &str, index: usize) -> Result<Option<SegmentRaster>> {
        let g = self.lock()?;
        Ok(g.get(&(capture_id.to_string(), index)).cloned())
    }

    fn list(&self, capture_id: &str) -> Result<Vec<SegmentMeta>> {
        let g = self.lock()?;
        Ok(g.iter()
            .filter(|((id, _), _)| id == capture_id)
            .map(|(_, r)| r.meta.clone())
            .collect())
    }

    fn delete_capture(&self, capture_id: &str) -> Result<()> {
        let mut g = self.lock()?;
        g.retain(|(id, _), _| id != capture_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn raster(id: &str, index: usize, v: u8) -> SegmentRaster {
        let image = RgbaImage::from_pixel(3, 10, Rgba([v, v, v, 255]));
        SegmentRaster::new(id, index, index as u32 * 10, index as u32 * 10 + 10, image)
    }

    #[test]
    fn memory_store_lists_in_index_order() {
        let store = MemoryStore::new();
        store.put(&raster("a", 1, 1)).unwrap();
        store.put(&raster("a", 0, 0)).unwrap();
        store.put(&raster("b", 0, 5)).unwrap();

        let metas = store.list("a").unwrap();
        assert_eq!(metas.iter().map(|m| m.index).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(store.load_all("a").unwrap().len(), 2);
    }

    #[test]
    fn delete_capture_only_touches_that_capture() {
        let store = MemoryStore::new();
        store.put(&raster("a", 0, 0)).unwrap();
        store.put(&raster("b", 0, 0)).unwrap();
        store.delete_capture("a").unwrap();
        assert!(store.get("a", 0).unwrap().is_none());
        assert!(store.get("b", 0).unwrap().is_some());
    }

    #[test]
    fn digest_tracks_pixels() {
        assert_eq!(raster("a", 0, 7).digest(), raster("z", 3, 7).digest());
        assert_ne!(raster("a", 0, 7).digest(), raster("a", 0, 8).digest());
    }
}

//! Directory-backed segment store
//!
//! Layout: `<root>/<capture_id>/segment-0000.png` with a
//! `segment-0000.json` sidecar holding the [`SegmentMeta`].

use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use log::debug;

use super::{pixel_digest, SegmentMeta, SegmentRaster, SegmentStore};
use crate::{Error, Result};

pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn capture_dir(&self, capture_id: &str) -> Result<PathBuf> {
        if capture_id.is_empty()
            || capture_id == "."
            || capture_id == ".."
            || capture_id.contains(['/', '\\'])
        {
            return Err(Error::Config(format!("invalid capture id '{}'", capture_id)));
        }
        Ok(self.root.join(capture_id))
    }

    fn stem(index: usize) -> String {
        format!("segment-{:04}", index)
    }
}

impl SegmentStore for DirStore {
    fn put(&self, raster: &SegmentRaster) -> Result<()> {
        let dir = self.capture_dir(&raster.meta.capture_id)?;
        fs::create_dir_all(&dir)?;
        let stem = Self::stem(raster.meta.index);

        raster
            .image
            .save_with_format(dir.join(format!("{}.png", stem)), ImageFormat::Png)?;
        let sidecar = serde_json::to_string_pretty(&raster.meta)?;
        fs::write(dir.join(format!("{}.json", stem)), sidecar)?;

        debug!("Stored segment {} of '{}' in {:?}", raster.meta.index, raster.meta.capture_id, dir);
        Ok(())
    }

    fn get(&self, capture_id: &str, index: usize) -> Result<Option<SegmentRaster>> {
        let dir = self.capture_dir(capture_id)?;
        let stem = Self::stem(index);
        let meta_path = dir.join(format!("{}.json", stem));
        if !meta_path.exists() {
            return Ok(None);
        }

        let meta: SegmentMeta = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;
        let image = image::open(dir.join(format!("{}.png", stem)))?.to_rgba8();
        if image.dimensions() != (meta.width, meta.height) {
            return Err(Error::Storage(format!(
                "segment {} of '{}' is {}x{} but its sidecar says {}x{}",
                index,
                capture_id,
                image.width(),
                image.height(),
                meta.width,
                meta.height
            )));
        }
        let digest = pixel_digest(&image);
        if digest != meta.digest {
            return Err(Error::Storage(format!(
                "segment {} of '{}' has digest {} but its sidecar says {}",
                index, capture_id, digest, meta.digest
            )));
        }
        Ok(Some(SegmentRaster { meta, image }))
    }

    fn list(&self, capture_id: &str) -> Result<Vec<SegmentMeta>> {
        let dir = self.capture_dir(capture_id)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut metas = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let meta: SegmentMeta = serde_json::from_str(&fs::read_to_string(&path)?)?;
            metas.push(meta);
        }
        metas.sort_by_key(|m| m.index);
        Ok(metas)
    }

    fn delete_capture(&self, capture_id: &str) -> Result<()> {
        let dir = self.capture_dir(capture_id)?;
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

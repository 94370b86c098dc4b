// ============================================================================
// ASSETS: default input images
// ============================================================================
//
// Filters that consume images need something to chew on before the user picks
// a photo.  The library always holds the procedural built-ins; further images
// can be added from disk (settings `asset_dir`, CLI inputs).
// ============================================================================

use std::path::Path;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::filter::ImageRef;
use crate::{log_info, log_warn};

/// Name of the first built-in asset, used when nothing else is configured.
pub const DEFAULT_ASSET: &str = "gradient";

pub struct AssetLibrary {
    /// Never empty: `builtin` seeds it and nothing removes entries.
    assets: Vec<ImageRef>,
}

impl AssetLibrary {
    /// Library holding the procedural built-ins at `size`×`size`.
    pub fn builtin(size: u32) -> Self {
        let size = size.max(1);
        Self {
            assets: vec![
                ImageRef::new(DEFAULT_ASSET, gradient(size)),
                ImageRef::new("rings", rings(size)),
                ImageRef::new("checker", checker(size)),
            ],
        }
    }

    pub fn add(&mut self, name: &str, pixels: RgbaImage) -> ImageRef {
        let image = ImageRef::new(name, pixels);
        self.assets.retain(|a| a.name() != name);
        self.assets.push(image.clone());
        image
    }

    /// Load every decodable image in `dir` (non-recursive).  Returns the
    /// number of assets added; undecodable files are logged and skipped.
    pub fn load_dir(&mut self, dir: &Path) -> usize {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log_warn!("asset dir {} unreadable: {}", dir.display(), e);
                return 0;
            }
        };

        let mut paths: Vec<_> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut added = 0;
        for path in paths {
            match crate::io::load_image_sync(&path) {
                Ok(img) => {
                    self.add(&asset_name_for(&path), img);
                    added += 1;
                }
                Err(e) => log_warn!("skipping asset {}: {}", path.display(), e),
            }
        }
        log_info!("loaded {} asset(s) from {}", added, dir.display());
        added
    }

    pub fn get(&self, name: &str) -> Option<&ImageRef> {
        self.assets.iter().find(|a| a.name() == name)
    }

    /// Look up `name` as an asset, falling back to loading it as an image
    /// path.  Path-loaded images keep the path as their name so presets can
    /// find them again.
    pub fn resolve(&self, name: &str) -> Option<ImageRef> {
        if let Some(asset) = self.get(name) {
            return Some(asset.clone());
        }
        let path = Path::new(name);
        if !path.is_file() {
            return None;
        }
        match crate::io::load_image_sync(path) {
            Ok(img) => Some(ImageRef::new(name, img)),
            Err(e) => {
                log_warn!("could not load image {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn first(&self) -> &ImageRef {
        &self.assets[0]
    }

    /// `preferred` if present, otherwise the first asset.
    pub fn default_image(&self, preferred: &str) -> ImageRef {
        self.get(preferred).unwrap_or_else(|| self.first()).clone()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(ImageRef::name)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

fn asset_name_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string()
}

// ============================================================================
// PROCEDURAL BUILT-INS
// ============================================================================

fn fill_rows<F>(size: u32, pixel: F) -> RgbaImage
where
    F: Fn(u32, u32) -> Rgba<u8> + Sync,
{
    let mut img = RgbaImage::new(size, size);
    let stride = size as usize * 4;
    let raw: &mut [u8] = &mut img;
    raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        for x in 0..size as usize {
            row[x * 4..x * 4 + 4].copy_from_slice(&pixel(x as u32, y as u32).0);
        }
    });
    img
}

/// Diagonal warm-to-cool sweep.
fn gradient(size: u32) -> RgbaImage {
    let span = (size.max(2) - 1) as f32;
    fill_rows(size, |x, y| {
        let u = x as f32 / span;
        let v = y as f32 / span;
        Rgba([
            (255.0 * (1.0 - v)) as u8,
            (255.0 * (u * 0.5 + v * 0.5)) as u8,
            (255.0 * u) as u8,
            255,
        ])
    })
}

/// Concentric bands, good for seeing distortions.
fn rings(size: u32) -> RgbaImage {
    let c = size as f32 / 2.0;
    let band = (size as f32 / 16.0).max(1.0);
    fill_rows(size, |x, y| {
        let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt();
        if (d / band) as u32 % 2 == 0 {
            Rgba([240, 200, 40, 255])
        } else {
            Rgba([30, 60, 140, 255])
        }
    })
}

fn checker(size: u32) -> RgbaImage {
    let cell = (size / 8).max(1);
    fill_rows(size, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgba([230, 230, 230, 255])
        } else {
            Rgba([40, 40, 40, 255])
        }
    })
}

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::AssetLibrary;
use crate::filter::{FilterParams, FilterRequest, ParamValue};
use crate::log_warn;

// ============================================================================
// OUTPUT FORMATS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
        }
    }

    /// Parse a format name or file extension (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpeg" | "jpg" => Some(SaveFormat::Jpeg),
            "webp" => Some(SaveFormat::Webp),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_name)
    }
}

/// Encode `image` in `format` and write it to `path`, replacing any existing
/// file.  `quality` only matters for JPEG.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tga => {
            TgaEncoder::new(&mut writer).encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Webp => {
            drop(writer);
            DynamicImage::ImageRgba8(image.clone()).save(path)?;
        }
    }

    Ok(())
}

/// Synchronously decode any raster format the `image` crate understands.
pub fn load_image_sync(path: &Path) -> Result<RgbaImage, String> {
    let img = image::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(img.to_rgba8())
}

// ============================================================================
// PRESET FILES (.fsp)
// ============================================================================

const FSP_MAGIC_V1: &str = "FSP1";
pub const PRESET_EXTENSION: &str = "fsp";

#[derive(Serialize, Deserialize)]
struct PresetFileV1 {
    magic: String,
    filter: String,
    params: Vec<PresetParam>,
}

#[derive(Serialize, Deserialize)]
struct PresetParam {
    key: String,
    value: StoredValue,
}

/// Images are stored by asset name, never by pixels.
#[derive(Serialize, Deserialize)]
enum StoredValue {
    Scalar(f32),
    Vector(Vec<f32>),
    Asset(String),
}

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

impl From<Box<bincode::ErrorKind>> for PresetError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        PresetError::Serialize(e.to_string())
    }
}

pub fn save_preset(request: &FilterRequest, path: &Path) -> Result<(), PresetError> {
    let params = request
        .params
        .iter()
        .map(|(key, value)| PresetParam {
            key: key.to_string(),
            value: match value {
                ParamValue::Scalar(v) => StoredValue::Scalar(*v),
                ParamValue::Vector(v) => StoredValue::Vector(v.clone()),
                ParamValue::Image(img) => StoredValue::Asset(img.name().to_string()),
            },
        })
        .collect();

    let preset = PresetFileV1 {
        magic: FSP_MAGIC_V1.to_string(),
        filter: request.filter.clone(),
        params,
    };

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, &preset)?;
    Ok(())
}

/// Load a preset.  Image parameters whose asset cannot be resolved are
/// dropped with a warning; parameter sanitation fills them in later.
pub fn load_preset(path: &Path, assets: &AssetLibrary) -> Result<FilterRequest, PresetError> {
    let raw = std::fs::read(path)?;
    if raw.len() < 12 {
        return Err(PresetError::InvalidFormat("File too small".into()));
    }

    // bincode writes a String as an 8-byte length prefix + UTF-8 data, so
    // bytes 8..12 hold the magic.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != FSP_MAGIC_V1 {
        return Err(PresetError::InvalidFormat(format!(
            "Unknown magic '{}'",
            magic
        )));
    }

    let preset: PresetFileV1 = bincode::deserialize(&raw)?;

    let mut params = FilterParams::new();
    for PresetParam { key, value } in preset.params {
        let value = match value {
            StoredValue::Scalar(v) => ParamValue::Scalar(v),
            StoredValue::Vector(v) => ParamValue::Vector(v),
            StoredValue::Asset(name) => match assets.resolve(&name) {
                Some(img) => ParamValue::Image(img),
                None => {
                    log_warn!("preset {}: unknown asset '{}' for {}", path.display(), name, key);
                    continue;
                }
            },
        };
        params.set(key, value);
    }

    Ok(FilterRequest {
        filter: preset.filter,
        params,
    })
}

// ============================================================================
// PARAMETER VALUES: tagged scalar / vector / image values and the param map
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

use super::FilterError;
use crate::assets::AssetLibrary;

/// Key under which every image-consuming filter expects its primary input.
pub const INPUT_IMAGE_KEY: &str = "inputImage";

/// A named, shared RGBA8 image.  Cloning only bumps the reference count, so
/// snapshots of a request handed to the render worker stay cheap.
#[derive(Clone)]
pub struct ImageRef {
    name: Arc<str>,
    pixels: Arc<RgbaImage>,
}

impl ImageRef {
    pub fn new(name: impl Into<Arc<str>>, pixels: RgbaImage) -> Self {
        Self {
            name: name.into(),
            pixels: Arc::new(pixels),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

impl PartialEq for ImageRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && (Arc::ptr_eq(&self.pixels, &other.pixels) || self.pixels == other.pixels)
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "ImageRef({:?}, {}x{})", self.name, w, h)
    }
}

/// Value of a single filter parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Scalar(f32),
    Vector(Vec<f32>),
    Image(ImageRef),
}

impl ParamValue {
    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            ParamValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            ParamValue::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageRef> {
        match self {
            ParamValue::Image(img) => Some(img),
            _ => None,
        }
    }

    /// Parse editor text into a value.
    ///
    /// * `1.5`               scalar
    /// * `1,2,3` / `[1 2 3]` vector (commas or whitespace)
    /// * `@name`             asset from the library, or an image file path
    pub fn parse(text: &str, assets: &AssetLibrary) -> Result<Self, FilterError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FilterError::InvalidValue {
                text: text.to_string(),
                reason: "empty value".into(),
            });
        }

        if let Some(name) = text.strip_prefix('@') {
            return assets
                .resolve(name)
                .map(ParamValue::Image)
                .ok_or_else(|| FilterError::UnknownAsset(name.to_string()));
        }

        let bracketed = text.starts_with('[') && text.ends_with(']');
        let inner = if bracketed { &text[1..text.len() - 1] } else { text };
        let parts: Vec<&str> = inner
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();

        let parse_one = |p: &str| {
            p.parse::<f32>().map_err(|e| FilterError::InvalidValue {
                text: text.to_string(),
                reason: e.to_string(),
            })
        };

        if parts.len() == 1 && !bracketed {
            return parse_one(parts[0]).map(ParamValue::Scalar);
        }
        parts
            .into_iter()
            .map(parse_one)
            .collect::<Result<Vec<f32>, _>>()
            .map(ParamValue::Vector)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Scalar(v) => write!(f, "{}", v),
            ParamValue::Vector(v) => {
                let parts: Vec<String> = v.iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            ParamValue::Image(img) => write!(f, "@{}", img.name()),
        }
    }
}

/// Ordered parameter map keyed by input key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterParams {
    values: BTreeMap<String, ParamValue>,
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Insert or overwrite a single key.  Returns the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: ParamValue) -> Option<ParamValue> {
        self.values.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.values.remove(key)
    }

    /// Merge `other` into `self` key by key (last writer wins per key).
    pub fn merge(&mut self, other: FilterParams) {
        self.values.extend(other.values);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, ParamValue)> for FilterParams {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// The filter the user picked plus every parameter value they have set.
///
/// Values are kept across filter changes so that switching from one blur to
/// another preserves the radius; sanitation reconciles them with the new schema.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterRequest {
    pub filter: String,
    pub params: FilterParams,
}

// ============================================================================
// FILTER SCHEMA: parameter introspection and the catalog seam
// ============================================================================
//
// A filter describes its inputs with an ordered schema (key, class, default,
// slider range).  The preview pipeline never hard-codes a filter: it reads the
// schema to sanitise stored values and to decide which keys reach the kernel.
// ============================================================================

pub mod builtin;
pub mod sanitize;
pub mod value;

use image::RgbaImage;
use thiserror::Error;

pub use builtin::BuiltinCatalog;
pub use sanitize::{SanitizeAction, clamp_edit, fix_parameter_values};
pub use value::{FilterParams, FilterRequest, INPUT_IMAGE_KEY, ImageRef, ParamValue};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unknown filter '{0}'")]
    UnknownFilter(String),
    #[error("unknown asset '{0}'")]
    UnknownAsset(String),
    #[error("invalid value '{text}': {reason}")]
    InvalidValue { text: String, reason: String },
    #[error("expected KEY=VALUE, got '{0}'")]
    InvalidAssignment(String),
}

/// Kind of value a parameter accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamClass {
    Scalar,
    Vector,
    Image,
}

impl ParamClass {
    pub fn label(&self) -> &'static str {
        match self {
            ParamClass::Scalar => "scalar",
            ParamClass::Vector => "vector",
            ParamClass::Image => "image",
        }
    }
}

/// One input of a filter schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub key: String,
    pub display_name: String,
    pub class: ParamClass,
    /// Images never carry a default; the asset library supplies one.
    pub default: Option<ParamValue>,
    pub slider_min: Option<f32>,
    pub slider_max: Option<f32>,
    pub description: String,
}

impl ParamSpec {
    pub fn image(key: &str, display_name: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            class: ParamClass::Image,
            default: None,
            slider_min: None,
            slider_max: None,
            description: description.to_string(),
        }
    }

    pub fn scalar(key: &str, display_name: &str, default: f32, min: f32, max: f32) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            class: ParamClass::Scalar,
            default: Some(ParamValue::Scalar(default)),
            slider_min: Some(min),
            slider_max: Some(max),
            description: String::new(),
        }
    }

    pub fn vector(key: &str, display_name: &str, default: &[f32]) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            class: ParamClass::Vector,
            default: Some(ParamValue::Vector(default.to_vec())),
            slider_min: None,
            slider_max: None,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn default_vector(&self) -> Option<&[f32]> {
        self.default.as_ref().and_then(ParamValue::as_vector)
    }
}

/// Ordered description of a filter and its inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSchema {
    pub name: String,
    pub display_name: String,
    pub categories: Vec<String>,
    pub inputs: Vec<ParamSpec>,
}

impl FilterSchema {
    pub fn input(&self, key: &str) -> Option<&ParamSpec> {
        self.inputs.iter().find(|spec| spec.key == key)
    }

    pub fn input_keys(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|spec| spec.key.as_str())
    }
}

/// Parameter view handed to a filter kernel: request values first, schema
/// defaults second.
pub struct FilterInputs<'a> {
    schema: &'a FilterSchema,
    params: &'a FilterParams,
    /// Canonical frame size; generators use it as their output extent.
    pub extent: (u32, u32),
}

impl<'a> FilterInputs<'a> {
    pub fn new(schema: &'a FilterSchema, params: &'a FilterParams, extent: (u32, u32)) -> Self {
        Self {
            schema,
            params,
            extent,
        }
    }

    fn value(&self, key: &str) -> Option<&'a ParamValue> {
        self.params
            .get(key)
            .or_else(|| self.schema.input(key).and_then(|spec| spec.default.as_ref()))
    }

    pub fn scalar(&self, key: &str) -> f32 {
        self.value(key).and_then(ParamValue::as_scalar).unwrap_or(0.0)
    }

    /// Vector value padded with zeros (or truncated) to `N` components.
    pub fn vector<const N: usize>(&self, key: &str) -> [f32; N] {
        let mut out = [0.0; N];
        if let Some(v) = self.value(key).and_then(ParamValue::as_vector) {
            for (slot, c) in out.iter_mut().zip(v) {
                *slot = *c;
            }
        }
        out
    }

    pub fn image(&self, key: &str) -> Option<&'a RgbaImage> {
        self.params
            .get(key)
            .and_then(ParamValue::as_image)
            .map(ImageRef::pixels)
    }
}

/// A schema-described image transformation.
pub trait Filter: Send + Sync {
    fn schema(&self) -> &FilterSchema;

    /// Produce the output image, or `None` when a required input is missing.
    fn apply(&self, inputs: &FilterInputs<'_>) -> Option<RgbaImage>;
}

/// Lookup of filters by name.
pub trait FilterCatalog: Send + Sync {
    /// Filter names in display order.
    fn names(&self) -> Vec<&str>;

    fn filter(&self, name: &str) -> Option<&dyn Filter>;

    fn schema(&self, name: &str) -> Option<&FilterSchema> {
        self.filter(name).map(|f| f.schema())
    }
}

/// Parse a `key=value` assignment from the command line or a session script.
pub fn parse_assignment(
    text: &str,
    assets: &crate::assets::AssetLibrary,
) -> Result<(String, ParamValue), FilterError> {
    let Some((key, value)) = text.split_once('=') else {
        return Err(FilterError::InvalidAssignment(text.to_string()));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(FilterError::InvalidAssignment(text.to_string()));
    }
    Ok((key.to_string(), ParamValue::parse(value, assets)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetLibrary;

    fn schema() -> FilterSchema {
        FilterSchema {
            name: "Test".into(),
            display_name: "Test".into(),
            categories: vec![],
            inputs: vec![
                ParamSpec::image(INPUT_IMAGE_KEY, "Image", ""),
                ParamSpec::scalar("inputRadius", "Radius", 10.0, 0.0, 100.0),
                ParamSpec::vector("inputCenter", "Center", &[150.0, 150.0]),
            ],
        }
    }

    #[test]
    fn inputs_fall_back_to_schema_defaults() {
        let schema = schema();
        let params = FilterParams::new();
        let inputs = FilterInputs::new(&schema, &params, (640, 640));
        assert_eq!(inputs.scalar("inputRadius"), 10.0);
        assert_eq!(inputs.vector::<2>("inputCenter"), [150.0, 150.0]);
        assert!(inputs.image(INPUT_IMAGE_KEY).is_none());
    }

    #[test]
    fn inputs_prefer_request_values() {
        let schema = schema();
        let mut params = FilterParams::new();
        params.set("inputRadius", ParamValue::Scalar(3.0));
        params.set("inputCenter", ParamValue::Vector(vec![1.0]));
        let inputs = FilterInputs::new(&schema, &params, (640, 640));
        assert_eq!(inputs.scalar("inputRadius"), 3.0);
        assert_eq!(inputs.vector::<2>("inputCenter"), [1.0, 0.0]);
    }

    #[test]
    fn parses_assignments() {
        let assets = AssetLibrary::builtin(8);
        let (key, value) = parse_assignment("inputRadius=12", &assets).unwrap();
        assert_eq!(key, "inputRadius");
        assert_eq!(value, ParamValue::Scalar(12.0));

        assert!(matches!(
            parse_assignment("inputRadius", &assets),
            Err(FilterError::InvalidAssignment(_))
        ));
        assert!(matches!(
            parse_assignment("=3", &assets),
            Err(FilterError::InvalidAssignment(_))
        ));
    }
}

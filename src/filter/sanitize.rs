// ============================================================================
// PARAMETER SANITATION: reconcile stored values with a newly selected filter
// ============================================================================

use super::{FilterParams, FilterSchema, ImageRef, ParamClass, ParamSpec, ParamValue};

/// One adjustment made while sanitising.
#[derive(Clone, Debug, PartialEq)]
pub enum SanitizeAction {
    /// A missing image input was populated with the default asset.
    DefaultImage { key: String, asset: String },
    /// A scalar above the slider maximum was clamped.
    ClampedToMax { key: String, from: f32, to: f32 },
    /// A vector of the wrong arity was replaced by the schema default.
    VectorReset { key: String, from_len: usize, to_len: usize },
    /// A value of the wrong class was replaced by the schema default (or the
    /// default asset for image inputs).
    ClassReset { key: String, from: ParamClass, to: ParamClass },
}

fn class_of(value: &ParamValue) -> ParamClass {
    match value {
        ParamValue::Scalar(_) => ParamClass::Scalar,
        ParamValue::Vector(_) => ParamClass::Vector,
        ParamValue::Image(_) => ParamClass::Image,
    }
}

/// Make the stored parameter values safe for `schema`.
///
/// Only keys of the schema are touched; values the new filter does not know
/// about stay in `params` so they come back when the user switches filters
/// again.  Out-of-range values are corrected rather than rejected.
pub fn fix_parameter_values(
    schema: &FilterSchema,
    params: &mut FilterParams,
    default_image: &ImageRef,
) -> Vec<SanitizeAction> {
    let mut actions = Vec::new();

    for spec in &schema.inputs {
        let key = spec.key.as_str();

        if let Some(current) = params.get(key).map(class_of)
            && current != spec.class
        {
            let replacement = match spec.class {
                ParamClass::Image => Some(ParamValue::Image(default_image.clone())),
                _ => spec.default.clone(),
            };
            match replacement {
                Some(value) => {
                    params.set(key, value);
                }
                None => {
                    params.remove(key);
                }
            }
            actions.push(SanitizeAction::ClassReset {
                key: key.to_string(),
                from: current,
                to: spec.class,
            });
        }

        if spec.class == ParamClass::Image && !params.contains(key) {
            params.set(key, ParamValue::Image(default_image.clone()));
            actions.push(SanitizeAction::DefaultImage {
                key: key.to_string(),
                asset: default_image.name().to_string(),
            });
        }

        if let Some(max) = spec.slider_max
            && let Some(current) = params.get(key).and_then(ParamValue::as_scalar)
            && current > max
        {
            params.set(key, ParamValue::Scalar(max));
            actions.push(SanitizeAction::ClampedToMax {
                key: key.to_string(),
                from: current,
                to: max,
            });
        }

        if let Some(default) = spec.default_vector()
            && let Some(current) = params.get(key).and_then(ParamValue::as_vector)
            && current.len() != default.len()
        {
            let from_len = current.len();
            params.set(key, ParamValue::Vector(default.to_vec()));
            actions.push(SanitizeAction::VectorReset {
                key: key.to_string(),
                from_len,
                to_len: default.len(),
            });
        }
    }

    actions
}

/// Clamp a single edit against the selected filter's input `spec`.  Scalars
/// above the slider maximum come back at the maximum; everything else passes
/// through untouched.
pub fn clamp_edit(spec: &ParamSpec, value: ParamValue) -> (ParamValue, Option<SanitizeAction>) {
    match (&value, spec.slider_max) {
        (ParamValue::Scalar(v), Some(max)) if *v > max => (
            ParamValue::Scalar(max),
            Some(SanitizeAction::ClampedToMax {
                key: spec.key.clone(),
                from: *v,
                to: max,
            }),
        ),
        _ => (value, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{INPUT_IMAGE_KEY, ParamSpec};
    use approx::assert_relative_eq;
    use image::RgbaImage;

    fn default_image() -> ImageRef {
        ImageRef::new("gradient", RgbaImage::new(4, 4))
    }

    fn schema(inputs: Vec<ParamSpec>) -> FilterSchema {
        FilterSchema {
            name: "Next".into(),
            display_name: "Next".into(),
            categories: vec![],
            inputs,
        }
    }

    #[test]
    fn clamps_scalar_above_slider_max() {
        let schema = schema(vec![ParamSpec::scalar("inputRadius", "Radius", 10.0, 0.0, 100.0)]);
        let mut params = FilterParams::new();
        params.set("inputRadius", ParamValue::Scalar(200.0));

        let actions = fix_parameter_values(&schema, &mut params, &default_image());

        let value = params.get("inputRadius").and_then(ParamValue::as_scalar).unwrap();
        assert_relative_eq!(value, 100.0);
        assert_eq!(
            actions,
            vec![SanitizeAction::ClampedToMax {
                key: "inputRadius".into(),
                from: 200.0,
                to: 100.0
            }]
        );
    }

    #[test]
    fn leaves_values_below_min_alone() {
        let schema = schema(vec![ParamSpec::scalar("inputScale", "Scale", 0.5, -1.0, 1.0)]);
        let mut params = FilterParams::new();
        params.set("inputScale", ParamValue::Scalar(-5.0));

        let actions = fix_parameter_values(&schema, &mut params, &default_image());

        assert!(actions.is_empty());
        assert_eq!(params.get("inputScale"), Some(&ParamValue::Scalar(-5.0)));
    }

    #[test]
    fn replaces_vector_of_wrong_arity_with_default() {
        let schema = schema(vec![ParamSpec::vector("inputColor", "Color", &[1.0, 0.5, 0.25])]);
        let mut params = FilterParams::new();
        params.set("inputColor", ParamValue::Vector(vec![0.1, 0.2, 0.3, 0.4]));

        fix_parameter_values(&schema, &mut params, &default_image());

        assert_eq!(
            params.get("inputColor"),
            Some(&ParamValue::Vector(vec![1.0, 0.5, 0.25]))
        );
    }

    #[test]
    fn keeps_vector_of_matching_arity() {
        let schema = schema(vec![ParamSpec::vector("inputCenter", "Center", &[150.0, 150.0])]);
        let mut params = FilterParams::new();
        params.set("inputCenter", ParamValue::Vector(vec![20.0, 40.0]));

        let actions = fix_parameter_values(&schema, &mut params, &default_image());

        assert!(actions.is_empty());
        assert_eq!(
            params.get("inputCenter"),
            Some(&ParamValue::Vector(vec![20.0, 40.0]))
        );
    }

    #[test]
    fn populates_missing_images_only() {
        let schema = schema(vec![
            ParamSpec::image(INPUT_IMAGE_KEY, "Image", ""),
            ParamSpec::image("inputBackgroundImage", "Background", ""),
        ]);
        let user_image = ImageRef::new("photo", RgbaImage::new(2, 2));
        let mut params = FilterParams::new();
        params.set(INPUT_IMAGE_KEY, ParamValue::Image(user_image.clone()));

        let actions = fix_parameter_values(&schema, &mut params, &default_image());

        assert_eq!(params.get(INPUT_IMAGE_KEY), Some(&ParamValue::Image(user_image)));
        assert_eq!(
            params
                .get("inputBackgroundImage")
                .and_then(ParamValue::as_image)
                .map(ImageRef::name),
            Some("gradient")
        );
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn ignores_keys_outside_the_schema() {
        let schema = schema(vec![ParamSpec::scalar("inputRadius", "Radius", 10.0, 0.0, 100.0)]);
        let mut params = FilterParams::new();
        params.set("inputAngle", ParamValue::Scalar(999.0));

        fix_parameter_values(&schema, &mut params, &default_image());

        assert_eq!(params.get("inputAngle"), Some(&ParamValue::Scalar(999.0)));
        assert!(!params.contains("inputRadius"));
    }

    #[test]
    fn image_input_holding_a_scalar_gets_the_default_asset() {
        let schema = schema(vec![ParamSpec::image("inputBackgroundImage", "Background", "")]);
        let mut params = FilterParams::new();
        params.set("inputBackgroundImage", ParamValue::Scalar(3.0));

        let actions = fix_parameter_values(&schema, &mut params, &default_image());

        assert_eq!(
            params
                .get("inputBackgroundImage")
                .and_then(ParamValue::as_image)
                .map(ImageRef::name),
            Some("gradient")
        );
        assert_eq!(
            actions,
            vec![SanitizeAction::ClassReset {
                key: "inputBackgroundImage".into(),
                from: ParamClass::Scalar,
                to: ParamClass::Image,
            }]
        );
    }

    #[test]
    fn vector_input_holding_a_scalar_is_reset_to_default() {
        let schema = schema(vec![ParamSpec::vector("inputCenter", "Center", &[150.0, 150.0])]);
        let mut params = FilterParams::new();
        params.set("inputCenter", ParamValue::Scalar(5.0));

        let actions = fix_parameter_values(&schema, &mut params, &default_image());

        assert_eq!(
            params.get("inputCenter"),
            Some(&ParamValue::Vector(vec![150.0, 150.0]))
        );
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn scalar_input_holding_a_vector_is_reset_then_kept_in_range() {
        let schema = schema(vec![ParamSpec::scalar("inputRadius", "Radius", 10.0, 0.0, 100.0)]);
        let mut params = FilterParams::new();
        params.set("inputRadius", ParamValue::Vector(vec![1.0, 2.0]));

        fix_parameter_values(&schema, &mut params, &default_image());

        assert_eq!(params.get("inputRadius"), Some(&ParamValue::Scalar(10.0)));
    }

    #[test]
    fn clamp_edit_caps_scalars_at_slider_max() {
        let spec = ParamSpec::scalar("inputRadius", "Radius", 10.0, 0.0, 100.0);

        let (value, action) = clamp_edit(&spec, ParamValue::Scalar(f32::INFINITY));
        assert_eq!(value, ParamValue::Scalar(100.0));
        assert!(matches!(action, Some(SanitizeAction::ClampedToMax { to, .. }) if to == 100.0));

        let (value, action) = clamp_edit(&spec, ParamValue::Scalar(-3.0));
        assert_eq!(value, ParamValue::Scalar(-3.0));
        assert!(action.is_none());
    }
}

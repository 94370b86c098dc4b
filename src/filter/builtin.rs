// ============================================================================
// BUILT-IN CATALOG: CPU filters with Core Image style schemas
// ============================================================================

use image::RgbaImage;

use super::{Filter, FilterCatalog, FilterInputs, FilterSchema, INPUT_IMAGE_KEY, ParamSpec};
use crate::ops::{blur, effects};

type Kernel = fn(&FilterInputs<'_>) -> Option<RgbaImage>;

/// A schema bound to a pixel kernel.
pub struct BuiltinFilter {
    schema: FilterSchema,
    kernel: Kernel,
}

impl Filter for BuiltinFilter {
    fn schema(&self) -> &FilterSchema {
        &self.schema
    }

    fn apply(&self, inputs: &FilterInputs<'_>) -> Option<RgbaImage> {
        (self.kernel)(inputs)
    }
}

pub struct BuiltinCatalog {
    filters: Vec<BuiltinFilter>,
}

impl BuiltinCatalog {
    pub fn new() -> Self {
        let filters = vec![
            gaussian_blur(),
            pixellate(),
            twirl_distortion(),
            bump_distortion(),
            vignette(),
            color_controls(),
            color_invert(),
            crop(),
            source_over_compositing(),
            checkerboard_generator(),
        ];
        Self { filters }
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for f in &self.filters {
            for c in &f.schema.categories {
                if !out.contains(&c.as_str()) {
                    out.push(c);
                }
            }
        }
        out
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a FilterSchema> {
        self.filters
            .iter()
            .map(|f| &f.schema)
            .filter(move |s| s.categories.iter().any(|c| c == category))
    }
}

impl Default for BuiltinCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCatalog for BuiltinCatalog {
    fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.schema.name.as_str()).collect()
    }

    fn filter(&self, name: &str) -> Option<&dyn Filter> {
        self.filters
            .iter()
            .find(|f| f.schema.name == name)
            .map(|f| f as &dyn Filter)
    }
}

fn schema(name: &str, display_name: &str, categories: &[&str], inputs: Vec<ParamSpec>) -> FilterSchema {
    FilterSchema {
        name: name.to_string(),
        display_name: display_name.to_string(),
        categories: categories.iter().map(|c| c.to_string()).collect(),
        inputs,
    }
}

fn input_image() -> ParamSpec {
    ParamSpec::image(INPUT_IMAGE_KEY, "Image", "The image to use as an input image.")
}

fn center() -> ParamSpec {
    ParamSpec::vector("inputCenter", "Center", &[150.0, 150.0])
        .with_description("The center of the effect as x and y coordinates.")
}

// ============================================================================
// FILTER DEFINITIONS
// ============================================================================

fn gaussian_blur() -> BuiltinFilter {
    BuiltinFilter {
        schema: schema(
            "GaussianBlur",
            "Gaussian Blur",
            &["Blur", "Still Image", "Video"],
            vec![
                input_image(),
                ParamSpec::scalar("inputRadius", "Radius", 10.0, 0.0, 100.0)
                    .with_description("Standard deviation of the blur in pixels."),
            ],
        ),
        kernel: |i| blur::gaussian_blur(i.image(INPUT_IMAGE_KEY)?, i.scalar("inputRadius")),
    }
}

fn pixellate() -> BuiltinFilter {
    BuiltinFilter {
        schema: schema(
            "Pixellate",
            "Pixellate",
            &["Stylize", "Still Image", "Video"],
            vec![
                input_image(),
                center(),
                ParamSpec::scalar("inputScale", "Scale", 8.0, 1.0, 100.0)
                    .with_description("Size of the pixels in the output image."),
            ],
        ),
        kernel: |i| {
            effects::pixellate(
                i.image(INPUT_IMAGE_KEY)?,
                i.vector("inputCenter"),
                i.scalar("inputScale"),
            )
        },
    }
}

fn twirl_distortion() -> BuiltinFilter {
    BuiltinFilter {
        schema: schema(
            "TwirlDistortion",
            "Twirl Distortion",
            &["Distortion Effect", "Still Image", "Video"],
            vec![
                input_image(),
                center(),
                ParamSpec::scalar("inputRadius", "Radius", 300.0, 0.0, 500.0),
                ParamSpec::scalar("inputAngle", "Angle", std::f32::consts::PI, -12.57, 12.57)
                    .with_description("Rotation at the center in radians."),
            ],
        ),
        kernel: |i| {
            effects::twirl(
                i.image(INPUT_IMAGE_KEY)?,
                i.vector("inputCenter"),
                i.scalar("inputRadius"),
                i.scalar("inputAngle"),
            )
        },
    }
}

fn bump_distortion() -> BuiltinFilter {
    BuiltinFilter {
        schema: schema(
            "BumpDistortion",
            "Bump Distortion",
            &["Distortion Effect", "Still Image", "Video"],
            vec![
                input_image(),
                center(),
                ParamSpec::scalar("inputRadius", "Radius", 300.0, 0.0, 600.0),
                ParamSpec::scalar("inputScale", "Scale", 0.5, -1.0, 1.0)
                    .with_description("Positive values bulge outwards, negative values pinch."),
            ],
        ),
        kernel: |i| {
            effects::bump(
                i.image(INPUT_IMAGE_KEY)?,
                i.vector("inputCenter"),
                i.scalar("inputRadius"),
                i.scalar("inputScale"),
            )
        },
    }
}

fn vignette() -> BuiltinFilter {
    BuiltinFilter {
        schema: schema(
            "Vignette",
            "Vignette",
            &["Color Effect", "Still Image", "Video"],
            vec![
                input_image(),
                ParamSpec::scalar("inputIntensity", "Intensity", 0.0, -1.0, 1.0),
                ParamSpec::scalar("inputRadius", "Radius", 1.0, 0.0, 2.0),
            ],
        ),
        kernel: |i| {
            effects::vignette(
                i.image(INPUT_IMAGE_KEY)?,
                i.scalar("inputIntensity"),
                i.scalar("inputRadius"),
            )
        },
    }
}

fn color_controls() -> BuiltinFilter {
    BuiltinFilter {
        schema: schema(
            "ColorControls",
            "Color Controls",
            &["Color Adjustment", "Still Image", "Video"],
            vec![
                input_image(),
                ParamSpec::scalar("inputSaturation", "Saturation", 1.0, 0.0, 2.0),
                ParamSpec::scalar("inputBrightness", "Brightness", 0.0, -1.0, 1.0),
                ParamSpec::scalar("inputContrast", "Contrast", 1.0, 0.25, 4.0),
            ],
        ),
        kernel: |i| {
            effects::color_controls(
                i.image(INPUT_IMAGE_KEY)?,
                i.scalar("inputSaturation"),
                i.scalar("inputBrightness"),
                i.scalar("inputContrast"),
            )
        },
    }
}

fn color_invert() -> BuiltinFilter {
    BuiltinFilter {
        schema: schema(
            "ColorInvert",
            "Color Invert",
            &["Color Effect", "Still Image", "Video"],
            vec![input_image()],
        ),
        kernel: |i| effects::color_invert(i.image(INPUT_IMAGE_KEY)?),
    }
}

fn crop() -> BuiltinFilter {
    BuiltinFilter {
        schema: schema(
            "Crop",
            "Crop",
            &["Geometry Adjustment", "Still Image", "Video"],
            vec![
                input_image(),
                ParamSpec::vector("inputRectangle", "Rectangle", &[0.0, 0.0, 300.0, 300.0])
                    .with_description("Region to keep as x, y, width and height."),
            ],
        ),
        kernel: |i| effects::crop(i.image(INPUT_IMAGE_KEY)?, i.vector("inputRectangle")),
    }
}

fn source_over_compositing() -> BuiltinFilter {
    BuiltinFilter {
        schema: schema(
            "SourceOverCompositing",
            "Source Over Compositing",
            &["Composite Operation", "Still Image", "Video"],
            vec![
                input_image(),
                ParamSpec::image(
                    "inputBackgroundImage",
                    "Background Image",
                    "The image to use as a background image.",
                ),
            ],
        ),
        kernel: |i| {
            effects::source_over(i.image(INPUT_IMAGE_KEY)?, i.image("inputBackgroundImage")?)
        },
    }
}

fn checkerboard_generator() -> BuiltinFilter {
    BuiltinFilter {
        schema: schema(
            "CheckerboardGenerator",
            "Checkerboard",
            &["Generator", "Still Image", "Video"],
            vec![
                center(),
                ParamSpec::vector("inputColor0", "Color 1", &[1.0, 1.0, 1.0, 1.0]),
                ParamSpec::vector("inputColor1", "Color 2", &[0.0, 0.0, 0.0, 1.0]),
                ParamSpec::scalar("inputWidth", "Width", 80.0, 0.0, 800.0),
                ParamSpec::scalar("inputSharpness", "Sharpness", 1.0, 0.0, 1.0),
            ],
        ),
        kernel: |i| {
            effects::checkerboard(
                i.extent,
                i.vector("inputCenter"),
                i.vector("inputColor0"),
                i.vector("inputColor1"),
                i.scalar("inputWidth"),
                i.scalar("inputSharpness"),
            )
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetLibrary;
    use crate::filter::{FilterParams, ParamClass, ParamValue, fix_parameter_values};

    #[test]
    fn names_are_unique_and_resolvable() {
        let catalog = BuiltinCatalog::new();
        let names = catalog.names();
        assert_eq!(names.len(), 10);
        for name in &names {
            assert_eq!(catalog.schema(name).map(|s| s.name.as_str()), Some(*name));
            assert_eq!(names.iter().filter(|n| *n == name).count(), 1);
        }
        assert!(catalog.filter("NoSuchFilter").is_none());
    }

    #[test]
    fn every_filter_renders_with_sanitised_defaults() {
        let catalog = BuiltinCatalog::new();
        let assets = AssetLibrary::builtin(48);
        for name in catalog.names() {
            let schema = catalog.schema(name).unwrap();
            let mut params = FilterParams::new();
            fix_parameter_values(schema, &mut params, &assets.default_image("gradient"));
            let inputs = FilterInputs::new(schema, &params, (48, 48));
            let out = catalog.filter(name).unwrap().apply(&inputs);
            assert!(out.is_some(), "{} produced no output", name);
        }
    }

    #[test]
    fn image_filters_need_an_image() {
        let catalog = BuiltinCatalog::new();
        let schema = catalog.schema("GaussianBlur").unwrap();
        let params = FilterParams::new();
        let inputs = FilterInputs::new(schema, &params, (16, 16));
        assert!(catalog.filter("GaussianBlur").unwrap().apply(&inputs).is_none());
    }

    #[test]
    fn crop_shrinks_output() {
        let catalog = BuiltinCatalog::new();
        let assets = AssetLibrary::builtin(64);
        let schema = catalog.schema("Crop").unwrap();
        let mut params = FilterParams::new();
        params.set(INPUT_IMAGE_KEY, ParamValue::Image(assets.first().clone()));
        params.set("inputRectangle", ParamValue::Vector(vec![8.0, 8.0, 20.0, 10.0]));
        let inputs = FilterInputs::new(schema, &params, (64, 64));
        let out = catalog.filter("Crop").unwrap().apply(&inputs).unwrap();
        assert_eq!(out.dimensions(), (20, 10));
    }

    #[test]
    fn schemas_declare_image_inputs_first() {
        let catalog = BuiltinCatalog::new();
        for name in catalog.names() {
            let schema = catalog.schema(name).unwrap();
            if let Some(pos) = schema.inputs.iter().position(|s| s.class == ParamClass::Image) {
                assert_eq!(pos, 0, "{} lists an image after other inputs", name);
            }
        }
    }

    #[test]
    fn categories_group_filters() {
        let catalog = BuiltinCatalog::new();
        assert!(catalog.categories().contains(&"Distortion Effect"));
        let distortions: Vec<_> = catalog
            .in_category("Distortion Effect")
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(distortions, ["TwirlDistortion", "BumpDistortion"]);
    }
}

// ============================================================================
// RENDER ENGINE: turn a request snapshot into a frame-sized preview
// ============================================================================

pub mod composite;

use std::sync::Arc;

use image::RgbaImage;

pub use composite::{FrameSpec, fit_to_frame};

use crate::filter::{FilterCatalog, FilterInputs, FilterParams, FilterRequest};
use crate::log_warn;

/// Produces preview pixels for a fully populated request.
///
/// Called on the worker lane; implementations may block.  `None` means "no
/// update" and leaves the previous preview on screen.
pub trait RenderEngine: Send + Sync {
    fn render(&self, request: &FilterRequest) -> Option<RgbaImage>;
}

/// Runs catalog filters on the CPU and fits the result into a fixed frame.
pub struct CpuRenderEngine {
    catalog: Arc<dyn FilterCatalog>,
    frame: FrameSpec,
}

impl CpuRenderEngine {
    pub fn new(catalog: Arc<dyn FilterCatalog>, frame: FrameSpec) -> Self {
        Self { catalog, frame }
    }

    pub fn frame(&self) -> &FrameSpec {
        &self.frame
    }
}

impl RenderEngine for CpuRenderEngine {
    fn render(&self, request: &FilterRequest) -> Option<RgbaImage> {
        let Some(filter) = self.catalog.filter(&request.filter) else {
            log_warn!("render skipped: unknown filter '{}'", request.filter);
            return None;
        };
        let schema = filter.schema();

        // Only the keys the filter declares reach the kernel; everything else
        // the user set for other filters stays in the request untouched.
        let params: FilterParams = request
            .params
            .iter()
            .filter(|(key, _)| schema.input(key).is_some())
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();

        let inputs = FilterInputs::new(schema, &params, (self.frame.width, self.frame.height));
        let Some(output) = filter.apply(&inputs) else {
            log_warn!("filter '{}' produced no output", request.filter);
            return None;
        };
        Some(fit_to_frame(&output, &self.frame))
    }
}

// ============================================================================
// FRAME FITTING: place filter output in the canonical preview frame
// ============================================================================

use image::{Rgba, RgbaImage, imageops};

/// Fixed output frame every preview is rendered into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSpec {
    pub width: u32,
    pub height: u32,
    /// Opaque colour shown behind outputs that do not cover the frame.
    pub background: Rgba<u8>,
}

impl FrameSpec {
    pub const CANONICAL_SIZE: u32 = 640;

    pub fn square(size: u32, background: Rgba<u8>) -> Self {
        Self {
            width: size,
            height: size,
            background,
        }
    }
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self::square(Self::CANONICAL_SIZE, Rgba([0, 0, 0, 255]))
    }
}

/// Fit `output` into `frame`.
///
/// Outputs narrower or shorter than the frame (crops, wraps, halos) are
/// composited over the opaque background first; the frame-sized region at the
/// origin is returned either way.
pub fn fit_to_frame(output: &RgbaImage, frame: &FrameSpec) -> RgbaImage {
    let (w, h) = output.dimensions();
    if w < frame.width || h < frame.height {
        let mut canvas = RgbaImage::from_pixel(frame.width, frame.height, frame.background);
        imageops::overlay(&mut canvas, output, 0, 0);
        return canvas;
    }
    imageops::crop_imm(output, 0, 0, frame.width, frame.height).to_image()
}

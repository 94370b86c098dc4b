// ============================================================================
// BLUR: rayon-parallel separable Gaussian blur
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma), never wider than
/// `max_radius` taps per side.  Taps past the image edge would only re-read
/// clamped edge pixels.
fn build_gaussian_kernel(sigma: f32, max_radius: usize) -> Vec<f32> {
    let radius = ((sigma * 3.0).ceil() as usize).min(max_radius);
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let inv = 1.0 / kernel.iter().sum::<f32>();
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// One pass of the separable convolution over an interleaved RGBA buffer,
/// along rows when `horizontal`, otherwise along columns.
fn convolve_pass(
    src: &[f32],
    w: usize,
    h: usize,
    kernel: &[f32],
    horizontal: bool,
) -> Vec<f32> {
    let radius = kernel.len() / 2;
    let mut out = vec![0.0f32; src.len()];
    out.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let offset = ki as isize - radius as isize;
                let idx = if horizontal {
                    let sx = (x as isize + offset).clamp(0, w as isize - 1) as usize;
                    y * w * 4 + sx * 4
                } else {
                    let sy = (y as isize + offset).clamp(0, h as isize - 1) as usize;
                    sy * w * 4 + x * 4
                };
                for c in 0..4 {
                    acc[c] += src[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });
    out
}

/// Gaussian blur with standard deviation `sigma`, edges clamped.
pub fn gaussian_blur(src: &RgbaImage, sigma: f32) -> Option<RgbaImage> {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 || sigma <= 0.0 {
        return Some(src.clone());
    }

    let kernel = build_gaussian_kernel(sigma, w.max(h));
    let buf_in: Vec<f32> = src.as_raw().iter().map(|&b| b as f32).collect();
    let buf_h = convolve_pass(&buf_in, w, h, &kernel, true);
    let buf_v = convolve_pass(&buf_h, w, h, &kernel, false);

    let dst_raw: Vec<u8> = buf_v
        .iter()
        .map(|&v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    RgbaImage::from_raw(w as u32, h as u32, dst_raw)
}

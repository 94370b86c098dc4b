// ============================================================================
// EFFECTS ENGINE: rayon-parallelized pixel kernels behind the built-in filters
// ============================================================================
//
// Kernels are plain functions over `RgbaImage`; schema handling lives in
// `filter::builtin`.  Every kernel returns `Option` so a failed buffer
// construction surfaces as "no output" instead of a panic.
//
// Groups:
//   - Distortion: Pixellate, Twirl, Bump
//   - Stylize: Vignette
//   - Color: Color Controls, Color Invert
//   - Geometry / Composite: Crop, Source Over
//   - Generator: Checkerboard
// ============================================================================

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Per-pixel transform: `transform` receives (x, y, r, g, b, a) as floats in
/// 0..=255 and returns the new channel values.
fn apply_per_pixel<F>(flat: &RgbaImage, transform: F) -> Option<RgbaImage>
where
    F: Fn(u32, u32, f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let w = flat.width() as usize;
    let h = flat.height() as usize;
    if w == 0 || h == 0 {
        return Some(flat.clone());
    }

    let src_raw = flat.as_raw();
    let mut dst_raw = vec![0u8; w * h * 4];
    let stride = w * 4;

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            let row_in = &src_raw[y * stride..(y + 1) * stride];
            for x in 0..w {
                let pi = x * 4;
                let (nr, ng, nb, na) = transform(
                    x as u32,
                    y as u32,
                    row_in[pi] as f32,
                    row_in[pi + 1] as f32,
                    row_in[pi + 2] as f32,
                    row_in[pi + 3] as f32,
                );
                row_out[pi] = nr.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 1] = ng.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 2] = nb.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 3] = na.round().clamp(0.0, 255.0) as u8;
            }
        });

    RgbaImage::from_raw(w as u32, h as u32, dst_raw)
}

/// Generate an image of the given size from a per-pixel function.
fn generate<F>(width: u32, height: u32, pixel: F) -> Option<RgbaImage>
where
    F: Fn(u32, u32) -> [u8; 4] + Sync,
{
    let stride = width as usize * 4;
    let mut raw = vec![0u8; stride * height as usize];
    if stride > 0 {
        raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
            for x in 0..width as usize {
                row[x * 4..x * 4 + 4].copy_from_slice(&pixel(x as u32, y as u32));
            }
        });
    }
    RgbaImage::from_raw(width, height, raw)
}

/// Clamp-sample a pixel from an image.
#[inline]
fn sample_clamped(img: &RgbaImage, x: i32, y: i32) -> [f32; 4] {
    let cx = x.clamp(0, img.width() as i32 - 1) as u32;
    let cy = y.clamp(0, img.height() as i32 - 1) as u32;
    let p = img.get_pixel(cx, cy);
    [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
}

/// Bilinear-sample at fractional coordinates.
#[inline]
fn sample_bilinear(img: &RgbaImage, fx: f32, fy: f32) -> [f32; 4] {
    let x0 = fx.floor() as i32;
    let y0 = fy.floor() as i32;
    let dx = fx - x0 as f32;
    let dy = fy - y0 as f32;

    let p00 = sample_clamped(img, x0, y0);
    let p10 = sample_clamped(img, x0 + 1, y0);
    let p01 = sample_clamped(img, x0, y0 + 1);
    let p11 = sample_clamped(img, x0 + 1, y0 + 1);

    let mut out = [0.0f32; 4];
    for c in 0..4 {
        out[c] = p00[c] * (1.0 - dx) * (1.0 - dy)
            + p10[c] * dx * (1.0 - dy)
            + p01[c] * (1.0 - dx) * dy
            + p11[c] * dx * dy;
    }
    out
}

#[inline]
fn unit_to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

// ============================================================================
// DISTORTION
// ============================================================================

/// Block mosaic whose grid is anchored at `center`; each block takes the
/// colour of its centre pixel.
pub fn pixellate(flat: &RgbaImage, center: [f32; 2], scale: f32) -> Option<RgbaImage> {
    let bs = scale.max(1.0);
    apply_per_pixel(flat, |x, y, _r, _g, _b, _a| {
        let bx = ((x as f32 - center[0]) / bs).floor() * bs + center[0] + bs / 2.0;
        let by = ((y as f32 - center[1]) / bs).floor() * bs + center[1] + bs / 2.0;
        let p = sample_clamped(flat, bx as i32, by as i32);
        (p[0], p[1], p[2], p[3])
    })
}

/// Rotate pixels around `center`; the rotation is `angle` radians at the
/// centre and falls off linearly to zero at `radius`.
pub fn twirl(flat: &RgbaImage, center: [f32; 2], radius: f32, angle: f32) -> Option<RgbaImage> {
    let radius = radius.max(f32::EPSILON);
    apply_per_pixel(flat, |x, y, r, g, b, a| {
        let dx = x as f32 - center[0];
        let dy = y as f32 - center[1];
        let dist = (dx * dx + dy * dy).sqrt();
        if dist >= radius {
            return (r, g, b, a);
        }

        let rotation = angle * (1.0 - dist / radius);
        let (sin_r, cos_r) = rotation.sin_cos();
        let src_x = center[0] + dx * cos_r - dy * sin_r;
        let src_y = center[1] + dx * sin_r + dy * cos_r;
        let p = sample_bilinear(flat, src_x, src_y);
        (p[0], p[1], p[2], p[3])
    })
}

/// Spherical bulge (positive `scale`) or pinch (negative `scale`) inside
/// `radius` around `center`.
pub fn bump(flat: &RgbaImage, center: [f32; 2], radius: f32, scale: f32) -> Option<RgbaImage> {
    let radius = radius.max(f32::EPSILON);
    apply_per_pixel(flat, |x, y, r, g, b, a| {
        let dx = x as f32 - center[0];
        let dy = y as f32 - center[1];
        let norm = (dx * dx + dy * dy).sqrt() / radius;
        if norm >= 1.0 || scale == 0.0 {
            return (r, g, b, a);
        }

        let power = (1.0 - norm).powf(scale.abs());
        let factor = if scale > 0.0 {
            norm * (1.0 - power) + power
        } else {
            1.0 + (1.0 - power) * (1.0 - norm)
        };
        let p = sample_bilinear(flat, center[0] + dx * factor, center[1] + dy * factor);
        (p[0], p[1], p[2], p[3])
    })
}

// ============================================================================
// STYLIZE
// ============================================================================

/// Darken (positive intensity) or lighten (negative) towards the corners.
/// `radius` is the normalised distance at which the full effect is reached.
pub fn vignette(flat: &RgbaImage, intensity: f32, radius: f32) -> Option<RgbaImage> {
    let cx = flat.width() as f32 / 2.0;
    let cy = flat.height() as f32 / 2.0;
    let max_dist = (cx * cx + cy * cy).sqrt().max(f32::EPSILON);
    let soft = radius.max(0.01);

    apply_per_pixel(flat, |x, y, r, g, b, a| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let dist = (dx * dx + dy * dy).sqrt() / max_dist;
        let falloff = (dist / soft).min(1.0).powi(2);
        let vf = (1.0 - intensity * falloff).max(0.0);
        (r * vf, g * vf, b * vf, a)
    })
}

// ============================================================================
// COLOR
// ============================================================================

/// Saturation (1 = unchanged), brightness offset (-1..1 of full range) and
/// contrast around mid-grey (1 = unchanged).
pub fn color_controls(
    flat: &RgbaImage,
    saturation: f32,
    brightness: f32,
    contrast: f32,
) -> Option<RgbaImage> {
    let offset = brightness * 255.0;
    apply_per_pixel(flat, |_x, _y, r, g, b, a| {
        let lum = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        let adjust = |c: f32| {
            let saturated = lum + (c - lum) * saturation;
            (saturated + offset - 127.5) * contrast + 127.5
        };
        (adjust(r), adjust(g), adjust(b), a)
    })
}

pub fn color_invert(flat: &RgbaImage) -> Option<RgbaImage> {
    apply_per_pixel(flat, |_x, _y, r, g, b, a| (255.0 - r, 255.0 - g, 255.0 - b, a))
}

// ============================================================================
// GEOMETRY / COMPOSITE
// ============================================================================

/// Crop to `rect` = [x, y, width, height], intersected with the image bounds.
/// An empty intersection produces no output.
pub fn crop(flat: &RgbaImage, rect: [f32; 4]) -> Option<RgbaImage> {
    let (w, h) = flat.dimensions();
    let x0 = rect[0].max(0.0).floor() as u32;
    let y0 = rect[1].max(0.0).floor() as u32;
    let x1 = ((rect[0] + rect[2]).ceil().max(0.0) as u32).min(w);
    let y1 = ((rect[1] + rect[3]).ceil().max(0.0) as u32).min(h);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some(imageops::crop_imm(flat, x0, y0, x1 - x0, y1 - y0).to_image())
}

/// Alpha-composite `source` over `background`; the output covers both.
pub fn source_over(source: &RgbaImage, background: &RgbaImage) -> Option<RgbaImage> {
    let w = source.width().max(background.width());
    let h = source.height().max(background.height());
    let mut out = RgbaImage::new(w, h);
    imageops::overlay(&mut out, background, 0, 0);
    imageops::overlay(&mut out, source, 0, 0);
    Some(out)
}

// ============================================================================
// GENERATOR
// ============================================================================

/// Checkerboard of `width`-sized squares anchored at `center`.  Colours are
/// RGBA in 0..=1.  `sharpness` below 1 softens the square edges.
pub fn checkerboard(
    extent: (u32, u32),
    center: [f32; 2],
    color0: [f32; 4],
    color1: [f32; 4],
    width: f32,
    sharpness: f32,
) -> Option<RgbaImage> {
    let size = width.max(1.0);
    let blend_zone = (1.0 - sharpness.clamp(0.0, 1.0)) * 0.5;

    generate(extent.0, extent.1, |x, y| {
        let sx = (x as f32 - center[0]) / size;
        let sy = (y as f32 - center[1]) / size;
        let odd = (sx.floor() as i64 + sy.floor() as i64).rem_euclid(2) == 1;
        let mut t = if odd { 1.0 } else { 0.0 };

        if blend_zone > 0.0 {
            let edge_x = sx.fract().abs().min(1.0 - sx.fract().abs());
            let edge_y = sy.fract().abs().min(1.0 - sy.fract().abs());
            let edge = edge_x.min(edge_y);
            if edge < blend_zone {
                let mix = (1.0 - edge / blend_zone) * 0.5;
                t = t * (1.0 - mix) + 0.5 * mix;
            }
        }

        let mut px = [0u8; 4];
        for c in 0..4 {
            px[c] = unit_to_byte(color0[c] * (1.0 - t) + color1[c] * t);
        }
        px
    })
}

/// Solid image of one colour.
pub fn solid(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color)
}

//! Pixel-level colour operations: luminance, HSV and colour jitter.

use image::RgbImage;
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// ITU-R 601-2 luma on 8-bit channels, rounded in 16-bit fixed point the
/// way "L" conversions are.
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
}

/// `rgb` in `[0, 1]` to `(hue, saturation, value)` in `[0, 1]`.
pub fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let s = if max > 0.0 { delta / max } else { 0.0 };
    if delta <= 0.0 {
        return (0.0, s, max);
    }
    let h = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    (h / 6.0, s, max)
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let h6 = h.rem_euclid(1.0) * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as u32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    }
}

/// Converts a `[3, H, W]` RGB tensor in `[0, 1]` to HSV.
///
/// Implementations may depend on facilities that are not present in every
/// process; they report that with `Error::BackendUnavailable`.
pub trait ColorBackend: Send + Sync {
    fn rgb_to_hsv(&self, rgb: &Tensor) -> Result<Tensor>;
}

/// In-process HSV conversion.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeHsv;

impl ColorBackend for NativeHsv {
    fn rgb_to_hsv(&self, rgb: &Tensor) -> Result<Tensor> {
        let shape = rgb.shape();
        if shape.len() != 3 || shape[0] != 3 {
            return Err(Error::Shape(format!("HSV conversion needs [3, H, W], got {:?}", shape)));
        }
        let plane = shape[1] * shape[2];
        let src = rgb.data();
        let mut out = vec![0.0; src.len()];
        for i in 0..plane {
            let (h, s, v) = rgb_to_hsv(src[i], src[plane + i], src[2 * plane + i]);
            out[i] = h;
            out[plane + i] = s;
            out[2 * plane + i] = v;
        }
        Tensor::from_vec(shape, out)
    }
}

/// Brightness, contrast and saturation spreads are factors drawn from
/// `[1 - x, 1 + x]`; hue is a shift drawn from `[-hue, hue]` turns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JitterStrength {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub hue: f32,
}

impl Default for JitterStrength {
    fn default() -> Self {
        JitterStrength { brightness: 0.15, contrast: 0.15, saturation: 0.15, hue: 0.02 }
    }
}

fn factor<R: Rng + ?Sized>(spread: f32, rng: &mut R) -> f32 {
    if spread <= 0.0 {
        1.0
    } else {
        rng.gen_range((1.0 - spread).max(0.0)..=1.0 + spread)
    }
}

fn gray_of(p: [f32; 3]) -> f32 {
    0.299 * p[0] + 0.587 * p[1] + 0.114 * p[2]
}

/// Colour jitter on an 8-bit image. Sub-transforms run in the fixed order
/// brightness, contrast, saturation, hue.
pub fn jitter<R: Rng + ?Sized>(img: &mut RgbImage, strength: &JitterStrength, rng: &mut R) {
    let brightness = factor(strength.brightness, rng);
    let contrast = factor(strength.contrast, rng);
    let saturation = factor(strength.saturation, rng);
    let hue = if strength.hue > 0.0 {
        rng.gen_range(-strength.hue..=strength.hue)
    } else {
        0.0
    };

    let mut pixels: Vec<[f32; 3]> = img
        .pixels()
        .map(|p| {
            [
                (p[0] as f32 / 255.0 * brightness).clamp(0.0, 1.0),
                (p[1] as f32 / 255.0 * brightness).clamp(0.0, 1.0),
                (p[2] as f32 / 255.0 * brightness).clamp(0.0, 1.0),
            ]
        })
        .collect();

    if !pixels.is_empty() {
        let mean = pixels.iter().map(|p| gray_of(*p)).sum::<f32>() / pixels.len() as f32;
        for p in pixels.iter_mut() {
            for c in p.iter_mut() {
                *c = ((*c - mean) * contrast + mean).clamp(0.0, 1.0);
            }
        }
    }

    for p in pixels.iter_mut() {
        let g = gray_of(*p);
        for c in p.iter_mut() {
            *c = ((*c - g) * saturation + g).clamp(0.0, 1.0);
        }
        if hue != 0.0 {
            let (h, s, v) = rgb_to_hsv(p[0], p[1], p[2]);
            let (r, g, b) = hsv_to_rgb(h + hue, s, v);
            *p = [r, g, b];
        }
    }

    for (dst, p) in img.pixels_mut().zip(pixels) {
        for c in 0..3 {
            dst[c] = (p[c] * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
}

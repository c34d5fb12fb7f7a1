//! Per-sample augmentation: raw decoded images in, normalized tensors out.
//!
//! Stages run in a fixed order and every stochastic stage draws from the
//! caller's RNG, so a seeded RNG reproduces a sample exactly. Geometric
//! stages (crop, flip, perspective) apply the same parameters to the image
//! and its paired target; photometric stages touch the image only.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::data::color::{self, ColorBackend, JitterStrength, NativeHsv};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;
use crate::registry::name_registry;

/// Channel layout fed to the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColorSpace {
    /// Red channel followed by luminance; not normalized.
    Gr,
    /// Three channels normalized by the per-channel mean/std.
    #[default]
    Rgb,
    /// Hue, saturation, value in `[0, 1]`.
    Hsv,
}

name_registry!(ColorSpace, "input space", {
    "GR" => Gr,
    "RGB" => Rgb,
    "HSV" => Hsv,
});

impl ColorSpace {
    pub fn channels(&self) -> usize {
        match self {
            ColorSpace::Gr => 2,
            ColorSpace::Rgb | ColorSpace::Hsv => 3,
        }
    }
}

/// Fixed per-channel colour correction applied to training images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OffsetMode {
    #[default]
    Disabled,
    Add,
    Subtract,
}

name_registry!(OffsetMode, "offset mode", {
    "None" => Disabled,
    "Add" => Add,
    "Subtract" => Subtract,
});

const OFFSET_DELTA: [i16; 3] = [10, 10, -10];

impl OffsetMode {
    fn apply(&self, img: &mut RgbImage) {
        let sign = match self {
            OffsetMode::Disabled => return,
            OffsetMode::Add => 1,
            OffsetMode::Subtract => -1,
        };
        for p in img.pixels_mut() {
            for c in 0..3 {
                p[c] = (p[c] as i16 + sign * OFFSET_DELTA[c]).clamp(0, 255) as u8;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    pub const IMAGENET: Normalization = Normalization {
        mean: [0.485, 0.456, 0.406],
        std: [0.229, 0.224, 0.225],
    };

    pub const DEFAULT: Normalization = Normalization {
        mean: [0.512, 0.459, 0.353],
        std: [0.254, 0.226, 0.219],
    };

    /// ImageNet statistics for the ADE project, the harness defaults otherwise.
    pub fn for_project(project_name: &str) -> Normalization {
        if project_name == "ADE" {
            Normalization::IMAGENET
        } else {
            Normalization::DEFAULT
        }
    }
}

/// Whether stochastic stages run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Validation,
}

/// Every augmentation knob. Features are off unless switched on; the
/// probabilities and strengths only matter once their flag is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// `[height, width]` every image and target is resized to first.
    pub input_size: Option<[u32; 2]>,
    /// Side of the random square crop.
    pub crop_size: Option<u32>,
    pub offset: OffsetMode,
    pub hflip: bool,
    pub hflip_prob: f64,
    pub jitter: bool,
    pub jitter_prob: f64,
    pub jitter_strength: JitterStrength,
    pub blur: bool,
    pub blur_prob: f64,
    /// Range the Gaussian sigma is drawn from.
    pub blur_sigma: [f32; 2],
    pub perspective: bool,
    pub perspective_prob: f64,
    pub distortion_scale: f32,
    pub input_space: ColorSpace,
    /// Overrides the project normalization preset when both are set.
    pub mean: Option<[f32; 3]>,
    pub std: Option<[f32; 3]>,
    /// Threshold targets at 128 into `{0, 1}`.
    pub binary_target: bool,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        AugmentConfig {
            input_size: None,
            crop_size: None,
            offset: OffsetMode::Disabled,
            hflip: false,
            hflip_prob: 0.5,
            jitter: false,
            jitter_prob: 0.8,
            jitter_strength: JitterStrength::default(),
            blur: false,
            blur_prob: 0.3,
            blur_sigma: [0.1, 2.0],
            perspective: false,
            perspective_prob: 0.3,
            distortion_scale: 0.5,
            input_space: ColorSpace::Rgb,
            mean: None,
            std: None,
            binary_target: false,
        }
    }
}

impl AugmentConfig {
    pub fn normalization(&self, project_name: &str) -> Normalization {
        match (self.mean, self.std) {
            (Some(mean), Some(std)) => Normalization { mean, std },
            _ => Normalization::for_project(project_name),
        }
    }

    /// Rejects settings that cannot produce a sample.
    pub fn validate(&self) -> Result<()> {
        if let Some([h, w]) = self.input_size {
            if h == 0 || w == 0 {
                return Err(Error::Config(format!("input_size {}x{} is empty", h, w)));
            }
            if let Some(crop) = self.crop_size {
                if crop > h || crop > w {
                    return Err(Error::Config(format!(
                        "crop_size {} exceeds input_size {}x{}",
                        crop, h, w
                    )));
                }
            }
        }
        if self.crop_size == Some(0) {
            return Err(Error::Config("crop_size must be positive".to_string()));
        }
        for (name, p) in [
            ("hflip_prob", self.hflip_prob),
            ("jitter_prob", self.jitter_prob),
            ("blur_prob", self.blur_prob),
            ("perspective_prob", self.perspective_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!("{} = {} is not a probability", name, p)));
            }
        }
        if self.blur_sigma[0] <= 0.0 || self.blur_sigma[0] > self.blur_sigma[1] {
            return Err(Error::Config(format!("blur_sigma {:?} is not a valid range", self.blur_sigma)));
        }
        if !(0.0..=1.0).contains(&self.distortion_scale) {
            return Err(Error::Config(format!(
                "distortion_scale {} must lie in [0, 1]",
                self.distortion_scale
            )));
        }
        Ok(())
    }
}

/// Applies an [`AugmentConfig`] in one [`Mode`].
#[derive(Clone)]
pub struct Augmenter {
    config: AugmentConfig,
    mode: Mode,
    normalization: Normalization,
    backend: Arc<dyn ColorBackend>,
}

impl std::fmt::Debug for Augmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Augmenter")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .field("normalization", &self.normalization)
            .finish()
    }
}

impl Augmenter {
    pub fn new(config: AugmentConfig, mode: Mode, normalization: Normalization) -> Augmenter {
        Augmenter { config, mode, normalization, backend: Arc::new(NativeHsv) }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ColorBackend>) -> Augmenter {
        self.backend = backend;
        self
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn training(&self) -> bool {
        self.mode == Mode::Train
    }

    fn draw<R: Rng + ?Sized>(&self, enabled: bool, prob: f64, rng: &mut R) -> bool {
        self.training() && enabled && rng.gen::<f64>() < prob
    }

    /// Image-to-image: returns `[C, H, W]` input and `[1, H, W]` label map.
    pub fn apply_pair<R: Rng + ?Sized>(
        &self,
        image: RgbImage,
        target: GrayImage,
        rng: &mut R,
    ) -> Result<(Tensor, Tensor)> {
        if image.dimensions() != target.dimensions() && self.config.input_size.is_none() {
            return Err(Error::Shape(format!(
                "image is {:?} but target is {:?}",
                image.dimensions(),
                target.dimensions()
            )));
        }
        let (image, target) = self.transform(image, Some(target), rng)?;
        let input = self.to_tensor(&image)?;
        let target = match target {
            Some(t) => self.target_tensor(&t)?,
            None => return Err(Error::Shape("paired target went missing".to_string())),
        };
        Ok((input, target))
    }

    /// Image-to-vector: returns the `[C, H, W]` input only.
    pub fn apply_image<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> Result<Tensor> {
        let (image, _) = self.transform(image, None, rng)?;
        self.to_tensor(&image)
    }

    fn transform<R: Rng + ?Sized>(
        &self,
        mut image: RgbImage,
        mut target: Option<GrayImage>,
        rng: &mut R,
    ) -> Result<(RgbImage, Option<GrayImage>)> {
        let cfg = &self.config;

        if let Some([h, w]) = cfg.input_size {
            image = imageops::resize(&image, w, h, FilterType::Triangle);
            target = target.map(|t| imageops::resize(&t, w, h, FilterType::Nearest));
        }

        if self.training() {
            cfg.offset.apply(&mut image);
        }

        if let (true, Some(size)) = (self.training(), cfg.crop_size) {
            let (w, h) = image.dimensions();
            if size > w || size > h {
                return Err(Error::Config(format!(
                    "crop_size {} exceeds image size {}x{}",
                    size, h, w
                )));
            }
            let top = rng.gen_range(0..=h - size);
            let left = rng.gen_range(0..=w - size);
            image = imageops::crop_imm(&image, left, top, size, size).to_image();
            target = target.map(|t| imageops::crop_imm(&t, left, top, size, size).to_image());
        }

        if self.draw(cfg.hflip, cfg.hflip_prob, rng) {
            image = imageops::flip_horizontal(&image);
            target = target.map(|t| imageops::flip_horizontal(&t));
        }

        if self.draw(cfg.jitter, cfg.jitter_prob, rng) {
            color::jitter(&mut image, &cfg.jitter_strength, rng);
        }

        if self.draw(cfg.blur, cfg.blur_prob, rng) {
            let sigma = rng.gen_range(cfg.blur_sigma[0]..=cfg.blur_sigma[1]);
            image = gaussian_blur3(&image, sigma);
        }

        // Last geometric stage: it does not preserve the crop window.
        if self.draw(cfg.perspective, cfg.perspective_prob, rng) {
            let (w, h) = image.dimensions();
            let (start, end) = perspective_params(w, h, cfg.distortion_scale, rng);
            if let Some(coeffs) = perspective_coeffs(&start, &end) {
                image = warp_bilinear(&image, &coeffs);
                target = target.map(|t| warp_nearest(&t, &coeffs));
            }
        }

        Ok((image, target))
    }

    fn to_tensor(&self, image: &RgbImage) -> Result<Tensor> {
        let (w, h) = image.dimensions();
        let plane = (w * h) as usize;
        match self.config.input_space {
            ColorSpace::Gr => {
                let mut data = vec![0.0; 2 * plane];
                for (i, p) in image.pixels().enumerate() {
                    data[i] = p[0] as f32 / 255.0;
                    data[plane + i] = color::luminance(p[0], p[1], p[2]) as f32 / 255.0;
                }
                Tensor::from_vec(&[2, h as usize, w as usize], data)
            }
            ColorSpace::Rgb => {
                let Normalization { mean, std } = self.normalization;
                let mut data = vec![0.0; 3 * plane];
                for (i, p) in image.pixels().enumerate() {
                    for c in 0..3 {
                        data[c * plane + i] = (p[c] as f32 / 255.0 - mean[c]) / std[c];
                    }
                }
                Tensor::from_vec(&[3, h as usize, w as usize], data)
            }
            ColorSpace::Hsv => {
                let rgb = chw(image)?;
                match self.backend.rgb_to_hsv(&rgb) {
                    Ok(hsv) => Ok(hsv),
                    Err(Error::BackendUnavailable(reason)) => {
                        debug!(%reason, "HSV backend unavailable; feeding RGB");
                        Ok(rgb)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    fn target_tensor(&self, target: &GrayImage) -> Result<Tensor> {
        let (w, h) = target.dimensions();
        let binary = self.config.binary_target;
        let data = target
            .pixels()
            .map(|p| {
                let v = p[0];
                if binary {
                    if v < 128 { 0.0 } else { 1.0 }
                } else {
                    v as f32
                }
            })
            .collect();
        Tensor::from_vec(&[1, h as usize, w as usize], data)
    }
}

/// `[3, H, W]` tensor scaled to `[0, 1]`.
fn chw(image: &RgbImage) -> Result<Tensor> {
    let (w, h) = image.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0; 3 * plane];
    for (i, p) in image.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = p[c] as f32 / 255.0;
        }
    }
    Tensor::from_vec(&[3, h as usize, w as usize], data)
}

fn reflect(i: i64, len: i64) -> u32 {
    if len == 1 {
        return 0;
    }
    let r = if i < 0 { -i } else if i >= len { 2 * len - 2 - i } else { i };
    r.clamp(0, len - 1) as u32
}

/// Separable 3×3 Gaussian blur with reflected borders.
fn gaussian_blur3(image: &RgbImage, sigma: f32) -> RgbImage {
    let side = (-1.0 / (2.0 * sigma * sigma)).exp();
    let norm = 1.0 + 2.0 * side;
    let kernel = [side / norm, 1.0 / norm, side / norm];
    let (w, h) = image.dimensions();

    let mut horizontal = vec![[0.0f32; 3]; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for (k, dx) in kernel.iter().zip(-1i64..=1) {
                let p = image.get_pixel(reflect(x as i64 + dx, w as i64), y);
                for c in 0..3 {
                    acc[c] += k * p[c] as f32;
                }
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    RgbImage::from_fn(w, h, |x, y| {
        let mut acc = [0.0f32; 3];
        for (k, dy) in kernel.iter().zip(-1i64..=1) {
            let row = reflect(y as i64 + dy, h as i64);
            let p = horizontal[(row * w + x) as usize];
            for c in 0..3 {
                acc[c] += k * p[c];
            }
        }
        Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
    })
}

type Corners = [[f64; 2]; 4];

/// Image corners and their randomly displaced destinations, in the order
/// top-left, top-right, bottom-right, bottom-left.
fn perspective_params<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    distortion_scale: f32,
    rng: &mut R,
) -> (Corners, Corners) {
    let (w, h) = (width as i64, height as i64);
    let dx = (distortion_scale as f64 * (w / 2) as f64) as i64;
    let dy = (distortion_scale as f64 * (h / 2) as f64) as i64;
    let mut pick = |lo: i64, hi: i64| rng.gen_range(lo..hi.max(lo + 1)) as f64;
    let top_left = [pick(0, dx + 1), pick(0, dy + 1)];
    let top_right = [pick(w - dx - 1, w), pick(0, dy + 1)];
    let bottom_right = [pick(w - dx - 1, w), pick(h - dy - 1, h)];
    let bottom_left = [pick(0, dx + 1), pick(h - dy - 1, h)];
    let start = [
        [0.0, 0.0],
        [(w - 1) as f64, 0.0],
        [(w - 1) as f64, (h - 1) as f64],
        [0.0, (h - 1) as f64],
    ];
    (start, [top_left, top_right, bottom_right, bottom_left])
}

/// Homography mapping output coordinates (`end`) back to source
/// coordinates (`start`). `None` when the corners are degenerate.
fn perspective_coeffs(start: &Corners, end: &Corners) -> Option<[f64; 8]> {
    let mut a = [[0.0f64; 9]; 8];
    for i in 0..4 {
        let [x, y] = end[i];
        let [u, v] = start[i];
        a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u, u];
        a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -x * v, -y * v, v];
    }
    for col in 0..8 {
        let pivot = (col..8).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        for row in 0..8 {
            if row != col {
                let f = a[row][col] / a[col][col];
                for k in col..9 {
                    a[row][k] -= f * a[col][k];
                }
            }
        }
    }
    let mut out = [0.0; 8];
    for i in 0..8 {
        out[i] = a[i][8] / a[i][i];
    }
    Some(out)
}

fn project(c: &[f64; 8], x: f64, y: f64) -> (f64, f64) {
    let d = c[6] * x + c[7] * y + 1.0;
    ((c[0] * x + c[1] * y + c[2]) / d, (c[3] * x + c[4] * y + c[5]) / d)
}

/// Both warps fill exactly the output pixels whose source point falls
/// outside this window, so image and target agree on the fill mask.
fn source_in_bounds(u: f64, v: f64, width: u32, height: u32) -> bool {
    (0.0..=(width - 1) as f64).contains(&u) && (0.0..=(height - 1) as f64).contains(&v)
}

fn warp_bilinear(image: &RgbImage, coeffs: &[f64; 8]) -> RgbImage {
    let (w, h) = image.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let (u, v) = project(coeffs, x as f64, y as f64);
        if !source_in_bounds(u, v, w, h) {
            return Rgb([0, 0, 0]);
        }
        let (x0, y0) = (u.floor() as u32, v.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
        let (fx, fy) = (u - x0 as f64, v - y0 as f64);
        let (p00, p10) = (image.get_pixel(x0, y0), image.get_pixel(x1, y0));
        let (p01, p11) = (image.get_pixel(x0, y1), image.get_pixel(x1, y1));
        let mut out = [0u8; 3];
        for c in 0..3 {
            let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
            let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
            out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Label maps are warped with nearest-neighbour lookups so class ids survive.
fn warp_nearest(target: &GrayImage, coeffs: &[f64; 8]) -> GrayImage {
    let (w, h) = target.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let (u, v) = project(coeffs, x as f64, y as f64);
        if source_in_bounds(u, v, w, h) {
            *target.get_pixel(u.round() as u32, v.round() as u32)
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 20) as u8, (y * 20) as u8, ((x + y) * 10) as u8]))
    }

    /// Target whose value encodes the pixel position, so geometric alignment
    /// with the image can be checked after augmentation.
    fn position_target(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([(y * w + x) as u8]))
    }

    fn everything_on() -> AugmentConfig {
        AugmentConfig {
            crop_size: Some(6),
            offset: OffsetMode::Add,
            hflip: true,
            jitter: true,
            blur: true,
            perspective: true,
            ..AugmentConfig::default()
        }
    }

    #[test]
    fn defaults_disable_every_stage() {
        let cfg = AugmentConfig::default();
        assert!(!cfg.hflip && !cfg.jitter && !cfg.blur && !cfg.perspective);
        assert_eq!(cfg.crop_size, None);
        assert_eq!(cfg.input_size, None);
        assert_eq!(cfg.offset, OffsetMode::Disabled);
    }

    #[test]
    fn validation_mode_is_deterministic() {
        let aug = Augmenter::new(everything_on(), Mode::Validation, Normalization::DEFAULT);
        let a = aug
            .apply_pair(gradient(8, 8), position_target(8, 8), &mut StdRng::seed_from_u64(1))
            .unwrap();
        let b = aug
            .apply_pair(gradient(8, 8), position_target(8, 8), &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0.shape(), &[3, 8, 8]);
    }

    #[test]
    fn crop_and_flip_keep_target_aligned_with_image() {
        let cfg = AugmentConfig {
            crop_size: Some(5),
            hflip: true,
            hflip_prob: 1.0,
            input_space: ColorSpace::Gr,
            ..AugmentConfig::default()
        };
        let aug = Augmenter::new(cfg, Mode::Train, Normalization::DEFAULT);
        let (w, h) = (8u32, 8u32);
        // Red channel carries x, green carries y.
        let image = RgbImage::from_fn(w, h, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 0]));
        for seed in 0..10 {
            let (input, target) = aug
                .apply_pair(image.clone(), position_target(w, h), &mut StdRng::seed_from_u64(seed))
                .unwrap();
            assert_eq!(input.shape(), &[2, 5, 5]);
            for i in 0..25 {
                let src_x = (input.data()[i] * 255.0).round() as u32 / 10;
                let src_pos = target.data()[i] as u32;
                assert_eq!(src_pos % w, src_x);
            }
        }
    }

    #[test]
    fn binary_targets_threshold_at_midpoint() {
        let cfg = AugmentConfig { binary_target: true, ..AugmentConfig::default() };
        let aug = Augmenter::new(cfg, Mode::Train, Normalization::DEFAULT);
        let target = GrayImage::from_raw(2, 2, vec![0, 127, 128, 255]).unwrap();
        let (_, t) = aug.apply_pair(gradient(2, 2), target, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(t.shape(), &[1, 2, 2]);
        assert_eq!(t.data(), &[0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn resize_uses_nearest_for_target() {
        let cfg = AugmentConfig { input_size: Some([4, 4]), ..AugmentConfig::default() };
        let aug = Augmenter::new(cfg, Mode::Validation, Normalization::DEFAULT);
        let target = GrayImage::from_fn(2, 2, |x, _| Luma([if x == 0 { 0 } else { 200 }]));
        let (input, t) = aug.apply_pair(gradient(2, 2), target, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(input.shape(), &[3, 4, 4]);
        assert!(t.data().iter().all(|&v| v == 0.0 || v == 200.0));
    }

    #[test]
    fn offset_is_skipped_in_validation() {
        let cfg = AugmentConfig {
            offset: OffsetMode::Add,
            input_space: ColorSpace::Gr,
            ..AugmentConfig::default()
        };
        let image = RgbImage::from_pixel(1, 1, Rgb([100, 100, 100]));
        let train = Augmenter::new(cfg.clone(), Mode::Train, Normalization::DEFAULT)
            .apply_image(image.clone(), &mut StdRng::seed_from_u64(0))
            .unwrap();
        let val = Augmenter::new(cfg, Mode::Validation, Normalization::DEFAULT)
            .apply_image(image, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!((train.data()[0] - 110.0 / 255.0).abs() < 1e-6);
        assert!((val.data()[0] - 100.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn rgb_is_normalized_per_channel() {
        let aug = Augmenter::new(AugmentConfig::default(), Mode::Validation, Normalization::IMAGENET);
        let image = RgbImage::from_pixel(1, 1, Rgb([255, 0, 128]));
        let t = aug.apply_image(image, &mut StdRng::seed_from_u64(0)).unwrap();
        assert!((t.data()[0] - (1.0 - 0.485) / 0.229).abs() < 1e-5);
        assert!((t.data()[1] - (0.0 - 0.456) / 0.224).abs() < 1e-5);
    }

    struct Unavailable;

    impl ColorBackend for Unavailable {
        fn rgb_to_hsv(&self, _: &Tensor) -> Result<Tensor> {
            Err(Error::BackendUnavailable("not in this process".to_string()))
        }
    }

    #[test]
    fn unavailable_hsv_backend_skips_conversion() {
        let cfg = AugmentConfig { input_space: ColorSpace::Hsv, ..AugmentConfig::default() };
        let aug = Augmenter::new(cfg, Mode::Train, Normalization::DEFAULT)
            .with_backend(Arc::new(Unavailable));
        let image = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        let t = aug.apply_image(image, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(t.data(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn native_hsv_converts() {
        let cfg = AugmentConfig { input_space: ColorSpace::Hsv, ..AugmentConfig::default() };
        let aug = Augmenter::new(cfg, Mode::Train, Normalization::DEFAULT);
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 0, 255]));
        let t = aug.apply_image(image, &mut StdRng::seed_from_u64(0)).unwrap();
        assert!((t.data()[0] - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(&t.data()[1..], &[1.0, 1.0]);
    }

    #[test]
    fn crop_larger_than_image_is_a_config_error() {
        let cfg = AugmentConfig { crop_size: Some(10), ..AugmentConfig::default() };
        let aug = Augmenter::new(cfg, Mode::Train, Normalization::DEFAULT);
        let err = aug.apply_image(gradient(4, 4), &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn identity_corners_give_identity_homography() {
        let corners = [[0.0, 0.0], [7.0, 0.0], [7.0, 7.0], [0.0, 7.0]];
        let c = perspective_coeffs(&corners, &corners).unwrap();
        let (u, v) = project(&c, 3.0, 5.0);
        assert!((u - 3.0).abs() < 1e-9 && (v - 5.0).abs() < 1e-9);
    }

    #[test]
    fn perspective_warp_keeps_label_values_discrete() {
        let cfg = AugmentConfig {
            perspective: true,
            perspective_prob: 1.0,
            ..AugmentConfig::default()
        };
        let aug = Augmenter::new(cfg, Mode::Train, Normalization::DEFAULT);
        let target = GrayImage::from_fn(16, 16, |x, _| Luma([if x < 8 { 3 } else { 7 }]));
        let (_, t) = aug
            .apply_pair(gradient(16, 16), target, &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert!(t.data().iter().all(|&v| v == 0.0 || v == 3.0 || v == 7.0));
    }

    #[test]
    fn photometric_stages_leave_target_untouched() {
        let cfg = AugmentConfig {
            jitter: true,
            jitter_prob: 1.0,
            blur: true,
            blur_prob: 1.0,
            ..AugmentConfig::default()
        };
        let aug = Augmenter::new(cfg, Mode::Train, Normalization::DEFAULT);
        let expected: Vec<f32> = position_target(8, 8).pixels().map(|p| p[0] as f32).collect();
        for seed in 0..5 {
            let (_, t) = aug
                .apply_pair(gradient(8, 8), position_target(8, 8), &mut StdRng::seed_from_u64(seed))
                .unwrap();
            assert_eq!(t.data(), expected.as_slice());
        }
    }

    #[test]
    fn perspective_keeps_target_aligned_with_image() {
        let cfg = AugmentConfig {
            perspective: true,
            perspective_prob: 1.0,
            ..AugmentConfig::default()
        };
        let raw = Normalization { mean: [0.0; 3], std: [1.0; 3] };
        let aug = Augmenter::new(cfg, Mode::Train, raw);
        let (w, h) = (12u32, 12u32);
        // Red carries x, green carries y, both offset so only fill is zero.
        let image = RgbImage::from_fn(w, h, |x, y| Rgb([x as u8 * 10 + 10, y as u8 * 10 + 10, 0]));
        let target = GrayImage::from_fn(w, h, |x, y| Luma([(y * w + x + 1) as u8]));
        let plane = (w * h) as usize;
        let mut fill_seen = 0;
        for seed in 0..20 {
            let (input, t) = aug
                .apply_pair(image.clone(), target.clone(), &mut StdRng::seed_from_u64(seed))
                .unwrap();
            for i in 0..plane {
                let red = (input.data()[i] * 255.0).round();
                let green = (input.data()[plane + i] * 255.0).round();
                let label = t.data()[i] as u32;
                assert_eq!(red == 0.0, label == 0, "fill mismatch at {} (seed {})", i, seed);
                if label == 0 {
                    fill_seen += 1;
                    continue;
                }
                let (tx, ty) = ((label - 1) % w, (label - 1) / w);
                let (ix, iy) = ((red - 10.0) / 10.0, (green - 10.0) / 10.0);
                assert!((ix - tx as f32).abs() <= 0.6, "x drift at {} (seed {})", i, seed);
                assert!((iy - ty as f32).abs() <= 0.6, "y drift at {} (seed {})", i, seed);
            }
        }
        assert!(fill_seen > 0);
    }

    #[test]
    fn validate_rejects_bad_probability() {
        let cfg = AugmentConfig { blur_prob: 1.5, ..AugmentConfig::default() };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
        assert!(AugmentConfig::default().validate().is_ok());
    }
}

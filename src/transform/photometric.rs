//! Operations that change pixel values only.
//!
//! None of these override the coordinate or mask hooks of [`Operation`].

use image::{DynamicImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use imageproc::noise::gaussian_noise;

use super::Operation;
use crate::error::LabelaugError;

/// `out = in * contrast + brightness * 255`, saturating.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrightnessContrast {
    brightness: f64,
    contrast: f64,
}

impl BrightnessContrast {
    pub fn new(brightness: f64, contrast: f64) -> Self {
        Self {
            brightness,
            contrast,
        }
    }
}

impl Operation for BrightnessContrast {
    fn name(&self) -> &str {
        "brightness_contrast"
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        if !self.brightness.is_finite() || !self.contrast.is_finite() || self.contrast < 0.0 {
            return Err(LabelaugError::transform(
                self.name(),
                format!(
                    "invalid parameters brightness={} contrast={}",
                    self.brightness, self.contrast
                ),
            ));
        }
        let offset = self.brightness * 255.0;
        let mut out = image.clone();
        for channel in out.iter_mut() {
            let v = *channel as f64 * self.contrast + offset;
            *channel = v.round().clamp(0.0, 255.0) as u8;
        }
        Ok(out)
    }
}

/// Additive zero-mean gaussian noise.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianNoise {
    std_dev: f64,
    seed: u64,
}

impl GaussianNoise {
    pub fn new(std_dev: f64, seed: u64) -> Self {
        Self { std_dev, seed }
    }
}

impl Operation for GaussianNoise {
    fn name(&self) -> &str {
        "gaussian_noise"
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        if !self.std_dev.is_finite() || self.std_dev < 0.0 {
            return Err(LabelaugError::transform(
                self.name(),
                format!("invalid standard deviation {}", self.std_dev),
            ));
        }
        Ok(gaussian_noise(image, 0.0, self.std_dev, self.seed))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianBlur {
    sigma: f32,
}

impl GaussianBlur {
    pub fn new(sigma: f32) -> Self {
        Self { sigma }
    }
}

impl Operation for GaussianBlur {
    fn name(&self) -> &str {
        "blur"
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        // imageproc panics on non-positive sigma.
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(LabelaugError::transform(
                self.name(),
                format!("sigma must be positive, got {}", self.sigma),
            ));
        }
        Ok(gaussian_blur_f32(image, self.sigma))
    }
}

/// Shifts hue (degrees) and adds to saturation and value (both in `[0, 1]`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HueSaturationValue {
    hue: f64,
    saturation: f64,
    value: f64,
}

impl HueSaturationValue {
    pub fn new(hue: f64, saturation: f64, value: f64) -> Self {
        Self {
            hue,
            saturation,
            value,
        }
    }
}

impl Operation for HueSaturationValue {
    fn name(&self) -> &str {
        "hue_saturation_value"
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        if !(self.hue.is_finite() && self.saturation.is_finite() && self.value.is_finite()) {
            return Err(LabelaugError::transform(
                self.name(),
                format!(
                    "invalid shifts hue={} saturation={} value={}",
                    self.hue, self.saturation, self.value
                ),
            ));
        }
        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            let [h, s, v] = rgb_to_hsv(pixel.0);
            pixel.0 = hsv_to_rgb([
                (h + self.hue).rem_euclid(360.0),
                (s + self.saturation).clamp(0.0, 1.0),
                (v + self.value).clamp(0.0, 1.0),
            ]);
        }
        Ok(out)
    }
}

/// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [f64; 3] {
    let (r, g, b) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };
    [h, s, max]
}

fn hsv_to_rgb([h, s, v]: [f64; 3]) -> [u8; 3] {
    let c = v * s;
    let sector = h / 60.0;
    let x = c * (1.0 - (sector % 2.0 - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    [r, g, b].map(|channel| ((channel + m) * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// Luma conversion, kept as three identical channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToGray;

impl Operation for ToGray {
    fn name(&self) -> &str {
        "to_gray"
    }

    fn apply_image(&self, image: &RgbImage) -> Result<RgbImage, LabelaugError> {
        Ok(DynamicImage::ImageLuma8(image::imageops::grayscale(image)).to_rgb8())
    }
}

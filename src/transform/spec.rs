//! Declarative transform sets and their random realization.
//!
//! A [`TransformSpec`] is what users write in the configuration file. Each
//! variant draws a fresh [`TransformSet`] from it with an explicitly passed
//! random number generator, so two runs with the same seed produce the same
//! operations in the same order.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    BrightnessContrast, Crop, GaussianBlur, GaussianNoise, GridDistortion, HorizontalFlip,
    HueSaturationValue, Operation, Rotate90, ToGray, TransformSet, VerticalFlip, Warp,
};
use crate::error::LabelaugError;

/// Largest per-corner perspective jitter, as a fraction of the frame side.
const MAX_PERSPECTIVE_SCALE: f64 = 0.5;

/// Largest shear angle in degrees.
const MAX_SHEAR_DEGREES: f64 = 80.0;

/// Most grid cells per axis for `grid_distortion`.
const MAX_GRID_STEPS: u32 = 64;

fn default_grid_steps() -> u32 {
    5
}

/// Closed interval `[lo, hi]` a parameter is drawn from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamRange(pub f64, pub f64);

impl ParamRange {
    pub fn fixed(value: f64) -> Self {
        Self(value, value)
    }

    /// `[-limit, limit]`.
    pub fn symmetric(limit: f64) -> Self {
        Self(-limit, limit)
    }

    fn unit() -> Self {
        Self::fixed(1.0)
    }

    fn full_crop() -> Self {
        Self(0.5, 1.0)
    }

    fn default_perspective() -> Self {
        Self(0.05, 0.1)
    }

    fn default_distort() -> Self {
        Self::symmetric(0.3)
    }

    fn default_hue() -> Self {
        Self::symmetric(20.0)
    }

    fn default_saturation() -> Self {
        Self::symmetric(0.12)
    }

    fn default_value() -> Self {
        Self::symmetric(0.08)
    }

    #[inline]
    pub fn lo(&self) -> f64 {
        self.0
    }

    #[inline]
    pub fn hi(&self) -> f64 {
        self.1
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.0 == self.1 {
            self.0
        } else {
            rng.random_range(self.0..=self.1)
        }
    }

    fn check(&self, field: &str) -> Result<(), String> {
        if !self.0.is_finite() || !self.1.is_finite() {
            return Err(format!("{} range [{}, {}] is not finite", field, self.0, self.1));
        }
        if self.0 > self.1 {
            return Err(format!("{} range [{}, {}] is inverted", field, self.0, self.1));
        }
        Ok(())
    }

    fn check_within(&self, field: &str, min: f64, max: f64) -> Result<(), String> {
        self.check(field)?;
        if self.0 < min || self.1 > max {
            return Err(format!(
                "{} range [{}, {}] must lie within [{}, {}]",
                field, self.0, self.1, min, max
            ));
        }
        Ok(())
    }
}

/// One operation with its parameter ranges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum OperationSpec {
    HorizontalFlip,
    VerticalFlip,
    /// A uniformly drawn number of clockwise quarter turns.
    Rotate90,
    Affine {
        /// Degrees.
        #[serde(default)]
        rotate: ParamRange,
        #[serde(default = "ParamRange::unit")]
        scale: ParamRange,
        /// Fraction of the frame, applied independently on both axes.
        #[serde(default)]
        translate: ParamRange,
        /// Degrees along x.
        #[serde(default)]
        shear: ParamRange,
    },
    Rotate {
        /// Maximum absolute angle in degrees.
        limit: f64,
    },
    RandomCrop {
        /// Side length of the crop as a fraction of the frame side.
        #[serde(default = "ParamRange::full_crop")]
        scale: ParamRange,
        #[serde(default)]
        resize: Option<[u32; 2]>,
    },
    Perspective {
        /// Maximum inward corner displacement as a fraction of the frame.
        #[serde(default = "ParamRange::default_perspective")]
        scale: ParamRange,
    },
    GridDistortion {
        /// Grid cells per axis.
        #[serde(default = "default_grid_steps")]
        num_steps: u32,
        /// Each cell is stretched by `1 + distort`, drawn per cell.
        #[serde(default = "ParamRange::default_distort")]
        distort: ParamRange,
    },
    BrightnessContrast {
        #[serde(default)]
        brightness: ParamRange,
        #[serde(default = "ParamRange::unit")]
        contrast: ParamRange,
    },
    GaussianNoise {
        std_dev: ParamRange,
    },
    Blur {
        sigma: ParamRange,
    },
    ToGray,
    HueSaturationValue {
        /// Degrees around the hue circle.
        #[serde(default = "ParamRange::default_hue")]
        hue: ParamRange,
        /// Added to saturation in `[0, 1]`.
        #[serde(default = "ParamRange::default_saturation")]
        saturation: ParamRange,
        /// Added to value in `[0, 1]`.
        #[serde(default = "ParamRange::default_value")]
        value: ParamRange,
    },
}

impl OperationSpec {
    pub fn name(&self) -> &'static str {
        match self {
            OperationSpec::HorizontalFlip => "horizontal_flip",
            OperationSpec::VerticalFlip => "vertical_flip",
            OperationSpec::Rotate90 => "rotate90",
            OperationSpec::Affine { .. } => "affine",
            OperationSpec::Rotate { .. } => "rotate",
            OperationSpec::RandomCrop { .. } => "random_crop",
            OperationSpec::Perspective { .. } => "perspective",
            OperationSpec::GridDistortion { .. } => "grid_distortion",
            OperationSpec::BrightnessContrast { .. } => "brightness_contrast",
            OperationSpec::GaussianNoise { .. } => "gaussian_noise",
            OperationSpec::Blur { .. } => "blur",
            OperationSpec::ToGray => "to_gray",
            OperationSpec::HueSaturationValue { .. } => "hue_saturation_value",
        }
    }

    /// Structural checks on parameter ranges.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            OperationSpec::HorizontalFlip
            | OperationSpec::VerticalFlip
            | OperationSpec::Rotate90
            | OperationSpec::ToGray => Ok(()),
            OperationSpec::Affine {
                rotate,
                scale,
                translate,
                shear,
            } => {
                rotate.check("affine.rotate")?;
                scale.check("affine.scale")?;
                if scale.lo() <= 0.0 {
                    return Err(format!("affine.scale must be positive, got {}", scale.lo()));
                }
                translate.check_within("affine.translate", -1.0, 1.0)?;
                shear.check_within("affine.shear", -MAX_SHEAR_DEGREES, MAX_SHEAR_DEGREES)
            }
            OperationSpec::Rotate { limit } => {
                if limit.is_finite() && *limit >= 0.0 {
                    Ok(())
                } else {
                    Err(format!("rotate.limit must be a non-negative number, got {}", limit))
                }
            }
            OperationSpec::RandomCrop { scale, resize } => {
                scale.check("random_crop.scale")?;
                if scale.lo() <= 0.0 || scale.hi() > 1.0 {
                    return Err(format!(
                        "random_crop.scale range [{}, {}] must lie within (0, 1]",
                        scale.lo(),
                        scale.hi()
                    ));
                }
                match resize {
                    Some([w, h]) if *w == 0 || *h == 0 => {
                        Err(format!("random_crop.resize must be non-zero, got {}x{}", w, h))
                    }
                    _ => Ok(()),
                }
            }
            OperationSpec::Perspective { scale } => {
                scale.check("perspective.scale")?;
                if scale.lo() < 0.0 || scale.hi() >= MAX_PERSPECTIVE_SCALE {
                    return Err(format!(
                        "perspective.scale range [{}, {}] must lie within [0, {})",
                        scale.lo(),
                        scale.hi(),
                        MAX_PERSPECTIVE_SCALE
                    ));
                }
                Ok(())
            }
            OperationSpec::GridDistortion { num_steps, distort } => {
                if *num_steps == 0 || *num_steps > MAX_GRID_STEPS {
                    return Err(format!(
                        "grid_distortion.num_steps must lie within [1, {}], got {}",
                        MAX_GRID_STEPS, num_steps
                    ));
                }
                distort.check("grid_distortion.distort")?;
                if distort.lo() <= -1.0 || distort.hi() >= 1.0 {
                    return Err(format!(
                        "grid_distortion.distort range [{}, {}] must lie within (-1, 1)",
                        distort.lo(),
                        distort.hi()
                    ));
                }
                Ok(())
            }
            OperationSpec::BrightnessContrast {
                brightness,
                contrast,
            } => {
                brightness.check_within("brightness_contrast.brightness", -1.0, 1.0)?;
                contrast.check("brightness_contrast.contrast")?;
                if contrast.lo() < 0.0 {
                    return Err(format!(
                        "brightness_contrast.contrast must be non-negative, got {}",
                        contrast.lo()
                    ));
                }
                Ok(())
            }
            OperationSpec::GaussianNoise { std_dev } => {
                std_dev.check("gaussian_noise.std_dev")?;
                if std_dev.lo() < 0.0 {
                    return Err(format!(
                        "gaussian_noise.std_dev must be non-negative, got {}",
                        std_dev.lo()
                    ));
                }
                Ok(())
            }
            OperationSpec::Blur { sigma } => {
                sigma.check("blur.sigma")?;
                if sigma.lo() <= 0.0 {
                    return Err(format!("blur.sigma must be positive, got {}", sigma.lo()));
                }
                Ok(())
            }
            OperationSpec::HueSaturationValue {
                hue,
                saturation,
                value,
            } => {
                hue.check_within("hue_saturation_value.hue", -180.0, 180.0)?;
                saturation.check_within("hue_saturation_value.saturation", -1.0, 1.0)?;
                value.check_within("hue_saturation_value.value", -1.0, 1.0)
            }
        }
    }

    /// Draw concrete parameters for a `width` x `height` input.
    pub fn realize<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn Operation>, LabelaugError> {
        Ok(match self {
            OperationSpec::HorizontalFlip => Box::new(HorizontalFlip),
            OperationSpec::VerticalFlip => Box::new(VerticalFlip),
            OperationSpec::Rotate90 => Box::new(Rotate90::new(rng.random_range(0..4u8))),
            OperationSpec::Affine {
                rotate,
                scale,
                translate,
                shear,
            } => {
                let degrees = rotate.sample(rng);
                let s = scale.sample(rng);
                let tx = translate.sample(rng);
                let ty = translate.sample(rng);
                let k = shear.sample(rng);
                Box::new(Warp::affine(width, height, degrees, s, (tx, ty), k)?)
            }
            OperationSpec::Rotate { limit } => {
                let degrees = ParamRange::symmetric(*limit).sample(rng);
                Box::new(Warp::affine(width, height, degrees, 1.0, (0.0, 0.0), 0.0)?)
            }
            OperationSpec::RandomCrop { scale, resize } => {
                let s = scale.sample(rng);
                let crop_w = ((width as f64 * s).round() as u32).clamp(1, width.max(1));
                let crop_h = ((height as f64 * s).round() as u32).clamp(1, height.max(1));
                let x = rng.random_range(0..=width.saturating_sub(crop_w));
                let y = rng.random_range(0..=height.saturating_sub(crop_h));
                Box::new(Crop::new(
                    x,
                    y,
                    crop_w,
                    crop_h,
                    resize.map(|[w, h]| (w, h)),
                ))
            }
            OperationSpec::Perspective { scale } => {
                let s = scale.sample(rng);
                let (w, h) = (width as f64, height as f64);
                let mut jitter = |side: f64| rng.random_range(0.0..=s) * side;
                let corners = [
                    (jitter(w), jitter(h)),
                    (w - jitter(w), jitter(h)),
                    (w - jitter(w), h - jitter(h)),
                    (jitter(w), h - jitter(h)),
                ];
                Box::new(Warp::perspective(width, height, corners)?)
            }
            OperationSpec::GridDistortion { num_steps, distort } => {
                let columns = grid_stretch(rng, *num_steps, distort);
                let rows = grid_stretch(rng, *num_steps, distort);
                Box::new(GridDistortion::new(width, height, &columns, &rows)?)
            }
            OperationSpec::BrightnessContrast {
                brightness,
                contrast,
            } => Box::new(BrightnessContrast::new(
                brightness.sample(rng),
                contrast.sample(rng),
            )),
            OperationSpec::GaussianNoise { std_dev } => {
                Box::new(GaussianNoise::new(std_dev.sample(rng), rng.random::<u64>()))
            }
            OperationSpec::Blur { sigma } => Box::new(GaussianBlur::new(sigma.sample(rng) as f32)),
            OperationSpec::ToGray => Box::new(ToGray),
            OperationSpec::HueSaturationValue {
                hue,
                saturation,
                value,
            } => Box::new(HueSaturationValue::new(
                hue.sample(rng),
                saturation.sample(rng),
                value.sample(rng),
            )),
        })
    }
}

fn grid_stretch<R: Rng + ?Sized>(rng: &mut R, steps: u32, distort: &ParamRange) -> Vec<f64> {
    (0..steps).map(|_| 1.0 + distort.sample(rng)).collect()
}

fn default_probability() -> f64 {
    1.0
}

/// An operation applied with probability `p`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(flatten)]
    pub op: OperationSpec,
    #[serde(default = "default_probability")]
    pub p: f64,
}

impl StepSpec {
    pub fn new(op: OperationSpec, p: f64) -> Self {
        Self { op, p }
    }

    pub fn always(op: OperationSpec) -> Self {
        Self::new(op, 1.0)
    }
}

/// A named, ordered list of operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub name: String,
    #[serde(default)]
    pub ops: Vec<StepSpec>,
}

impl TransformSpec {
    pub fn new(name: impl Into<String>, ops: Vec<StepSpec>) -> Self {
        Self {
            name: name.into(),
            ops,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("transform set name must not be empty".to_string());
        }
        for (index, step) in self.ops.iter().enumerate() {
            if !(0.0..=1.0).contains(&step.p) {
                return Err(format!(
                    "transform set '{}' op #{} ({}): probability {} outside [0, 1]",
                    self.name,
                    index + 1,
                    step.op.name(),
                    step.p
                ));
            }
            step.op.validate().map_err(|message| {
                format!("transform set '{}' op #{}: {}", self.name, index + 1, message)
            })?;
        }
        Ok(())
    }

    /// Decide which steps run and draw their parameters.
    ///
    /// Every step consumes one probability draw whether or not it runs, so
    /// the sequence of draws only depends on `self` and the image size.
    pub fn realize<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        width: u32,
        height: u32,
    ) -> Result<TransformSet, LabelaugError> {
        let (mut w, mut h) = (width, height);
        let mut operations = Vec::with_capacity(self.ops.len());
        for step in &self.ops {
            let roll: f64 = rng.random();
            if roll >= step.p {
                continue;
            }
            let op = step.op.realize(rng, w, h)?;
            (w, h) = op.output_size(w, h);
            operations.push(op);
        }
        Ok(TransformSet::new(self.name.clone(), operations))
    }
}

/// Built-in transform sets, used when no configuration file names any.
pub fn default_transform_sets() -> Vec<TransformSpec> {
    let light = OperationSpec::BrightnessContrast {
        brightness: ParamRange::symmetric(0.2),
        contrast: ParamRange(0.8, 1.2),
    };
    vec![
        TransformSpec::new(
            "flip_light",
            vec![
                StepSpec::always(OperationSpec::HorizontalFlip),
                StepSpec::new(light.clone(), 0.8),
            ],
        ),
        TransformSpec::new(
            "affine_noise",
            vec![
                StepSpec::always(OperationSpec::Affine {
                    rotate: ParamRange::symmetric(15.0),
                    scale: ParamRange(0.9, 1.1),
                    translate: ParamRange::symmetric(0.06),
                    shear: ParamRange::default(),
                }),
                StepSpec::new(
                    OperationSpec::GaussianNoise {
                        std_dev: ParamRange(5.0, 20.0),
                    },
                    0.5,
                ),
            ],
        ),
        TransformSpec::new(
            "crop_light",
            vec![
                StepSpec::always(OperationSpec::RandomCrop {
                    scale: ParamRange(0.7, 1.0),
                    resize: None,
                }),
                StepSpec::new(light.clone(), 0.7),
            ],
        ),
        TransformSpec::new(
            "rotate_blur",
            vec![
                StepSpec::always(OperationSpec::Rotate { limit: 25.0 }),
                StepSpec::new(
                    OperationSpec::Blur {
                        sigma: ParamRange(0.5, 1.5),
                    },
                    0.4,
                ),
                StepSpec::new(light, 0.7),
            ],
        ),
        TransformSpec::new(
            "shear_light",
            vec![
                StepSpec::new(
                    OperationSpec::BrightnessContrast {
                        brightness: ParamRange::symmetric(0.2),
                        contrast: ParamRange::unit(),
                    },
                    0.8,
                ),
                StepSpec::always(OperationSpec::Affine {
                    rotate: ParamRange::default(),
                    scale: ParamRange(0.9, 1.1),
                    translate: ParamRange::symmetric(0.03),
                    shear: ParamRange::symmetric(10.0),
                }),
            ],
        ),
        TransformSpec::new(
            "grid_color",
            vec![
                StepSpec::always(OperationSpec::GridDistortion {
                    num_steps: default_grid_steps(),
                    distort: ParamRange::default_distort(),
                }),
                StepSpec::new(
                    OperationSpec::HueSaturationValue {
                        hue: ParamRange::default_hue(),
                        saturation: ParamRange::default_saturation(),
                        value: ParamRange::default_value(),
                    },
                    0.7,
                ),
            ],
        ),
    ]
}

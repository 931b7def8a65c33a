//! Augmentation configuration.
//!
//! Values come from an optional YAML file and are then overridden by CLI
//! flags. Structural problems are rejected up front by
//! [`AugmentConfig::validate`]; nothing past validation aborts a run.
//!
//! ```yaml
//! variants: 3
//! min_visibility: 0.3
//! seed: 42
//! naming: name
//! transform_sets:
//!   - name: flip
//!     ops:
//!       - op: horizontal_flip
//!       - op: brightness_contrast
//!         brightness: [-0.2, 0.2]
//!         p: 0.5
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LabelaugError;
use crate::reconcile::ReconcileOptions;
use crate::transform::{default_transform_sets, PolygonPath, TransformSpec};

/// How augmented files are suffixed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Naming {
    /// `_aug1`, `_aug2`, ... by variant index.
    #[default]
    Index,
    /// `_aug_<set name>`.
    Name,
}

fn default_variants() -> usize {
    1
}

fn default_min_visibility() -> f64 {
    0.3
}

fn default_keypoint_slots() -> usize {
    17
}

/// Everything that shapes one augmentation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AugmentConfig {
    /// Augmented copies written per source image.
    #[serde(default = "default_variants")]
    pub variants: usize,
    /// Minimum visible area fraction for a box to survive.
    #[serde(default = "default_min_visibility")]
    pub min_visibility: f64,
    /// Base seed; a fresh one is drawn per run when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub naming: Naming,
    /// Suffix for the pass-through copy of each source, e.g. `_orig`.
    #[serde(default)]
    pub original_suffix: Option<String>,
    #[serde(default)]
    pub polygon_path: PolygonPath,
    /// Slots per keypoint instance.
    #[serde(default = "default_keypoint_slots")]
    pub keypoint_slots: usize,
    /// Worker threads; rayon's default when absent.
    #[serde(default)]
    pub jobs: Option<usize>,
    #[serde(default = "default_transform_sets")]
    pub transform_sets: Vec<TransformSpec>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            variants: default_variants(),
            min_visibility: default_min_visibility(),
            seed: None,
            naming: Naming::default(),
            original_suffix: None,
            polygon_path: PolygonPath::default(),
            keypoint_slots: default_keypoint_slots(),
            jobs: None,
            transform_sets: default_transform_sets(),
        }
    }
}

impl AugmentConfig {
    /// Parse a YAML configuration file. The result is not yet validated.
    pub fn from_yaml_file(path: &Path) -> Result<Self, LabelaugError> {
        let text = fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|source| LabelaugError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject structurally invalid configuration.
    pub fn validate(&self) -> Result<(), LabelaugError> {
        let invalid = |msg: String| Err(LabelaugError::InvalidConfig(msg));

        if self.variants == 0 {
            return invalid("variants must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_visibility) {
            return invalid(format!(
                "min_visibility must lie within [0, 1], got {}",
                self.min_visibility
            ));
        }
        if self.keypoint_slots == 0 {
            return invalid("keypoint_slots must be at least 1".to_string());
        }
        if self.jobs == Some(0) {
            return invalid("jobs must be at least 1".to_string());
        }
        if let Some(suffix) = &self.original_suffix {
            if suffix.contains(['/', '\\']) {
                return invalid(format!("original_suffix '{}' must not contain a path separator", suffix));
            }
        }
        if self.transform_sets.is_empty() {
            return invalid("at least one transform set is required".to_string());
        }
        for spec in &self.transform_sets {
            spec.validate().map_err(LabelaugError::InvalidConfig)?;
        }

        if self.naming == Naming::Name {
            let mut seen = HashSet::new();
            for spec in &self.transform_sets {
                if spec.name.contains(['/', '\\']) {
                    return invalid(format!(
                        "transform set name '{}' must not contain a path separator",
                        spec.name
                    ));
                }
                if !seen.insert(spec.name.as_str()) {
                    return invalid(format!(
                        "duplicate transform set name '{}' with name-based naming",
                        spec.name
                    ));
                }
            }
            if self.variants > self.transform_sets.len() {
                return invalid(format!(
                    "{} variants but only {} transform set(s): name-based naming would reuse file names",
                    self.variants,
                    self.transform_sets.len()
                ));
            }
        }

        Ok(())
    }

    /// The transform set used by variant `index` (round robin).
    pub fn transform_set_for(&self, index: usize) -> &TransformSpec {
        &self.transform_sets[index % self.transform_sets.len()]
    }

    /// File name suffix of variant `index`.
    pub fn variant_suffix(&self, index: usize) -> String {
        match self.naming {
            Naming::Index => format!("_aug{}", index + 1),
            Naming::Name => format!("_aug_{}", self.transform_set_for(index).name),
        }
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            min_visibility: self.min_visibility,
            keypoint_slots: self.keypoint_slots,
        }
    }
}

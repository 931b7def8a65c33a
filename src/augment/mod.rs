//! Batch augmentation driver.
//!
//! Walks an image root, pairs every image with its YOLO label file, writes
//! the pass-through copy and then `variants` augmented copies of each
//! sample. Sources are processed in parallel; every (source, variant) pair
//! owns its random generator, derived from the base seed, the source's
//! position in sorted order and the variant index, so output does not
//! depend on scheduling.
//!
//! Failures never stop the batch: an unreadable sample skips that sample,
//! a failing transform skips that variant. Both end up in the
//! [`BatchReport`].

mod report;

pub use report::{BatchReport, SkippedItem};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::AugmentConfig;
use crate::error::LabelaugError;
use crate::ir::io_yolo::{self, LABEL_EXTENSION};
use crate::ir::{mask, Instance, Keypoint, LabelKind, Mask, PolygonAnnotation, Sample};
use crate::reconcile::{self, LossSummary};

/// Image extensions picked up from the input root (case-insensitive).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

const MASK_EXTENSION: &str = "png";

/// Input and output roots of a run.
#[derive(Clone, Debug)]
pub struct AugmentPaths {
    pub images: PathBuf,
    pub labels: PathBuf,
    pub out_images: PathBuf,
    pub out_labels: PathBuf,
    /// Mask output root for polygon datasets; defaults to a `masks`
    /// directory next to `out_labels`.
    pub out_masks: Option<PathBuf>,
}

impl AugmentPaths {
    fn masks_root(&self) -> PathBuf {
        match &self.out_masks {
            Some(root) => root.clone(),
            None => self
                .out_labels
                .parent()
                .map(|parent| parent.join("masks"))
                .unwrap_or_else(|| PathBuf::from("masks")),
        }
    }
}

/// Everything an augmentation run needs.
#[derive(Clone, Debug)]
pub struct AugmentOptions {
    pub paths: AugmentPaths,
    pub kind: LabelKind,
    pub config: AugmentConfig,
}

/// Augment every image under `options.paths.images`.
///
/// Returns `Err` only for problems that affect the whole run: invalid
/// configuration, an unreadable input root, or a worker pool that cannot
/// start.
pub fn augment_dataset(options: &AugmentOptions) -> Result<BatchReport, LabelaugError> {
    let config = &options.config;
    config.validate()?;

    let sources = discover_images(&options.paths.images)?;
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    info!(
        "augmenting {} source image(s), {} variant(s) each, seed {}",
        sources.len(),
        config.variants,
        seed
    );

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = config.jobs {
        builder = builder.num_threads(jobs);
    }
    let pool = builder.build()?;

    let job = Job {
        options,
        masks_root: options.paths.masks_root(),
        seed,
    };
    let collisions = stem_collisions(&sources);
    let outcomes: Vec<SourceOutcome> = pool.install(|| {
        sources
            .par_iter()
            .enumerate()
            .map(|(index, relative)| match collisions[index] {
                Some(first) => SourceOutcome::colliding(relative, first),
                None => job.process_source(index, relative),
            })
            .collect()
    });

    let mut report = BatchReport::new(options.kind, seed, config.variants);
    report.sources_seen = sources.len();
    for outcome in outcomes {
        report.label_lines_skipped += outcome.label_lines_skipped;
        report.loss.merge(&outcome.loss);
        report.variants_written += outcome.variants_written;
        match outcome.sample_error {
            Some(reason) => report.skip_sample(outcome.source.clone(), reason),
            None => report.sources_processed += 1,
        }
        for (variant, reason) in outcome.variant_errors {
            report.skip_variant(outcome.source.clone(), variant, reason);
        }
    }

    info!(
        "wrote {} variant(s) for {} source(s); {} skipped",
        report.variants_written,
        report.sources_processed,
        report.skip_count()
    );
    Ok(report)
}

/// Image files under `root`, relative to it, in sorted order.
pub fn discover_images(root: &Path) -> Result<Vec<PathBuf>, LabelaugError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|source| LabelaugError::InputLayout {
            path: root.to_path_buf(),
            message: format!("failed while traversing directory: {source}"),
        })?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), IMAGE_EXTENSIONS) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// For each source, the earlier source (in sorted order) whose outputs
/// would share its file names: same directory and stem, another extension.
fn stem_collisions(sources: &[PathBuf]) -> Vec<Option<&Path>> {
    let mut first_by_stem: HashMap<PathBuf, &Path> = HashMap::new();
    sources
        .iter()
        .map(|relative| {
            let first = *first_by_stem
                .entry(relative.with_extension(""))
                .or_insert(relative.as_path());
            (first != relative.as_path()).then_some(first)
        })
        .collect()
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

/// Per-(source, variant) seed. Mixing keeps neighbouring indices apart.
pub fn variant_seed(base: u64, source_index: usize, variant: usize) -> u64 {
    let position = ((source_index as u64) << 32) ^ variant as u64;
    splitmix64(base ^ splitmix64(position))
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Default)]
struct SourceOutcome {
    source: String,
    sample_error: Option<String>,
    variants_written: usize,
    variant_errors: Vec<(String, String)>,
    label_lines_skipped: usize,
    loss: LossSummary,
}

impl SourceOutcome {
    fn colliding(relative: &Path, first: &Path) -> Self {
        let source = relative.display().to_string();
        let reason = format!("output names collide with {}", first.display());
        warn!("skipping {}: {}", source, reason);
        Self {
            source,
            sample_error: Some(reason),
            ..Default::default()
        }
    }
}

/// Output file names of one emitted sample.
struct OutputPaths {
    image: PathBuf,
    label: PathBuf,
    mask: PathBuf,
}

/// Finished, encoded output of one variant, built before anything is
/// written.
struct VariantOutput {
    image: RgbImage,
    label_text: String,
    mask: Option<Mask>,
    loss: LossSummary,
}

struct Job<'a> {
    options: &'a AugmentOptions,
    masks_root: PathBuf,
    seed: u64,
}

impl Job<'_> {
    fn process_source(&self, index: usize, relative: &Path) -> SourceOutcome {
        let mut outcome = SourceOutcome {
            source: relative.display().to_string(),
            ..Default::default()
        };

        let sample = match self.load_sample(relative, &mut outcome) {
            Ok(sample) => sample,
            Err(err) => {
                warn!("skipping {}: {}", outcome.source, err);
                outcome.sample_error = Some(err.to_string());
                return outcome;
            }
        };

        if let Err(err) = self.write_original(relative, &sample) {
            warn!("skipping {}: {}", outcome.source, err);
            outcome.sample_error = Some(err.to_string());
            return outcome;
        }

        let config = &self.options.config;
        for variant in 0..config.variants {
            let suffix = config.variant_suffix(variant);
            let result = self
                .render_variant(index, variant, &sample)
                .and_then(|output| self.write_variant(relative, &suffix, output));
            match result {
                Ok(loss) => {
                    outcome.loss.merge(&loss);
                    outcome.variants_written += 1;
                }
                Err(err) => {
                    warn!("skipping {} variant {}: {}", outcome.source, suffix, err);
                    outcome.variant_errors.push((suffix, err.to_string()));
                }
            }
        }
        outcome
    }

    fn load_sample(
        &self,
        relative: &Path,
        outcome: &mut SourceOutcome,
    ) -> Result<Sample, LabelaugError> {
        let paths = &self.options.paths;
        let image_path = paths.images.join(relative);
        let image = image::open(&image_path)
            .map_err(|source| LabelaugError::ImageRead {
                path: image_path.clone(),
                source,
            })?
            .to_rgb8();

        let label_path = paths.labels.join(relative).with_extension(LABEL_EXTENSION);
        let decoded = io_yolo::read_label_file(&label_path, self.options.kind)?;
        for skipped in &decoded.skipped {
            debug!(
                "{}:{}: skipped label line: {}",
                label_path.display(),
                skipped.line,
                skipped.message
            );
        }
        outcome.label_lines_skipped += decoded.skipped.len();

        let mut instances = decoded.instances;
        let slots = self.options.config.keypoint_slots;
        for instance in &mut instances {
            if let Instance::Keypoints(k) = instance {
                if k.keypoints.len() > slots {
                    return Err(LabelaugError::KeypointLabel {
                        message: format!(
                            "{} has {} keypoints but only {} slots are configured",
                            label_path.display(),
                            k.keypoints.len(),
                            slots
                        ),
                    });
                }
                k.keypoints.resize(slots, Keypoint::placeholder());
            }
        }

        Ok(Sample::new(image, instances))
    }

    fn output_paths(&self, relative: &Path, suffix: &str) -> OutputPaths {
        let paths = &self.options.paths;
        let stem = relative
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = relative
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = relative.parent().unwrap_or_else(|| Path::new(""));
        let base = format!("{}{}", stem, suffix);
        OutputPaths {
            image: paths.out_images.join(dir).join(format!("{}.{}", base, extension)),
            label: paths
                .out_labels
                .join(dir)
                .join(format!("{}.{}", base, LABEL_EXTENSION)),
            mask: self
                .masks_root
                .join(dir)
                .join(format!("{}.{}", base, MASK_EXTENSION)),
        }
    }

    /// Re-emit the source unchanged (image bytes and label text).
    fn write_original(&self, relative: &Path, sample: &Sample) -> Result<(), LabelaugError> {
        let paths = &self.options.paths;
        let suffix = self.options.config.original_suffix.as_deref().unwrap_or("");
        let out = self.output_paths(relative, suffix);

        // Everything fallible in memory first.
        let mask = match self.options.kind {
            LabelKind::Polygon => Some(mask::rasterize(
                &polygons_of(&sample.instances),
                sample.width(),
                sample.height(),
            )?),
            _ => None,
        };

        copy_file(&paths.images.join(relative), &out.image)?;
        let label_in = paths.labels.join(relative).with_extension(LABEL_EXTENSION);
        if label_in.is_file() {
            copy_file(&label_in, &out.label)?;
        } else {
            io_yolo::write_label_file(&out.label, &[])?;
        }
        if let Some(mask) = mask {
            save_mask(&mask, &out.mask)?;
        }
        Ok(())
    }

    fn render_variant(
        &self,
        source_index: usize,
        variant: usize,
        sample: &Sample,
    ) -> Result<VariantOutput, LabelaugError> {
        let config = &self.options.config;
        let mut rng = StdRng::seed_from_u64(variant_seed(self.seed, source_index, variant));
        let spec = config.transform_set_for(variant);
        let set = spec.realize(&mut rng, sample.width(), sample.height())?;
        let transformed = set.apply(sample, config.polygon_path)?;
        debug!(
            "variant {} of set '{}' applied [{}]",
            variant + 1,
            set.name(),
            transformed.applied.join(", ")
        );

        let (width, height) = (transformed.width(), transformed.height());
        let reconciled = reconcile::reconcile(sample, &transformed, &config.reconcile_options())?;
        if reconciled.summary.has_loss() {
            debug!("variant {} annotation loss: {}", variant + 1, reconciled.summary);
        }

        let mask = match self.options.kind {
            LabelKind::Polygon => Some(match reconciled.mask {
                Some(mask) => mask,
                None => mask::rasterize(&polygons_of(&reconciled.instances), width, height)?,
            }),
            _ => None,
        };

        Ok(VariantOutput {
            image: transformed.image,
            label_text: io_yolo::encode(&reconciled.instances),
            mask,
            loss: reconciled.summary,
        })
    }

    /// Write a finished variant and hand back its annotation loss.
    fn write_variant(
        &self,
        relative: &Path,
        suffix: &str,
        output: VariantOutput,
    ) -> Result<LossSummary, LabelaugError> {
        let out = self.output_paths(relative, suffix);
        ensure_parent(&out.image)?;
        output
            .image
            .save(&out.image)
            .map_err(|source| LabelaugError::ImageWrite {
                path: out.image.clone(),
                source,
            })?;
        ensure_parent(&out.label)?;
        fs::write(&out.label, output.label_text)?;
        if let Some(mask) = output.mask {
            save_mask(&mask, &out.mask)?;
        }
        Ok(output.loss)
    }
}

fn polygons_of(instances: &[Instance]) -> Vec<PolygonAnnotation> {
    instances
        .iter()
        .filter_map(|i| match i {
            Instance::Polygon(p) => Some(p.clone()),
            _ => None,
        })
        .collect()
}

fn ensure_parent(path: &Path) -> Result<(), LabelaugError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Copy `from` to `to`, leaving the file alone when both name the same file.
fn copy_file(from: &Path, to: &Path) -> Result<(), LabelaugError> {
    ensure_parent(to)?;
    if to.exists() && fs::canonicalize(from)? == fs::canonicalize(to)? {
        return Ok(());
    }
    fs::copy(from, to)?;
    Ok(())
}

fn save_mask(mask: &Mask, path: &Path) -> Result<(), LabelaugError> {
    ensure_parent(path)?;
    mask.as_image()
        .save(path)
        .map_err(|source| LabelaugError::ImageWrite {
            path: path.to_path_buf(),
            source,
        })
}

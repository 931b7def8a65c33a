//! Labelaug: annotation-preserving image augmentation.
//!
//! Labelaug multiplies a YOLO-style dataset (boxes, polygons or keypoint
//! skeletons) by applying randomized geometric and photometric transform
//! sets to each image, carrying every annotation through the same
//! transform and repairing what the transform broke: boxes that left the
//! frame are dropped, hidden keypoints keep their slot, polygons are traced
//! back from a class mask.
//!
//! # Modules
//!
//! - [`ir`]: Sample and annotation types, the YOLO label codec and the mask bridge
//! - [`transform`]: Operations, transform sets and the atomic pipeline
//! - [`reconcile`]: Post-transform annotation repair and loss accounting
//! - [`augment`]: The parallel batch driver
//! - [`check`]: Label directory checking
//! - [`config`]: YAML configuration and validation
//! - [`error`]: Error types for labelaug operations

pub mod augment;
pub mod check;
pub mod config;
pub mod error;
pub mod ir;
pub mod reconcile;
pub mod transform;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

pub use error::LabelaugError;

use config::{AugmentConfig, Naming};
use ir::LabelKind;
use transform::PolygonPath;

/// The labelaug CLI application.
#[derive(Parser)]
#[command(name = "labelaug")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` wins.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Write augmented copies of every image and its labels.
    Augment(AugmentArgs),
    /// Decode every label file under a directory and report problems.
    Check(CheckArgs),
}

/// Report rendering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Arguments for the augment subcommand.
#[derive(clap::Args)]
struct AugmentArgs {
    /// Input image directory (searched recursively).
    #[arg(long)]
    images: PathBuf,

    /// Input label directory, mirroring the image directory layout.
    #[arg(long)]
    labels: PathBuf,

    /// Output image directory.
    #[arg(long)]
    out_images: PathBuf,

    /// Output label directory.
    #[arg(long)]
    out_labels: PathBuf,

    /// Output mask directory for polygon datasets [default: <out-labels>/../masks].
    #[arg(long)]
    out_masks: Option<PathBuf>,

    /// Label layout.
    #[arg(long, value_enum, default_value_t = LabelKind::Box)]
    kind: LabelKind,

    /// YAML configuration file.
    #[arg(long, env = "LABELAUG_CONFIG")]
    config: Option<PathBuf>,

    /// Augmented variants per source image.
    #[arg(long)]
    variants: Option<usize>,

    /// Minimum visible area fraction for a box to be kept.
    #[arg(long)]
    min_visibility: Option<f64>,

    /// Base random seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Variant file name suffix scheme.
    #[arg(long, value_enum)]
    naming: Option<Naming>,

    /// Suffix for the pass-through copy of each source (e.g. `_orig`).
    #[arg(long)]
    original_suffix: Option<String>,

    /// How polygons travel through geometric operations.
    #[arg(long, value_enum)]
    polygon_path: Option<PolygonPath>,

    /// Slots per keypoint instance.
    #[arg(long)]
    keypoint_slots: Option<usize>,

    /// Worker threads.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Exit non-zero if any sample or variant was skipped.
    #[arg(long)]
    strict: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,
}

impl AugmentArgs {
    /// File configuration with flag overrides applied.
    fn resolve_config(&self) -> Result<AugmentConfig, LabelaugError> {
        let mut config = match &self.config {
            Some(path) => AugmentConfig::from_yaml_file(path)?,
            None => AugmentConfig::default(),
        };
        if let Some(variants) = self.variants {
            config.variants = variants;
        }
        if let Some(min_visibility) = self.min_visibility {
            config.min_visibility = min_visibility;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(naming) = self.naming {
            config.naming = naming;
        }
        if self.original_suffix.is_some() {
            config.original_suffix = self.original_suffix.clone();
        }
        if let Some(path) = self.polygon_path {
            config.polygon_path = path;
        }
        if let Some(slots) = self.keypoint_slots {
            config.keypoint_slots = slots;
        }
        if self.jobs.is_some() {
            config.jobs = self.jobs;
        }
        Ok(config)
    }
}

/// Arguments for the check subcommand.
#[derive(clap::Args)]
struct CheckArgs {
    /// Label directory (searched recursively).
    labels: PathBuf,

    /// Label layout.
    #[arg(long, value_enum, default_value_t = LabelKind::Box)]
    kind: LabelKind,

    /// Maximum keypoints per instance.
    #[arg(long)]
    keypoint_slots: Option<usize>,

    /// Treat skipped lines as errors.
    #[arg(long)]
    strict: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    output: ReportFormat,
}

/// Run the labelaug CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), LabelaugError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Augment(args)) => run_augment(args),
        Some(Commands::Check(args)) => run_check(args),
        None => {
            println!("labelaug {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Annotation-preserving image augmentation.");
            println!();
            println!("Run 'labelaug --help' for usage information.");
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // A second initialization (e.g. from a test harness) is harmless.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .try_init();
}

fn print_report<T: Serialize + std::fmt::Display>(
    report: &T,
    format: ReportFormat,
) -> Result<(), LabelaugError> {
    match format {
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(report).map_err(LabelaugError::ReportWrite)?;
            println!("{}", json);
        }
        ReportFormat::Text => print!("{}", report),
    }
    Ok(())
}

/// Execute the augment subcommand.
fn run_augment(args: AugmentArgs) -> Result<(), LabelaugError> {
    let config = args.resolve_config()?;
    let options = augment::AugmentOptions {
        paths: augment::AugmentPaths {
            images: args.images,
            labels: args.labels,
            out_images: args.out_images,
            out_labels: args.out_labels,
            out_masks: args.out_masks,
        },
        kind: args.kind,
        config,
    };

    let report = augment::augment_dataset(&options)?;
    print_report(&report, args.output)?;

    if args.strict && !report.is_complete() {
        return Err(LabelaugError::AugmentIncomplete {
            skipped: report.skip_count(),
        });
    }
    Ok(())
}

/// Execute the check subcommand.
fn run_check(args: CheckArgs) -> Result<(), LabelaugError> {
    let options = check::CheckOptions {
        kind: args.kind,
        keypoint_slots: args.keypoint_slots,
    };
    let report = check::check_labels(&args.labels, &options)?;
    print_report(&report, args.output)?;

    let passed = if args.strict {
        report.is_ok_strict()
    } else {
        report.is_ok()
    };
    if passed {
        Ok(())
    } else {
        Err(LabelaugError::CheckFailed {
            error_count: report.error_count(),
            skipped_lines: report.skipped_line_count(),
        })
    }
}

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for labelaug operations.
#[derive(Debug, Error)]
pub enum LabelaugError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid input layout at {path}: {message}")]
    InputLayout { path: PathBuf, message: String },

    #[error("Invalid keypoint label: {message}")]
    KeypointLabel { message: String },

    #[error("Missing keypoint label file {path}")]
    MissingKeypointLabel { path: PathBuf },

    #[error("Keypoint instance of class {class_id} left the frame")]
    KeypointInstanceLost { class_id: u32 },

    #[error("Class id {class_id} does not fit in an 8-bit mask (max {max})")]
    MaskClassOutOfRange { class_id: u32, max: u32 },

    #[error("Operation '{operation}' failed: {message}")]
    Transform { operation: String, message: String },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to write JSON report: {0}")]
    ReportWrite(#[source] serde_json::Error),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Augmentation incomplete: {skipped} sample/variant(s) skipped")]
    AugmentIncomplete { skipped: usize },

    #[error("Check failed with {error_count} error(s) and {skipped_lines} skipped line(s)")]
    CheckFailed {
        error_count: usize,
        skipped_lines: usize,
    },
}

impl LabelaugError {
    /// Shorthand for a transform failure inside a named operation.
    pub fn transform(operation: impl Into<String>, message: impl Into<String>) -> Self {
        LabelaugError::Transform {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

//! Label directory checking.
//!
//! Decodes every label file under a root without touching images, so a
//! dataset can be vetted before a long augmentation run.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::LabelaugError;
use crate::ir::io_yolo::{self, LABEL_EXTENSION};
use crate::ir::{Instance, LabelKind};

/// Options for checking a label directory.
#[derive(Clone, Debug)]
pub struct CheckOptions {
    pub kind: LabelKind,
    /// Maximum keypoints per instance; more is an error.
    pub keypoint_slots: Option<usize>,
}

/// Result of checking a label directory.
#[derive(Clone, Debug, Serialize)]
pub struct CheckReport {
    pub kind: LabelKind,
    pub files: usize,
    pub instances: usize,
    pub skipped_lines: Vec<LineIssue>,
    pub errors: Vec<FileIssue>,
}

impl CheckReport {
    fn new(kind: LabelKind) -> Self {
        Self {
            kind,
            files: 0,
            instances: 0,
            skipped_lines: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn skipped_line_count(&self) -> usize {
        self.skipped_lines.len()
    }

    /// Returns true if no file had a hard error.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true if there are no errors and no skipped lines.
    pub fn is_ok_strict(&self) -> bool {
        self.errors.is_empty() && self.skipped_lines.is_empty()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Checked {} {} label file(s): {} instance(s), {} error(s), {} skipped line(s)",
            self.files,
            self.kind.as_str(),
            self.instances,
            self.error_count(),
            self.skipped_line_count()
        )?;
        for issue in &self.errors {
            writeln!(f, "  [ERROR] {}: {}", issue.file, issue.message)?;
        }
        for issue in &self.skipped_lines {
            writeln!(f, "  [WARN ] {}:{}: {}", issue.file, issue.line, issue.message)?;
        }
        Ok(())
    }
}

/// A label line that was ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LineIssue {
    pub file: String,
    pub line: usize,
    pub message: String,
}

/// A label file that cannot be used at all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileIssue {
    pub file: String,
    pub message: String,
}

/// Decode every `.txt` file under `root`.
pub fn check_labels(root: &Path, options: &CheckOptions) -> Result<CheckReport, LabelaugError> {
    let mut report = CheckReport::new(options.kind);
    for path in label_files(root)? {
        let file = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .display()
            .to_string();
        report.files += 1;

        let decoded = match io_yolo::read_label_file(&path, options.kind) {
            Ok(decoded) => decoded,
            Err(err) => {
                report.errors.push(FileIssue {
                    file,
                    message: err.to_string(),
                });
                continue;
            }
        };

        if let Some(slots) = options.keypoint_slots {
            for instance in &decoded.instances {
                if let Instance::Keypoints(k) = instance {
                    if k.keypoints.len() > slots {
                        report.errors.push(FileIssue {
                            file: file.clone(),
                            message: format!(
                                "{} keypoints but only {} slots are configured",
                                k.keypoints.len(),
                                slots
                            ),
                        });
                    }
                }
            }
        }

        report.instances += decoded.instances.len();
        report
            .skipped_lines
            .extend(decoded.skipped.into_iter().map(|s| LineIssue {
                file: file.clone(),
                line: s.line,
                message: s.message,
            }));
    }
    Ok(report)
}

fn label_files(root: &Path) -> Result<Vec<PathBuf>, LabelaugError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|source| LabelaugError::InputLayout {
            path: root.to_path_buf(),
            message: format!("failed while traversing directory: {source}"),
        })?;
        let is_label = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(LABEL_EXTENSION));
        if entry.file_type().is_file() && is_label {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

//! Batch report types.
//!
//! One report summarizes a whole augmentation run: what was written, what
//! was skipped and why, and how many annotations the transforms cost.

use serde::Serialize;
use std::fmt;

use crate::ir::LabelKind;
use crate::reconcile::LossSummary;

/// The outcome of an augmentation run.
#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    pub kind: LabelKind,
    /// Base seed actually used; rerun with it to reproduce the output.
    pub seed: u64,
    /// Variants requested per source.
    pub variants: usize,
    pub sources_seen: usize,
    /// Sources whose pass-through copy was written.
    pub sources_processed: usize,
    pub variants_written: usize,
    pub variants_skipped: usize,
    /// Sources skipped as a whole (unreadable image, bad keypoint label).
    pub samples_skipped: usize,
    /// Malformed label lines ignored while decoding.
    pub label_lines_skipped: usize,
    pub loss: LossSummary,
    pub skipped: Vec<SkippedItem>,
}

impl BatchReport {
    pub fn new(kind: LabelKind, seed: u64, variants: usize) -> Self {
        Self {
            kind,
            seed,
            variants,
            sources_seen: 0,
            sources_processed: 0,
            variants_written: 0,
            variants_skipped: 0,
            samples_skipped: 0,
            label_lines_skipped: 0,
            loss: LossSummary::default(),
            skipped: Vec::new(),
        }
    }

    /// Record a whole source as skipped.
    pub fn skip_sample(&mut self, source: impl Into<String>, reason: impl Into<String>) {
        self.samples_skipped += 1;
        self.skipped.push(SkippedItem {
            source: source.into(),
            variant: None,
            reason: reason.into(),
        });
    }

    /// Record one variant of a source as skipped.
    pub fn skip_variant(
        &mut self,
        source: impl Into<String>,
        variant: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.variants_skipped += 1;
        self.skipped.push(SkippedItem {
            source: source.into(),
            variant: Some(variant.into()),
            reason: reason.into(),
        });
    }

    /// Number of skipped samples and variants.
    pub fn skip_count(&self) -> usize {
        self.skipped.len()
    }

    /// Returns true if every source and every variant was written.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Augmented {}/{} source(s) ({} labels, seed {}): {} variant(s) written, {} skipped",
            self.sources_processed,
            self.sources_seen,
            self.kind.as_str(),
            self.seed,
            self.variants_written,
            self.variants_skipped
        )?;
        writeln!(f, "  annotations: {}", self.loss)?;
        if self.label_lines_skipped > 0 {
            writeln!(f, "  label lines skipped: {}", self.label_lines_skipped)?;
        }

        if !self.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped ({}):", self.skipped.len())?;
            for item in &self.skipped {
                writeln!(f, "  - {}", item)?;
            }
        }

        Ok(())
    }
}

/// A sample or variant that produced no output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    /// Image path relative to the input root.
    pub source: String,
    /// Variant suffix, or `None` when the whole sample was skipped.
    pub variant: Option<String>,
    pub reason: String,
}

impl fmt::Display for SkippedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{} [{}]: {}", self.source, variant, self.reason),
            None => write!(f, "{}: {}", self.source, self.reason),
        }
    }
}

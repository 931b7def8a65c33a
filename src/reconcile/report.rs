//! Annotation loss accounting.
//!
//! Losing annotations to a transform is expected and never an error, but
//! it is always counted so users can see what a transform set costs.

use serde::Serialize;
use std::fmt;

/// What reconciliation kept, hid and dropped for one or more variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LossSummary {
    /// Boxes entering reconciliation.
    pub boxes_in: usize,
    /// Boxes removed for falling below the visibility threshold.
    pub boxes_dropped: usize,
    /// Labeled keypoints that left the frame and were hidden.
    pub keypoints_hidden: usize,
    /// Slots emitted as `(0, 0, 0)` placeholders.
    pub keypoint_placeholders: usize,
    /// Polygons entering the pipeline.
    pub polygons_in: usize,
    /// Polygons written after reconciliation.
    pub polygons_out: usize,
}

impl LossSummary {
    /// Add the counts of `other` to `self`.
    pub fn merge(&mut self, other: &LossSummary) {
        self.boxes_in += other.boxes_in;
        self.boxes_dropped += other.boxes_dropped;
        self.keypoints_hidden += other.keypoints_hidden;
        self.keypoint_placeholders += other.keypoint_placeholders;
        self.polygons_in += other.polygons_in;
        self.polygons_out += other.polygons_out;
    }

    /// Polygons that did not survive, or zero when tracing split polygons
    /// into more pieces than went in.
    pub fn polygons_dropped(&self) -> usize {
        self.polygons_in.saturating_sub(self.polygons_out)
    }

    /// Returns true if any annotation was dropped or hidden.
    pub fn has_loss(&self) -> bool {
        self.boxes_dropped > 0 || self.keypoints_hidden > 0 || self.polygons_dropped() > 0
    }
}

impl fmt::Display for LossSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "boxes {}/{} kept, {} keypoint(s) hidden, {} placeholder slot(s), polygons {} in / {} out",
            self.boxes_in - self.boxes_dropped.min(self.boxes_in),
            self.boxes_in,
            self.keypoints_hidden,
            self.keypoint_placeholders,
            self.polygons_in,
            self.polygons_out
        )
    }
}

//! Batch statistics report.
//!
//! One [`BatchReport`] is produced per batch run, summarizing how many
//! images were attempted, how the success/failure split fell, and what was
//! detected. Serializable for `--json` consumers, printable for humans.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Statistics for one batch labeling run.
///
/// `class_distribution` is keyed by the detector's *original* class id, not
/// the batch-local index written to label files; it reports what the model
/// saw independent of the remapping.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Count of input paths that survived validation.
    pub total_images: usize,
    /// Images for which the detector produced a result (even an empty one).
    pub successful_predictions: usize,
    /// Images for which inference failed or returned no result.
    pub failed_predictions: usize,
    /// Per-image label files actually written.
    pub annotation_files_created: usize,
    /// Distinct original class ids observed across the batch.
    pub classes_detected: usize,
    /// Sum of all detections across the batch.
    pub total_detections: usize,
    /// Detections per original class id.
    pub class_distribution: BTreeMap<usize, usize>,
}

impl BatchReport {
    /// True when every validated image produced a prediction.
    pub fn is_complete_success(&self) -> bool {
        self.failed_predictions == 0
    }

    /// True when no image produced a prediction.
    pub fn is_total_failure(&self) -> bool {
        self.total_images > 0 && self.successful_predictions == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Auto labeling complete")?;
        writeln!(f, "  total images:       {}", self.total_images)?;
        writeln!(f, "  successful:         {}", self.successful_predictions)?;
        writeln!(f, "  failed:             {}", self.failed_predictions)?;
        writeln!(f, "  annotation files:   {}", self.annotation_files_created)?;
        writeln!(f, "  classes detected:   {}", self.classes_detected)?;
        write!(f, "  total detections:   {}", self.total_detections)?;
        if !self.class_distribution.is_empty() {
            write!(f, "\n  class distribution:")?;
            for (class_id, count) in &self.class_distribution {
                write!(f, "\n    class {}: {} detection(s)", class_id, count)?;
            }
        }
        Ok(())
    }
}

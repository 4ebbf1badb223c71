//! Batch prediction orchestration.
//!
//! [`run_batch`] drives the whole pipeline for one batch: fail-fast input
//! validation, per-image inference with failure isolation, class-count
//! aggregation, class-map derivation, and label file writing. A failure on
//! one image is logged and counted, never fatal to the batch; only the
//! up-front validation steps and the shared outputs (output directory,
//! class file) can abort the run.

pub mod report;

pub use report::BatchReport;

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::annotate::{writer, ClassCounts, ClassMap};
use crate::detector::{Detector, DetectorBackend, InferenceOutput};
use crate::error::AutolabelError;
use crate::validate;

/// Per-batch settings, resolved by the caller from config and CLI flags.
#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Minimum detection score for a box to be retained by the detector.
    pub confidence: f32,
    /// Directory that receives `classes.txt` and the per-image label files.
    pub output_dir: PathBuf,
    /// Allowed image extensions, normalized (lowercase, leading dot).
    pub image_extensions: BTreeSet<String>,
}

/// Runs inference over `image_paths` and writes YOLO label files.
///
/// Returns the batch statistics. Per-image inference and write failures are
/// reflected in the statistics only; validation failures, an unusable
/// output directory, and a failed class-file write abort the batch.
pub fn run_batch<B: DetectorBackend>(
    detector: &mut Detector<B>,
    image_paths: &[PathBuf],
    opts: &BatchOptions,
) -> Result<BatchReport, AutolabelError> {
    if !detector.is_ready() {
        return Err(AutolabelError::prediction(
            "detector is not initialized; call configure first",
        ));
    }
    validate::validate_confidence(opts.confidence)?;
    if image_paths.is_empty() {
        return Err(AutolabelError::prediction("image path list is empty"));
    }

    let validated = filter_image_paths(image_paths, &opts.image_extensions);
    if validated.is_empty() {
        return Err(AutolabelError::prediction(
            "no valid image files to process",
        ));
    }

    // Validation is done; only now is it safe to touch the filesystem.
    fs::create_dir_all(&opts.output_dir)
        .map_err(|source| AutolabelError::file_operation(opts.output_dir.clone(), source))?;

    info!(
        images = validated.len(),
        confidence = opts.confidence,
        output_dir = %opts.output_dir.display(),
        "starting batch labeling"
    );

    let mut report = BatchReport {
        total_images: validated.len(),
        ..BatchReport::default()
    };
    let mut counts = ClassCounts::new();
    let mut retained: Vec<(PathBuf, InferenceOutput)> = Vec::new();

    for path in &validated {
        match detector.infer(path, opts.confidence) {
            Ok(Some(output)) => {
                report.successful_predictions += 1;
                for detection in &output.detections {
                    counts.record(detection.class_id);
                    debug!(
                        image = %path.display(),
                        class = %detector.class_name_for_id(output.names.as_ref(), detection.class_id),
                        confidence = detection.confidence,
                        "detection"
                    );
                }
                retained.push((path.clone(), output));
            }
            Ok(None) => {
                report.failed_predictions += 1;
                warn!(image = %path.display(), "detector returned no result");
            }
            Err(err) => {
                report.failed_predictions += 1;
                error!(image = %path.display(), %err, "prediction failed");
            }
        }
    }

    let map = if counts.is_empty() {
        warn!("no detections in any image; class file will list the configured prompts");
        ClassMap::from_names(detector.class_names())
    } else {
        ClassMap::from_counts(&counts, |id| detector.class_name_for_id(None, id))
    };

    // The class file makes every per-image index interpretable; without it
    // the batch output is useless, so this write stays fatal.
    let class_file = writer::write_class_file(&opts.output_dir, &map)?;
    debug!(path = %class_file.display(), classes = map.len(), "wrote class file");

    for (path, output) in &retained {
        match writer::write_annotation_file(&opts.output_dir, path, &output.detections, &map) {
            Ok(label_path) => {
                report.annotation_files_created += 1;
                debug!(path = %label_path.display(), "wrote annotation file");
            }
            Err(err) => {
                error!(image = %path.display(), %err, "failed to write annotation file");
            }
        }
    }

    report.classes_detected = counts.distinct();
    report.total_detections = counts.total();
    report.class_distribution = counts.into_map();

    info!(
        successful = report.successful_predictions,
        failed = report.failed_predictions,
        files = report.annotation_files_created,
        detections = report.total_detections,
        "batch labeling finished"
    );
    Ok(report)
}

/// Drops paths that do not name an existing image file with an allowed
/// extension, logging each rejection.
fn filter_image_paths(paths: &[PathBuf], extensions: &BTreeSet<String>) -> Vec<PathBuf> {
    let mut validated = Vec::with_capacity(paths.len());
    for path in paths {
        match validate::validate_image_file(path, extensions) {
            Ok(()) => validated.push(path.clone()),
            Err(reason) => {
                warn!(image = %path.display(), reason, "skipping invalid image path");
            }
        }
    }
    validated
}

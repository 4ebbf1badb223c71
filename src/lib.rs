//! Autolabel: batch auto-labeling for object detection datasets.
//!
//! Autolabel points an open-vocabulary detector at a folder of images and
//! writes YOLO-format annotations: one `.txt` label file per image plus a
//! shared `classes.txt`, with class indices assigned deterministically from
//! what the detector actually found across the batch.
//!
//! # Modules
//!
//! - [`predict`]: the batch orchestrator and its statistics report
//! - [`detector`]: the detector adapter and backend trait
//! - [`annotate`]: class counting, index mapping, and label file writing
//! - [`config`], [`validate`], [`scan`]: configuration and input handling
//! - [`error`]: error types for autolabel operations

pub mod annotate;
pub mod config;
pub mod detector;
pub mod error;
pub mod predict;
pub mod scan;
pub mod validate;

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::config::AppConfig;
use crate::predict::{BatchOptions, BatchReport};

pub use error::AutolabelError;

/// The autolabel CLI application.
#[derive(Parser)]
#[command(name = "autolabel")]
#[command(version, author, about)]
struct Cli {
    /// Comma-separated class prompts, e.g. "person,car,bus".
    #[arg(short, long)]
    prompts: String,

    /// Folder scanned recursively for input images.
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Output folder for classes.txt and the per-image label files.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Detector model file name inside the configured models directory.
    #[arg(long)]
    model: Option<String>,

    /// Confidence threshold in [0,1].
    #[arg(long)]
    conf: Option<f32>,

    /// Annotation output format (currently only 'yolo').
    #[arg(long, default_value = "yolo")]
    format: String,

    /// Configuration file path.
    #[arg(long, env = "AUTOLABEL_CONFIG", default_value = "autolabel.json")]
    config: PathBuf,

    /// Print the batch report as JSON on stdout.
    #[arg(long)]
    json: bool,
}

/// Run the autolabel CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), AutolabelError> {
    let cli = Cli::parse();
    run_label(cli)
}

/// Execute one labeling run from parsed arguments.
fn run_label(cli: Cli) -> Result<(), AutolabelError> {
    if cli.format != "yolo" {
        return Err(AutolabelError::invalid_parameter(format!(
            "unsupported annotation format '{}' (supported: yolo)",
            cli.format
        )));
    }

    let config = AppConfig::load_or_default(&cli.config);

    let prompts = validate::parse_prompt_list(&cli.prompts);
    validate::validate_prompts(&prompts)?;

    let confidence = cli.conf.unwrap_or(config.confidence);
    validate::validate_confidence(confidence)?;

    let model = cli.model.clone().unwrap_or_else(|| config.model.clone());
    validate::validate_model_name(&model, &config.valid_models)?;

    let extensions = config.extension_set()?;
    let images_dir = cli.images_dir.unwrap_or_else(|| config.images_dir.clone());
    let output_dir = cli.output_dir.unwrap_or_else(|| config.output_dir.clone());

    let images = scan::scan_images(&images_dir, &extensions)?;
    info!(
        images = images.len(),
        model = %model,
        prompts = prompts.len(),
        "inputs validated"
    );

    let opts = BatchOptions {
        confidence,
        output_dir,
        image_extensions: extensions,
    };
    let report = run_with_backend(&config, &model, &prompts, &images, &opts)?;

    if cli.json {
        let rendered = serde_json::to_string_pretty(&report).map_err(|e| {
            AutolabelError::prediction_with("failed to render the report as JSON", e)
        })?;
        println!("{rendered}");
    } else {
        println!("{report}");
    }
    Ok(())
}

#[cfg(feature = "onnx")]
fn run_with_backend(
    config: &AppConfig,
    model: &str,
    prompts: &[String],
    images: &[PathBuf],
    opts: &BatchOptions,
) -> Result<BatchReport, AutolabelError> {
    let mut detector: detector::Detector<detector::onnx::OnnxDetector> =
        detector::Detector::new(&config.models_dir);
    detector.configure(model, prompts)?;
    info!(detector = %detector.info(), "detector ready");
    predict::run_batch(&mut detector, images, opts)
}

#[cfg(not(feature = "onnx"))]
fn run_with_backend(
    _config: &AppConfig,
    _model: &str,
    _prompts: &[String],
    _images: &[PathBuf],
    _opts: &BatchOptions,
) -> Result<BatchReport, AutolabelError> {
    Err(AutolabelError::config(
        "this build has no detection backend; rebuild with `--features onnx`",
    ))
}

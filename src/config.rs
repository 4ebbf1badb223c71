//! Application configuration for autolabel.
//!
//! Settings live in a small JSON file; every field has a default so a
//! missing or unreadable file degrades to the built-in configuration with a
//! warning instead of failing the run. CLI flags override loaded values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::AutolabelError;
use crate::validate;

/// Runtime configuration with per-field defaults.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Default confidence threshold for detection retention.
    pub confidence: f32,
    /// Default detector model file name, resolved inside `models_dir`.
    pub model: String,
    /// Model file names the CLI accepts for `--model`.
    pub valid_models: Vec<String>,
    /// Extensions treated as images when scanning, with leading dot.
    pub image_extensions: Vec<String>,
    /// Directory containing model artifacts.
    pub models_dir: PathBuf,
    /// Default input image directory.
    pub images_dir: PathBuf,
    /// Default annotation output directory.
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            model: "yoloe-11l-seg.onnx".to_string(),
            valid_models: vec![
                "yoloe-11l-seg.onnx".to_string(),
                "yoloe-11m-seg.onnx".to_string(),
                "yoloe-11s-seg.onnx".to_string(),
            ],
            image_extensions: vec![".png".to_string(), ".jpg".to_string(), ".jpeg".to_string()],
            models_dir: PathBuf::from("models"),
            images_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a JSON file, failing on parse or validation
    /// errors. Most callers want [`AppConfig::load_or_default`] instead.
    pub fn load(path: &Path) -> Result<Self, AutolabelError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| AutolabelError::config(format!("cannot read {}: {e}", path.display())))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .map_err(|e| AutolabelError::config(format!("cannot parse {}: {e}", path.display())))?;
        config.validated()
    }

    /// Loads configuration from `path`, falling back to defaults with a
    /// warning when the file is missing, unreadable, or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %path.display(), %err, "config file rejected, using defaults");
                Self::default()
            }
        }
    }

    /// Checks loaded values for internal consistency.
    fn validated(self) -> Result<Self, AutolabelError> {
        validate::validate_confidence(self.confidence)
            .map_err(|e| AutolabelError::config(e.to_string()))?;
        if self.valid_models.is_empty() {
            return Err(AutolabelError::config("valid_models list is empty"));
        }
        validate::validate_image_extensions(&self.image_extensions)
            .map_err(|e| AutolabelError::config(e.to_string()))?;
        Ok(self)
    }

    /// The normalized extension set used for scanning and per-path checks.
    pub fn extension_set(&self) -> Result<std::collections::BTreeSet<String>, AutolabelError> {
        validate::validate_image_extensions(&self.image_extensions)
    }
}

/// Fuzzing entry point for config parsing.
///
/// Exposed only with the `fuzzing` feature so the fuzz crate can drive the
/// JSON loader and consistency checks with arbitrary input.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_config(input: &str) -> Result<AppConfig, AutolabelError> {
    let config: AppConfig =
        serde_json::from_str(input).map_err(|e| AutolabelError::config(e.to_string()))?;
    config.validated()
}

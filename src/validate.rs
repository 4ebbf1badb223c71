//! Input validation for autolabel.
//!
//! Pure checks over user-supplied values, run before anything touches the
//! detector or the filesystem:
//! - confidence thresholds (finite, within `[0,1]`)
//! - class prompts (non-empty, no path-hostile characters)
//! - model names (membership in the configured valid set)
//! - image paths and extension sets

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::AutolabelError;

/// Characters that must not appear in a class prompt. Prompts end up in
/// class files and log lines next to paths, so anything a filesystem
/// treats specially is rejected up front.
pub const PATH_HOSTILE_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Splits a raw comma-separated prompt list into trimmed, non-empty names.
///
/// `"person, car,,bus "` becomes `["person", "car", "bus"]`. Validation of
/// the individual names is a separate step ([`validate_prompts`]).
pub fn parse_prompt_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validates a parsed prompt list: non-empty, every name non-blank and free
/// of path-hostile characters.
pub fn validate_prompts(prompts: &[String]) -> Result<(), AutolabelError> {
    if prompts.is_empty() {
        return Err(AutolabelError::invalid_parameter(
            "prompt list is empty; provide at least one class name",
        ));
    }
    for prompt in prompts {
        if prompt.trim().is_empty() {
            return Err(AutolabelError::invalid_parameter(
                "prompt list contains a blank class name",
            ));
        }
        if let Some(bad) = prompt.chars().find(|c| PATH_HOSTILE_CHARS.contains(c)) {
            return Err(AutolabelError::invalid_parameter(format!(
                "class name {prompt:?} contains forbidden character {bad:?}"
            )));
        }
    }
    Ok(())
}

/// Validates a confidence threshold: finite and within `[0,1]`.
pub fn validate_confidence(confidence: f32) -> Result<(), AutolabelError> {
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(AutolabelError::invalid_parameter(format!(
            "confidence threshold must be within [0,1], got {confidence}"
        )));
    }
    Ok(())
}

/// Validates a model name against the configured valid set.
pub fn validate_model_name(name: &str, valid_models: &[String]) -> Result<(), AutolabelError> {
    if !valid_models.iter().any(|m| m == name) {
        return Err(AutolabelError::invalid_parameter(format!(
            "unknown model {name:?}; valid models: {}",
            valid_models.join(", ")
        )));
    }
    Ok(())
}

/// Normalizes an extension list into a lookup set: lowercase, leading dot.
///
/// Accepts entries with or without the dot (`"PNG"` and `".png"` both
/// normalize to `".png"`). Rejects blank entries and an empty list.
pub fn validate_image_extensions(
    extensions: &[String],
) -> Result<BTreeSet<String>, AutolabelError> {
    if extensions.is_empty() {
        return Err(AutolabelError::invalid_parameter(
            "image extension list is empty",
        ));
    }
    let mut normalized = BTreeSet::new();
    for ext in extensions {
        let trimmed = ext.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Err(AutolabelError::invalid_parameter(format!(
                "invalid image extension {ext:?}"
            )));
        }
        normalized.insert(format!(".{}", trimmed.to_ascii_lowercase()));
    }
    Ok(normalized)
}

/// Checks that a path names an existing regular file with an allowed
/// extension. Returns the reason on failure so callers can log and skip.
pub fn validate_image_file(path: &Path, extensions: &BTreeSet<String>) -> Result<(), String> {
    if !path.exists() {
        return Err("file does not exist".to_string());
    }
    if !path.is_file() {
        return Err("not a regular file".to_string());
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if extensions.contains(&format!(".{}", ext.to_ascii_lowercase())) => Ok(()),
        Some(ext) => Err(format!("unsupported extension .{ext}")),
        None => Err("no file extension".to_string()),
    }
}

/// Checks that a path names an existing directory.
pub fn validate_directory(path: &Path) -> Result<(), AutolabelError> {
    if !path.exists() {
        return Err(AutolabelError::invalid_parameter(format!(
            "directory {} does not exist",
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(AutolabelError::invalid_parameter(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    Ok(())
}

/// Fuzzing entry point for the prompt-list parser.
///
/// Exposed only with the `fuzzing` feature so the fuzz crate can drive the
/// parser and prompt validation with arbitrary input.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_prompt_list(input: &str) -> Result<(), AutolabelError> {
    let prompts = parse_prompt_list(input);
    if prompts.is_empty() {
        return Ok(());
    }
    validate_prompts(&prompts)
}

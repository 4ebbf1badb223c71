use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use autolabel::detector::{DetectorBackend, InferenceOutput, NameTable};

/// One scripted per-image outcome.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// `infer` returns an error for this image.
    Fail,
    /// `infer` returns no result object for this image.
    NoResult,
    /// `infer` returns this output, filtered by the call's threshold.
    Detections { output: InferenceOutput },
}

/// A scripted model artifact, stored as JSON where a real backend would
/// expect model weights. Outcomes are keyed by image file stem; unscripted
/// images succeed with zero detections.
#[derive(Debug, Default, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub names: Option<NameTable>,
    #[serde(default)]
    pub outcomes: BTreeMap<String, Outcome>,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ScriptError(pub String);

/// Detector backend driven entirely by a [`Script`], so integration tests
/// can describe whole batches declaratively while the pipeline under test
/// stays real.
pub struct ScriptedBackend {
    script: Script,
}

impl DetectorBackend for ScriptedBackend {
    type Error = ScriptError;

    fn load(artifact: &Path) -> Result<Self, Self::Error> {
        let raw = fs::read_to_string(artifact).map_err(|e| ScriptError(e.to_string()))?;
        let script = serde_json::from_str(&raw).map_err(|e| ScriptError(e.to_string()))?;
        Ok(Self { script })
    }

    fn bind_classes(&mut self, _names: &[String]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn infer(
        &mut self,
        image: &Path,
        confidence: f32,
    ) -> Result<Option<InferenceOutput>, Self::Error> {
        let stem = image
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        match self.script.outcomes.get(stem) {
            None => Ok(Some(InferenceOutput::default())),
            Some(Outcome::Fail) => Err(ScriptError(format!("scripted failure for {stem}"))),
            Some(Outcome::NoResult) => Ok(None),
            Some(Outcome::Detections { output }) => {
                let mut output = output.clone();
                output.detections.retain(|d| d.confidence >= confidence);
                Ok(Some(output))
            }
        }
    }

    fn names(&self) -> Option<&NameTable> {
        self.script.names.as_ref()
    }
}

/// Writes a placeholder image file. The labeling pipeline never decodes
/// pixels, so magic bytes are enough.
pub fn write_image(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, b"\x89PNG\r\n\x1a\n").expect("write image file");
}

/// Writes a backend script where the pipeline expects a model artifact.
pub fn write_script(path: &Path, script: &serde_json::Value) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, script.to_string()).expect("write script file");
}

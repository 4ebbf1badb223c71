//! Detector adapter.
//!
//! The detection model is treated as an opaque capability behind the
//! [`DetectorBackend`] trait: given an image path and a confidence
//! threshold it yields zero or more detections, each with a class id and a
//! normalized center box. [`Detector`] wraps a backend together with the
//! configured vocabulary and the name-resolution chain for class ids.
//!
//! The real ONNX Runtime backend lives in [`onnx`] behind the `onnx`
//! feature; tests drive the pipeline with scripted fakes.

#[cfg(feature = "onnx")]
pub mod onnx;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AutolabelError;
use crate::validate;

/// A bounding box as center-x, center-y, width, height, each normalized to
/// `[0,1]` of the image dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxCxcywh {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl BoxCxcywh {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }

    /// True when all four coordinates are finite and within `[0,1]`.
    pub fn is_normalized(&self) -> bool {
        [self.cx, self.cy, self.w, self.h]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

/// One model output: an original class id, an optional normalized box, and
/// the detection score. Box-less detections count toward class totals but
/// produce no annotation line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    #[serde(default)]
    pub bbox: Option<BoxCxcywh>,
    #[serde(default)]
    pub confidence: f32,
}

impl Detection {
    pub fn new(class_id: usize, bbox: BoxCxcywh, confidence: f32) -> Self {
        Self {
            class_id,
            bbox: Some(bbox),
            confidence,
        }
    }
}

/// A class-id → name table as exposed by detector runtimes, which publish
/// either a list (positional) or a sparse map.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NameTable {
    List(Vec<String>),
    Map(BTreeMap<usize, String>),
}

impl NameTable {
    pub fn get(&self, class_id: usize) -> Option<&str> {
        match self {
            NameTable::List(names) => names.get(class_id).map(String::as_str),
            NameTable::Map(names) => names.get(&class_id).map(String::as_str),
        }
    }
}

// Untagged derives buffer the input, and buffered JSON object keys stay
// strings, so a derived `Map` variant with integer keys never matches.
// The keys are parsed by hand instead.
impl<'de> Deserialize<'de> for NameTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Map(BTreeMap<String, String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::List(names) => Ok(NameTable::List(names)),
            Raw::Map(raw) => raw
                .into_iter()
                .map(|(key, name)| {
                    key.parse::<usize>().map(|id| (id, name)).map_err(|_| {
                        serde::de::Error::custom(format!(
                            "name table key {key:?} is not a class id"
                        ))
                    })
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(NameTable::Map),
        }
    }
}

/// What one inference call produced: the detections plus, when the runtime
/// attaches one, a result-scoped name table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceOutput {
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub names: Option<NameTable>,
}

/// The capability the pipeline requires from a detection runtime.
///
/// `infer` returns `Ok(None)` when the runtime yields no result object at
/// all; the orchestrator counts that as a failed prediction, same as `Err`.
pub trait DetectorBackend: Sized {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the model artifact from disk.
    fn load(artifact: &Path) -> Result<Self, Self::Error>;

    /// Binds the free-text class vocabulary for subsequent inference.
    fn bind_classes(&mut self, names: &[String]) -> Result<(), Self::Error>;

    /// Runs detection on one image.
    fn infer(
        &mut self,
        image: &Path,
        confidence: f32,
    ) -> Result<Option<InferenceOutput>, Self::Error>;

    /// The model-level name table, when the artifact carries one.
    fn names(&self) -> Option<&NameTable>;
}

/// Snapshot of the adapter's state, for startup logging and `--json` users.
#[derive(Clone, Debug, Serialize)]
pub struct DetectorInfo {
    pub ready: bool,
    pub model_name: Option<String>,
    pub num_classes: usize,
    pub class_names: Vec<String>,
}

impl fmt::Display for DetectorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model_name {
            Some(name) => write!(
                f,
                "{} ({} class(es): {})",
                name,
                self.num_classes,
                self.class_names.join(", ")
            ),
            None => write!(f, "not configured"),
        }
    }
}

/// Owns the loaded backend and the currently configured vocabulary.
///
/// Created empty; becomes ready after a successful [`Detector::configure`].
/// Reconfiguration fully replaces prior state, and a failed reconfiguration
/// leaves the adapter not ready rather than partially configured.
#[derive(Debug)]
pub struct Detector<B> {
    models_dir: PathBuf,
    backend: Option<B>,
    model_name: Option<String>,
    class_names: Vec<String>,
}

impl<B: DetectorBackend> Detector<B> {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            backend: None,
            model_name: None,
            class_names: Vec::new(),
        }
    }

    /// Loads `model_name` from the models directory and binds the class
    /// vocabulary. The caller is responsible for checking `model_name`
    /// against its configured valid set beforehand.
    pub fn configure(
        &mut self,
        model_name: &str,
        class_names: &[String],
    ) -> Result<(), AutolabelError> {
        // Any failure below must leave the adapter unconfigured, never
        // with a half-replaced vocabulary.
        self.backend = None;
        self.model_name = None;
        self.class_names.clear();

        validate::validate_prompts(class_names)
            .map_err(|e| AutolabelError::model_init(format!("invalid class vocabulary: {e}")))?;

        let artifact = self.models_dir.join(model_name);
        if !artifact.exists() {
            return Err(AutolabelError::model_init(format!(
                "model file not found: {}",
                artifact.display()
            )));
        }

        let mut backend = B::load(&artifact).map_err(|e| {
            AutolabelError::model_init_with(
                format!("failed to load model {}", artifact.display()),
                e,
            )
        })?;
        backend.bind_classes(class_names).map_err(|e| {
            AutolabelError::model_init_with(
                format!("failed to bind class vocabulary for {model_name}"),
                e,
            )
        })?;

        self.backend = Some(backend);
        self.model_name = Some(model_name.to_string());
        self.class_names = class_names.to_vec();
        info!(model = model_name, classes = self.class_names.len(), "detector configured");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.backend.is_some()
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn info(&self) -> DetectorInfo {
        DetectorInfo {
            ready: self.is_ready(),
            model_name: self.model_name.clone(),
            num_classes: self.class_names.len(),
            class_names: self.class_names.clone(),
        }
    }

    /// Runs detection on one image through the configured backend.
    ///
    /// `Ok(None)` means the backend produced no result object; the caller
    /// treats it as a failed prediction for this image only.
    pub fn infer(
        &mut self,
        image: &Path,
        confidence: f32,
    ) -> Result<Option<InferenceOutput>, AutolabelError> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(AutolabelError::prediction(
                "detector is not initialized; call configure first",
            ));
        };
        let output = backend.infer(image, confidence).map_err(|e| {
            AutolabelError::prediction_with(format!("inference failed for {}", image.display()), e)
        })?;
        if let Some(output) = &output {
            debug!(
                image = %image.display(),
                detections = output.detections.len(),
                "inference complete"
            );
        }
        Ok(output)
    }

    /// Resolves a class id to a human-readable name.
    ///
    /// Priority: a result-scoped table from the inference call, then the
    /// model-level table, then the configured names positionally, then the
    /// synthesized `class_{id}`. Detector runtimes differ in which tables
    /// they expose, so all four steps are reachable.
    pub fn class_name_for_id(&self, result_names: Option<&NameTable>, class_id: usize) -> String {
        if let Some(name) = result_names.and_then(|t| t.get(class_id)) {
            return name.to_string();
        }
        if let Some(name) = self
            .backend
            .as_ref()
            .and_then(|b| b.names())
            .and_then(|t| t.get(class_id))
        {
            return name.to_string();
        }
        if let Some(name) = self.class_names.get(class_id) {
            return name.clone();
        }
        format!("class_{}", class_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Minimal backend for adapter state-machine tests. Loads from any
    /// existing file, optionally refuses, and echoes a fixed output.
    struct EchoBackend {
        classes: Vec<String>,
        names: Option<NameTable>,
        fail_inference: bool,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct EchoError(String);

    impl DetectorBackend for EchoBackend {
        type Error = EchoError;

        fn load(artifact: &Path) -> Result<Self, Self::Error> {
            let raw = fs::read_to_string(artifact).map_err(|e| EchoError(e.to_string()))?;
            if raw.contains("refuse-load") {
                return Err(EchoError("artifact refused to load".to_string()));
            }
            Ok(Self {
                classes: Vec::new(),
                names: raw
                    .contains("with-names")
                    .then(|| NameTable::List(vec!["alpha".to_string(), "beta".to_string()])),
                fail_inference: raw.contains("fail-inference"),
            })
        }

        fn bind_classes(&mut self, names: &[String]) -> Result<(), Self::Error> {
            if names.iter().any(|n| n == "unbindable") {
                return Err(EchoError("vocabulary rejected".to_string()));
            }
            self.classes = names.to_vec();
            Ok(())
        }

        fn infer(
            &mut self,
            _image: &Path,
            confidence: f32,
        ) -> Result<Option<InferenceOutput>, Self::Error> {
            if self.fail_inference {
                return Err(EchoError("inference exploded".to_string()));
            }
            Ok(Some(InferenceOutput {
                detections: vec![Detection::new(
                    self.classes.len().saturating_sub(1),
                    BoxCxcywh::new(0.5, 0.5, 0.2, 0.2),
                    confidence.max(0.9),
                )],
                names: None,
            }))
        }

        fn names(&self) -> Option<&NameTable> {
            self.names.as_ref()
        }
    }

    fn write_artifact(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).expect("write artifact");
    }

    fn prompts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn starts_unconfigured() {
        let detector: Detector<EchoBackend> = Detector::new("models");
        assert!(!detector.is_ready());
        assert!(detector.model_name().is_none());
        assert!(detector.class_names().is_empty());
        assert_eq!(detector.info().to_string(), "not configured");
    }

    #[test]
    fn configure_makes_ready() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_artifact(temp.path(), "model.onnx", "ok");

        let mut detector: Detector<EchoBackend> = Detector::new(temp.path());
        detector
            .configure("model.onnx", &prompts(&["person", "car"]))
            .unwrap();

        assert!(detector.is_ready());
        assert_eq!(detector.model_name(), Some("model.onnx"));
        assert_eq!(detector.class_names(), &["person", "car"]);
        let info = detector.info();
        assert!(info.ready);
        assert_eq!(info.num_classes, 2);
    }

    #[test]
    fn configure_rejects_missing_artifact() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let mut detector: Detector<EchoBackend> = Detector::new(temp.path());
        let err = detector
            .configure("absent.onnx", &prompts(&["person"]))
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("not found"));
        assert!(!detector.is_ready());
    }

    #[test]
    fn configure_rejects_empty_vocabulary() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_artifact(temp.path(), "model.onnx", "ok");
        let mut detector: Detector<EchoBackend> = Detector::new(temp.path());
        let err = detector.configure("model.onnx", &[]).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!detector.is_ready());
    }

    #[test]
    fn configure_wraps_load_failure() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_artifact(temp.path(), "bad.onnx", "refuse-load");
        let mut detector: Detector<EchoBackend> = Detector::new(temp.path());
        let err = detector
            .configure("bad.onnx", &prompts(&["person"]))
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!detector.is_ready());
    }

    #[test]
    fn failed_reconfiguration_resets_ready_state() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_artifact(temp.path(), "model.onnx", "ok");

        let mut detector: Detector<EchoBackend> = Detector::new(temp.path());
        detector
            .configure("model.onnx", &prompts(&["person"]))
            .unwrap();
        assert!(detector.is_ready());

        let err = detector
            .configure("model.onnx", &prompts(&["unbindable"]))
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!detector.is_ready());
        assert!(detector.model_name().is_none());
        assert!(detector.class_names().is_empty());
    }

    #[test]
    fn reconfiguration_replaces_vocabulary() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_artifact(temp.path(), "model.onnx", "ok");

        let mut detector: Detector<EchoBackend> = Detector::new(temp.path());
        detector
            .configure("model.onnx", &prompts(&["person", "car"]))
            .unwrap();
        detector
            .configure("model.onnx", &prompts(&["bus"]))
            .unwrap();
        assert_eq!(detector.class_names(), &["bus"]);
    }

    #[test]
    fn infer_before_configure_is_a_distinct_error() {
        let mut detector: Detector<EchoBackend> = Detector::new("models");
        let err = detector.infer(Path::new("img.png"), 0.5).unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("not initialized"));
    }

    #[test]
    fn infer_wraps_backend_failure_with_image_path() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_artifact(temp.path(), "model.onnx", "fail-inference");
        let mut detector: Detector<EchoBackend> = Detector::new(temp.path());
        detector
            .configure("model.onnx", &prompts(&["person"]))
            .unwrap();

        let err = detector.infer(Path::new("img.png"), 0.5).unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains("img.png"));
    }

    #[test]
    fn name_resolution_prefers_result_scoped_table() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_artifact(temp.path(), "model.onnx", "with-names");
        let mut detector: Detector<EchoBackend> = Detector::new(temp.path());
        detector
            .configure("model.onnx", &prompts(&["person", "car"]))
            .unwrap();

        let result_names = NameTable::Map(BTreeMap::from([(0, "override".to_string())]));
        assert_eq!(detector.class_name_for_id(Some(&result_names), 0), "override");
        // Model-level table next.
        assert_eq!(detector.class_name_for_id(Some(&result_names), 1), "beta");
        assert_eq!(detector.class_name_for_id(None, 0), "alpha");
    }

    #[test]
    fn name_resolution_falls_back_to_configured_then_synthesized() {
        let temp = tempfile::tempdir().expect("create temp dir");
        write_artifact(temp.path(), "model.onnx", "ok");
        let mut detector: Detector<EchoBackend> = Detector::new(temp.path());
        detector
            .configure("model.onnx", &prompts(&["person", "car"]))
            .unwrap();

        assert_eq!(detector.class_name_for_id(None, 1), "car");
        assert_eq!(detector.class_name_for_id(None, 7), "class_7");
    }

    #[test]
    fn name_table_shapes_resolve_the_same_way() {
        let list = NameTable::List(vec!["person".to_string(), "car".to_string()]);
        let map = NameTable::Map(BTreeMap::from([
            (0, "person".to_string()),
            (1, "car".to_string()),
        ]));
        assert_eq!(list.get(1), Some("car"));
        assert_eq!(map.get(1), Some("car"));
        assert_eq!(list.get(9), None);
        assert_eq!(map.get(9), None);
    }

    #[test]
    fn name_table_deserializes_from_list_and_map_json() {
        let list: NameTable = serde_json::from_str(r#"["person", "car"]"#).unwrap();
        assert_eq!(list.get(0), Some("person"));

        let map: NameTable = serde_json::from_str(r#"{"0": "person", "3": "car"}"#).unwrap();
        assert_eq!(map.get(3), Some("car"));
        assert_eq!(map.get(1), None);
    }

    #[test]
    fn name_table_round_trips_through_its_own_json() {
        let table = NameTable::Map(BTreeMap::from([
            (2, "truck".to_string()),
            (7, "kite".to_string()),
        ]));
        let json = serde_json::to_string(&table).unwrap();
        let parsed: NameTable = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn name_table_rejects_non_numeric_map_keys() {
        let err = serde_json::from_str::<NameTable>(r#"{"zero": "person"}"#).unwrap_err();
        assert!(err.to_string().contains("not a class id"));
    }
}

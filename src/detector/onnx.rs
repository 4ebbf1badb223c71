//! ONNX Runtime detection backend.
//!
//! Compiled only with the `onnx` feature. Loads Ultralytics-style ONNX
//! exports: the class-name table is read from the model's `names` metadata
//! entry, input images are letterboxed to the model's square input, and the
//! raw `[1, 4+nc, anchors]` output is decoded with class-wise non-maximum
//! suppression into normalized center boxes.

use std::collections::BTreeMap;
use std::path::Path;

use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;
use tracing::{debug, warn};

use super::{BoxCxcywh, Detection, DetectorBackend, InferenceOutput, NameTable};

/// IoU above which two boxes of the same class are considered duplicates.
const IOU_THRESHOLD: f32 = 0.45;
/// Upper bound on detections kept per image after suppression.
const MAX_DETECTIONS: usize = 300;
/// Letterbox padding value, the conventional YOLO gray.
const PAD_VALUE: f32 = 114.0 / 255.0;

#[derive(Debug, Error)]
pub enum OnnxError {
    #[error("onnx runtime error: {0}")]
    Runtime(#[from] ort::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unexpected output shape {0:?}")]
    OutputShape(Vec<usize>),
}

/// Detection backend over an ONNX Runtime session.
pub struct OnnxDetector {
    session: Session,
    input_name: String,
    output_name: String,
    /// Model input size as (height, width).
    input_size: (usize, usize),
    model_names: Option<NameTable>,
    classes: Vec<String>,
}

impl DetectorBackend for OnnxDetector {
    type Error = OnnxError;

    fn load(artifact: &Path) -> Result<Self, Self::Error> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(artifact)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "images".to_string());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "output0".to_string());

        // The metadata handle borrows the session; keep it scoped so the
        // session can move into the struct below.
        let (model_names, input_size) = {
            let metadata = session.metadata()?;
            let model_names = metadata
                .custom("names")
                .ok()
                .flatten()
                .and_then(|raw| parse_names_literal(&raw))
                .map(NameTable::Map);
            let input_size = metadata
                .custom("imgsz")
                .ok()
                .flatten()
                .and_then(|raw| serde_json::from_str::<Vec<usize>>(&raw).ok())
                .and_then(|dims| match dims.as_slice() {
                    [h, w] => Some((*h, *w)),
                    [s] => Some((*s, *s)),
                    _ => None,
                })
                .unwrap_or((640, 640));
            (model_names, input_size)
        };

        debug!(
            model = %artifact.display(),
            input = %input_name,
            output = %output_name,
            input_size = ?input_size,
            "onnx session ready"
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            input_size,
            model_names,
            classes: Vec::new(),
        })
    }

    fn bind_classes(&mut self, names: &[String]) -> Result<(), Self::Error> {
        if let Some(NameTable::Map(table)) = &self.model_names {
            if !table.is_empty() && table.len() != names.len() {
                warn!(
                    embedded = table.len(),
                    configured = names.len(),
                    "model embeds a different class count than the configured prompts"
                );
            }
        }
        self.classes = names.to_vec();
        Ok(())
    }

    fn infer(
        &mut self,
        image: &Path,
        confidence: f32,
    ) -> Result<Option<InferenceOutput>, Self::Error> {
        let img = image::open(image)?;
        let rgb = img.to_rgb8();
        let (orig_w, orig_h) = (rgb.width(), rgb.height());
        let (input_h, input_w) = self.input_size;
        let letterbox = Letterbox::fit(orig_w, orig_h, input_w as u32, input_h as u32);

        let resized = image::imageops::resize(
            &rgb,
            letterbox.scaled_w,
            letterbox.scaled_h,
            FilterType::Triangle,
        );
        let mut input = Array4::<f32>::from_elem((1, 3, input_h, input_w), PAD_VALUE);
        for (x, y, pixel) in resized.enumerate_pixels() {
            let ix = x as usize + letterbox.pad_x as usize;
            let iy = y as usize + letterbox.pad_y as usize;
            for c in 0..3 {
                input[[0, c, iy, ix]] = f32::from(pixel.0[c]) / 255.0;
            }
        }

        // Read before `run`: the outputs keep the session mutably borrowed.
        let class_count = self.class_count();

        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])?;
        let output = match outputs.get(self.output_name.as_str()) {
            Some(output) => output,
            None => return Ok(None),
        };
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        let shape: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

        let detections = decode_output(
            &shape,
            data,
            class_count,
            confidence,
            &letterbox,
            orig_w,
            orig_h,
        )?;
        Ok(Some(InferenceOutput {
            detections,
            names: self.model_names.clone(),
        }))
    }

    fn names(&self) -> Option<&NameTable> {
        self.model_names.as_ref()
    }
}

impl OnnxDetector {
    /// Rows of the output read as class scores. Segmentation exports append
    /// mask coefficients after the class rows, so the bound vocabulary (or
    /// the embedded name table) decides how many rows are classes.
    fn class_count(&self) -> usize {
        if !self.classes.is_empty() {
            return self.classes.len();
        }
        match &self.model_names {
            Some(NameTable::Map(table)) => table.len(),
            Some(NameTable::List(names)) => names.len(),
            None => 0,
        }
    }
}

/// Letterbox geometry: uniform scale plus symmetric padding.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
    scaled_w: u32,
    scaled_h: u32,
}

impl Letterbox {
    fn fit(orig_w: u32, orig_h: u32, input_w: u32, input_h: u32) -> Self {
        let scale = f32::min(
            input_w as f32 / orig_w as f32,
            input_h as f32 / orig_h as f32,
        );
        let scaled_w = ((orig_w as f32 * scale).round() as u32).max(1).min(input_w);
        let scaled_h = ((orig_h as f32 * scale).round() as u32).max(1).min(input_h);
        Self {
            scale,
            pad_x: (input_w - scaled_w) / 2,
            pad_y: (input_h - scaled_h) / 2,
            scaled_w,
            scaled_h,
        }
    }

    /// Maps a center box from letterboxed pixel space back to the original
    /// image, normalized to `[0,1]`.
    fn unmap(&self, cx: f32, cy: f32, w: f32, h: f32, orig_w: u32, orig_h: u32) -> BoxCxcywh {
        let cx = (cx - self.pad_x as f32) / self.scale / orig_w as f32;
        let cy = (cy - self.pad_y as f32) / self.scale / orig_h as f32;
        let w = w / self.scale / orig_w as f32;
        let h = h / self.scale / orig_h as f32;
        BoxCxcywh::new(
            cx.clamp(0.0, 1.0),
            cy.clamp(0.0, 1.0),
            w.clamp(0.0, 1.0),
            h.clamp(0.0, 1.0),
        )
    }
}

/// Decodes a raw `[1, 4+nc(+extra), anchors]` output into detections above
/// the confidence threshold, suppressed class-wise.
fn decode_output(
    shape: &[usize],
    data: &[f32],
    num_classes: usize,
    confidence: f32,
    letterbox: &Letterbox,
    orig_w: u32,
    orig_h: u32,
) -> Result<Vec<Detection>, OnnxError> {
    let &[batch, rows, anchors] = shape else {
        return Err(OnnxError::OutputShape(shape.to_vec()));
    };
    if batch != 1 || rows < 5 || data.len() < rows * anchors {
        return Err(OnnxError::OutputShape(shape.to_vec()));
    }
    let class_rows = if num_classes > 0 {
        num_classes.min(rows - 4)
    } else {
        rows - 4
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = 0.0f32;
        for class in 0..class_rows {
            let score = data[(4 + class) * anchors + anchor];
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if best_score < confidence {
            continue;
        }

        let cx = data[anchor];
        let cy = data[anchors + anchor];
        let w = data[2 * anchors + anchor];
        let h = data[3 * anchors + anchor];
        let bbox = letterbox.unmap(cx, cy, w, h, orig_w, orig_h);
        if bbox.w <= 0.0 || bbox.h <= 0.0 {
            continue;
        }
        candidates.push(Detection::new(best_class, bbox, best_score));
    }

    Ok(non_max_suppression(candidates))
}

/// Class-wise non-maximum suppression, highest confidence first.
fn non_max_suppression(mut detections: Vec<Detection>) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        let duplicate = kept.iter().any(|existing| {
            existing.class_id == candidate.class_id
                && iou(existing.bbox, candidate.bbox) > IOU_THRESHOLD
        });
        if !duplicate {
            kept.push(candidate);
            if kept.len() >= MAX_DETECTIONS {
                break;
            }
        }
    }
    kept
}

fn iou(a: Option<BoxCxcywh>, b: Option<BoxCxcywh>) -> f32 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    let (ax1, ay1, ax2, ay2) = corners(a);
    let (bx1, by1, bx2, by2) = corners(b);

    let ix1 = ax1.max(bx1);
    let iy1 = ay1.max(by1);
    let ix2 = ax2.min(bx2);
    let iy2 = ay2.min(by2);
    let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);

    let union = a.w * a.h + b.w * b.h - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn corners(b: BoxCxcywh) -> (f32, f32, f32, f32) {
    (
        b.cx - b.w / 2.0,
        b.cy - b.h / 2.0,
        b.cx + b.w / 2.0,
        b.cy + b.h / 2.0,
    )
}

/// Parses the Ultralytics `names` metadata value, a Python dict literal
/// like `{0: 'person', 1: 'traffic light'}`.
fn parse_names_literal(raw: &str) -> Option<BTreeMap<usize, String>> {
    let inner = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut names = BTreeMap::new();
    let mut rest = inner.trim_start();

    while !rest.is_empty() {
        let colon = rest.find(':')?;
        let id: usize = rest[..colon].trim().parse().ok()?;
        rest = rest[colon + 1..].trim_start();

        let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
        let body = &rest[quote.len_utf8()..];
        let end = body.find(quote)?;
        names.insert(id, body[..end].to_string());

        rest = body[end + quote.len_utf8()..].trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    Some(names)
}

//! Single-shot face detector (MobileNet-SSD lineage) via ONNX Runtime.
//!
//! The model consumes a fixed square uint8 input and emits already-decoded,
//! score-sorted detections in normalized coordinates; no anchor decoding is
//! needed on this side. Used both as an ensemble member and as the
//! classifier's secondary detector.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use crate::backends::{BackendError, DetectorBackend};
use crate::config::SsdConfig;
use crate::normalize;
use crate::rect::Rect;
use crate::types::ImageView;

pub struct SsdDetector {
    session: Session,
    input_size: usize,
    score_threshold: f32,
    scores_idx: usize,
    boxes_idx: usize,
}

impl SsdDetector {
    pub fn load(model_path: &Path, config: &SsdConfig) -> Result<Self, BackendError> {
        if !model_path.exists() {
            return Err(BackendError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        // Standard TF object-detection export names, positional fallback
        // [num_detections, detection_scores, detection_boxes, ...].
        let scores_idx = names.iter().position(|n| n == "detection_scores").unwrap_or(1);
        let boxes_idx = names.iter().position(|n| n == "detection_boxes").unwrap_or(2);

        tracing::info!(
            path = %model_path.display(),
            input_size = config.input_size,
            outputs = ?names,
            "loaded single-shot detector"
        );

        Ok(Self {
            session,
            input_size: config.input_size,
            score_threshold: config.score_threshold,
            scores_idx,
            boxes_idx,
        })
    }
}

impl DetectorBackend for SsdDetector {
    fn detect(&mut self, image: &ImageView<'_>) -> Result<Vec<Rect>, BackendError> {
        let input = preprocess(image, self.input_size);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[self.scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| BackendError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[self.boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| BackendError::InferenceFailed(format!("boxes: {e}")))?;

        // Detections arrive sorted by score; only the top one matters here.
        let top = scores.first().copied().unwrap_or(0.0);
        if top <= self.score_threshold || boxes.len() < 4 {
            return Ok(Vec::new());
        }

        // Boxes are [y1, x1, y2, x2] normalized to the input; scale back to
        // the source image dimensions.
        let w = image.width as f32;
        let h = image.height as f32;
        let rect = Rect::new(
            (boxes[1] * w) as i32,
            (boxes[0] * h) as i32,
            (boxes[3] * w) as i32,
            (boxes[2] * h) as i32,
            top,
        );
        tracing::debug!(score = top, "single-shot detection");
        Ok(vec![rect])
    }
}

/// Fixed-size NHWC uint8 tensor. Single-channel input replicates into RGB.
fn preprocess(image: &ImageView<'_>, input_size: usize) -> Array4<u8> {
    let resized = if input_size >= image.width.max(image.height) {
        normalize::resize_bilinear(image, input_size, input_size)
    } else {
        normalize::resize_area(image, input_size, input_size)
    };

    let mut tensor = Array4::<u8>::zeros((1, input_size, input_size, 3));
    let view = resized.view();
    for y in 0..input_size {
        for x in 0..input_size {
            let off = view.offset(x, y);
            for c in 0..3 {
                tensor[[0, y, x, c]] = if view.channels >= 3 {
                    view.data[off + c]
                } else {
                    view.data[off]
                };
            }
        }
    }

    tensor
}

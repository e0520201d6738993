//! Anchor-regression face detector (SFD lineage) via ONNX Runtime.
//!
//! The network runs at the image's native resolution and emits one
//! (classification, regression) tensor pair per pyramid level. Levels are
//! decoded against their anchor lattice and merged through NMS.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use crate::anchors::{self, AnchorGrid, DecodeParams};
use crate::backends::{BackendError, DetectorBackend};
use crate::config::DetectorConfig;
use crate::rect::Rect;
use crate::types::ImageView;

/// Per-channel training means, BGR order.
const SFD_MEANS: [f32; 3] = [104.0, 117.0, 123.0];
/// Stride of the first pyramid level; each level doubles it.
const SFD_BASE_STRIDE: usize = 4;

pub struct SfdDetector {
    session: Session,
    config: DetectorConfig,
}

impl SfdDetector {
    pub fn load(model_path: &Path, config: DetectorConfig) -> Result<Self, BackendError> {
        if !model_path.exists() {
            return Err(BackendError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded anchor-regression detector"
        );

        Ok(Self { session, config })
    }
}

impl DetectorBackend for SfdDetector {
    fn detect(&mut self, image: &ImageView<'_>) -> Result<Vec<Rect>, BackendError> {
        let input = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let levels = outputs.len() / 2;
        let params = DecodeParams {
            variances: self.config.variances,
            score_threshold: self.config.score_threshold,
        };

        let mut candidates = Vec::new();
        for level in 0..levels {
            let (cls_shape, cls) = outputs[level * 2]
                .try_extract_tensor::<f32>()
                .map_err(|e| BackendError::InferenceFailed(format!("cls level {level}: {e}")))?;
            let (_, reg) = outputs[level * 2 + 1]
                .try_extract_tensor::<f32>()
                .map_err(|e| BackendError::InferenceFailed(format!("reg level {level}: {e}")))?;

            // cls is [1, 2, rows, cols]: background/foreground logits.
            let rows = cls_shape[2] as usize;
            let cols = cls_shape[3] as usize;
            let grid = AnchorGrid {
                stride: SFD_BASE_STRIDE << level,
                cols,
                rows,
                scale: self.config.anchor_scale,
            };

            let (scores, offsets) = flatten_level(cls, reg, rows * cols);
            candidates.extend(anchors::decode(&scores, &offsets, &grid, &params));
        }

        let kept = anchors::nms(candidates, self.config.nms_iou);
        tracing::debug!(candidates = kept.len(), "detection complete");
        Ok(kept)
    }
}

/// NCHW float tensor at native resolution with per-channel mean
/// subtraction. Single-channel input replicates into all three planes.
fn preprocess(image: &ImageView<'_>) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, image.height, image.width));

    for y in 0..image.height {
        for x in 0..image.width {
            let off = image.offset(x, y);
            for c in 0..3 {
                let p = if image.channels >= 3 {
                    image.data[off + c]
                } else {
                    image.data[off]
                } as f32;
                tensor[[0, c, y, x]] = p - SFD_MEANS[c];
            }
        }
    }

    tensor
}

/// Softmax the two class planes into per-anchor foreground scores and
/// regroup the regression planes into `[dx, dy, dw, dh]` per anchor.
fn flatten_level(cls: &[f32], reg: &[f32], plane: usize) -> (Vec<f32>, Vec<f32>) {
    let mut scores = Vec::with_capacity(plane);
    for i in 0..plane {
        let bg = cls.get(i).copied().unwrap_or(0.0);
        let fg = cls.get(plane + i).copied().unwrap_or(0.0);
        let m = bg.max(fg);
        let e0 = (bg - m).exp();
        let e1 = (fg - m).exp();
        scores.push(e1 / (e0 + e1));
    }

    let mut offsets = vec![0.0f32; plane * 4];
    for c in 0..4 {
        for i in 0..plane {
            offsets[i * 4 + c] = reg.get(c * plane + i).copied().unwrap_or(0.0);
        }
    }

    (scores, offsets)
}

//! Face embedding extraction (SphereFace lineage) via ONNX Runtime.
//!
//! Consumes the normalized recognition crop and returns the raw 512-float
//! forward-pass output. Normalization and pooling happen downstream; the
//! raw magnitude carries quality signal the classifier depends on.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use crate::backends::{BackendError, EmbeddingBackend};
use crate::config::{ColorOrder, RecognitionConfig};
use crate::normalize;
use crate::types::{Embedding, Pixmap, EMBEDDING_DIM};

pub struct SphereFaceEmbedder {
    session: Session,
    config: RecognitionConfig,
}

impl SphereFaceEmbedder {
    pub fn load(model_path: &Path, config: RecognitionConfig) -> Result<Self, BackendError> {
        if !model_path.exists() {
            return Err(BackendError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            input_size = config.input_size,
            color = ?config.color,
            "loaded embedding network"
        );

        Ok(Self { session, config })
    }
}

impl EmbeddingBackend for SphereFaceEmbedder {
    fn embed(&mut self, crop: &Pixmap) -> Result<Embedding, BackendError> {
        let input = preprocess(crop, &self.config);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| BackendError::InferenceFailed(format!("embedding head: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(BackendError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding { values: raw.to_vec() })
    }
}

/// Planar float tensor in the network's channel order and numeric range
/// (`p * pixel_scale + pixel_shift`).
fn preprocess(crop: &Pixmap, config: &RecognitionConfig) -> Array4<f32> {
    let size = config.input_size;
    let map = |p: u8| p as f32 * config.pixel_scale + config.pixel_shift;

    if config.color == ColorOrder::Gray {
        let gray = normalize::to_grayscale(&crop.view());
        let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
        for y in 0..size {
            for x in 0..size {
                tensor[[0, 0, y, x]] = map(gray.data[y * size + x]);
            }
        }
        return tensor;
    }

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let view = crop.view();
    for y in 0..size {
        for x in 0..size {
            let off = view.offset(x, y);
            for plane in 0..3 {
                // Crops arrive RGB; remap the plane order for BGR networks.
                let src = if config.color == ColorOrder::Bgr { 2 - plane } else { plane };
                let p = if view.channels >= 3 {
                    view.data[off + src]
                } else {
                    view.data[off]
                };
                tensor[[0, plane, y, x]] = map(p);
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop_with_pixel(r: u8, g: u8, b: u8, size: usize) -> Pixmap {
        let mut p = Pixmap::zeroed(size, size, 3);
        for px in p.data.chunks_exact_mut(3) {
            px.copy_from_slice(&[r, g, b]);
        }
        p
    }

    #[test]
    fn preprocess_maps_pixel_range() {
        let config = RecognitionConfig { input_size: 4, ..Default::default() };
        let crop = crop_with_pixel(255, 255, 255, 4);
        let tensor = preprocess(&crop, &config);
        // 255/255 - 0.5 = 0.5
        assert!((tensor[[0, 0, 0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn preprocess_bgr_swaps_planes() {
        let config = RecognitionConfig {
            input_size: 2,
            color: ColorOrder::Bgr,
            pixel_scale: 1.0,
            pixel_shift: 0.0,
            ..Default::default()
        };
        let crop = crop_with_pixel(10, 20, 30, 2);
        let tensor = preprocess(&crop, &config);
        assert!((tensor[[0, 0, 0, 0]] - 30.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - 20.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn preprocess_gray_is_single_plane() {
        let config = RecognitionConfig {
            input_size: 2,
            color: ColorOrder::Gray,
            ..Default::default()
        };
        let crop = crop_with_pixel(100, 100, 100, 2);
        let tensor = preprocess(&crop, &config);
        assert_eq!(tensor.shape(), &[1, 1, 2, 2]);
    }
}

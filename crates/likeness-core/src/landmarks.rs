//! Landmark localization and canvas-to-image coordinate projection.
//!
//! The landmark network sees the square, zero-padded face crop at a fixed
//! resolution. Its raw output lives in canvas space; `project_point` maps a
//! canvas coordinate back through the crop geometry into original-image
//! space, exactly inverting the crop-and-resize — including the zero-padded
//! borders, which is why the unclamped crop region is used.

use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use crate::backends::{BackendError, LandmarkBackend};
use crate::config::LandmarkConfig;
use crate::normalize;
use crate::rect::{CropRegion, Rect};
use crate::types::{ImageView, Landmarks};

/// The regression head emits this many points; x values first, then y.
const RAW_POINTS: usize = 43;
/// Eye centers are the mean of four contour points each.
const LEFT_EYE_IDX: [usize; 4] = [26, 27, 29, 30];
const RIGHT_EYE_IDX: [usize; 4] = [20, 21, 23, 24];
const NOSE_IDX: usize = 13;
const LEFT_MOUTH_IDX: usize = 37;
const RIGHT_MOUTH_IDX: usize = 31;

/// Map a canvas-space coordinate in `[0, input_size)` back to image space
/// through the crop region the canvas was built from.
pub fn project_point(canvas: (f32, f32), region: &CropRegion, input_size: usize) -> (i32, i32) {
    let sx = region.canvas_w as f32 / input_size as f32;
    let sy = region.canvas_h as f32 / input_size as f32;
    (
        (canvas.0 * sx + region.x_begin as f32) as i32,
        (canvas.1 * sy + region.y_begin as f32) as i32,
    )
}

pub struct DnetLandmarker {
    session: Session,
    input_size: usize,
}

impl DnetLandmarker {
    pub fn load(model_path: &Path, config: &LandmarkConfig) -> Result<Self, BackendError> {
        if !model_path.exists() {
            return Err(BackendError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            input_size = config.input_size,
            "loaded landmark regressor"
        );

        Ok(Self {
            session,
            input_size: config.input_size,
        })
    }
}

impl LandmarkBackend for DnetLandmarker {
    fn detect(
        &mut self,
        image: &ImageView<'_>,
        face: &Rect,
    ) -> Result<Option<Landmarks>, BackendError> {
        let (crop, region) = normalize::square_crop(image, face, self.input_size);
        let input = preprocess(&crop.view(), self.input_size);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| BackendError::InferenceFailed(format!("landmark head: {e}")))?;

        if raw.len() < RAW_POINTS * 2 {
            tracing::warn!(len = raw.len(), "landmark output too short");
            return Ok(None);
        }

        Ok(Some(derive_landmarks(raw, &region, self.input_size)))
    }
}

/// Grayscale NCHW tensor normalized as `(p - 127.5) / 128`.
fn preprocess(crop: &ImageView<'_>, input_size: usize) -> Array4<f32> {
    let gray = normalize::to_grayscale(crop);
    let mut tensor = Array4::<f32>::zeros((1, 1, input_size, input_size));
    for y in 0..input_size {
        for x in 0..input_size {
            tensor[[0, 0, y, x]] = (gray.data[y * input_size + x] as f32 - 127.5) * 0.0078125;
        }
    }
    tensor
}

/// Reduce the dense point set to the five canonical landmarks and project
/// them into image space. Raw values are normalized to `[0, 1]` over the
/// crop canvas.
fn derive_landmarks(raw: &[f32], region: &CropRegion, input_size: usize) -> Landmarks {
    let px = |i: usize| raw[i];
    let py = |i: usize| raw[i + RAW_POINTS];
    let eye = |idx: &[usize; 4]| {
        (
            idx.iter().map(|&i| px(i)).sum::<f32>() / 4.0,
            idx.iter().map(|&i| py(i)).sum::<f32>() / 4.0,
        )
    };

    let normalized = [
        eye(&LEFT_EYE_IDX),
        eye(&RIGHT_EYE_IDX),
        (px(NOSE_IDX), py(NOSE_IDX)),
        (px(LEFT_MOUTH_IDX), py(LEFT_MOUTH_IDX)),
        (px(RIGHT_MOUTH_IDX), py(RIGHT_MOUTH_IDX)),
    ];

    let mut points = [(0i32, 0i32); 5];
    for (out, (nx, ny)) in points.iter_mut().zip(normalized) {
        let canvas = (nx * input_size as f32, ny * input_size as f32);
        *out = project_point(canvas, region, input_size);
    }

    Landmarks { points }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_inverts_crop_for_inner_box() {
        let face = Rect::new(40, 60, 140, 120, 0.9).to_square();
        let region = CropRegion::cover(&face, 400, 400);
        let input_size = 48usize;

        // A known image point inside the crop, mapped to canvas space the
        // way the crop-and-resize does it, must project back within 1 px.
        let image_pt = (75.0f32, 90.0f32);
        let canvas = (
            (image_pt.0 - region.x_begin as f32) * input_size as f32 / region.canvas_w as f32,
            (image_pt.1 - region.y_begin as f32) * input_size as f32 / region.canvas_h as f32,
        );
        let (rx, ry) = project_point(canvas, &region, input_size);
        assert!((rx - image_pt.0 as i32).abs() <= 1, "x: {rx}");
        assert!((ry - image_pt.1 as i32).abs() <= 1, "y: {ry}");
    }

    #[test]
    fn projection_inverts_crop_with_padding() {
        // Crop hanging off the top-left corner: padded canvas, negative
        // region origin. Projection must still recover the image point.
        let face = Rect::new(-30, -30, 70, 70, 0.9).to_square();
        let region = CropRegion::cover(&face, 200, 200);
        let input_size = 48usize;

        let image_pt = (10.0f32, 25.0f32);
        let canvas = (
            (image_pt.0 - region.x_begin as f32) * input_size as f32 / region.canvas_w as f32,
            (image_pt.1 - region.y_begin as f32) * input_size as f32 / region.canvas_h as f32,
        );
        let (rx, ry) = project_point(canvas, &region, input_size);
        assert!((rx - 10).abs() <= 1);
        assert!((ry - 25).abs() <= 1);
    }

    #[test]
    fn derive_landmarks_groups_and_order() {
        // Synthetic raw output: every point at normalized (0.5, 0.25)
        // except the nose at (0.75, 0.75).
        let mut raw = vec![0.5f32; RAW_POINTS * 2];
        for y in raw.iter_mut().skip(RAW_POINTS) {
            *y = 0.25;
        }
        raw[NOSE_IDX] = 0.75;
        raw[NOSE_IDX + RAW_POINTS] = 0.75;

        let square = Rect::new(0, 0, 95, 95, 1.0);
        let region = CropRegion::cover(&square, 200, 200);
        let lms = derive_landmarks(&raw, &region, 48);

        // Canvas is 96 px wide: 0.5 -> 48, 0.25 -> 24, 0.75 -> 72.
        assert_eq!(lms.left_eye(), (48, 24));
        assert_eq!(lms.right_eye(), (48, 24));
        assert_eq!(lms.nose(), (72, 72));
    }

    #[test]
    fn preprocess_centers_pixel_range() {
        let data = vec![128u8; 48 * 48];
        let image = ImageView::new(48, 48, 1, &data);
        let tensor = preprocess(&image, 48);
        assert_eq!(tensor.shape(), &[1, 1, 48, 48]);
        let expected = (128.0 - 127.5) * 0.0078125;
        assert!((tensor[[0, 0, 10, 10]] - expected).abs() < 1e-6);
    }
}

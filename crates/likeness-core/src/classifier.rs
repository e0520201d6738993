//! Multi-signal face-quality gate.
//!
//! Four checks run in a fixed order, cheapest first, short-circuiting at
//! the first failure; the secondary-detector pass at the end is the only
//! one that costs an inference.

use crate::backends::{BackendError, DetectorBackend};
use crate::config::ClassifierConfig;
use crate::rect::Rect;
use crate::types::{Embedding, Landmarks, Pixmap, Verdict};

pub struct FaceClassifier {
    secondary: Box<dyn DetectorBackend>,
    config: ClassifierConfig,
}

impl FaceClassifier {
    pub fn new(secondary: Box<dyn DetectorBackend>, config: ClassifierConfig) -> Self {
        Self { secondary, config }
    }

    /// Accept or reject one detected face. `crop` is the normalized
    /// recognition crop the embedding was computed from; `face` the
    /// originally detected box; `embedding` the raw (pre-normalization)
    /// output of the embedding backend.
    pub fn classify(
        &mut self,
        crop: &Pixmap,
        face: &Rect,
        landmarks: &Landmarks,
        embedding: &Embedding,
    ) -> Result<Verdict, BackendError> {
        let norm = embedding.l2_norm();
        if norm < self.config.min_embedding_norm {
            tracing::debug!(norm, "rejected: embedding norm below minimum");
            return Ok(Verdict::LowNorm);
        }

        let spread = landmarks.bounding_rect();
        let scale = spread.width().max(spread.height());
        if scale < self.config.min_face_scale {
            tracing::debug!(scale, "rejected: landmark spread too small");
            return Ok(Verdict::SmallScale);
        }

        let landmark_iou = spread.iou(face);
        if landmark_iou < self.config.min_landmark_iou {
            tracing::debug!(landmark_iou, "rejected: landmarks disagree with face box");
            return Ok(Verdict::LowLandmarkIoU);
        }

        let rects = self.secondary.detect(&crop.view())?;
        let Some(found) = rects.first() else {
            tracing::debug!("rejected: secondary detector found no face in crop");
            return Ok(Verdict::NoSecondaryFace);
        };

        // Reference box covering the crop canvas; a well-framed face should
        // be re-detected roughly at full-canvas extent.
        let reference = Rect::new(0, 0, crop.width as i32 - 1, crop.height as i32 - 1, 1.0);
        let face_iou = found.iou(&reference);
        if face_iou < self.config.min_face_iou {
            tracing::debug!(face_iou, "rejected: secondary detection off-center");
            return Ok(Verdict::LowFaceIoU);
        }

        Ok(Verdict::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DetectorBackend;
    use crate::types::{ImageView, EMBEDDING_DIM};

    struct Fixed(Vec<Rect>);

    impl DetectorBackend for Fixed {
        fn detect(&mut self, _image: &ImageView<'_>) -> Result<Vec<Rect>, BackendError> {
            Ok(self.0.clone())
        }
    }

    fn embedding(norm: f32) -> Embedding {
        let mut values = vec![0.0f32; EMBEDDING_DIM];
        values[0] = norm;
        Embedding { values }
    }

    fn good_landmarks() -> Landmarks {
        // 50x50 spread within the face box below.
        Landmarks {
            points: [(30, 30), (80, 30), (55, 55), (35, 80), (75, 80)],
        }
    }

    fn face_box() -> Rect {
        Rect::new(10, 10, 110, 110, 0.95)
    }

    fn crop() -> Pixmap {
        Pixmap::zeroed(128, 128, 3)
    }

    fn full_canvas_hit() -> Vec<Rect> {
        vec![Rect::new(4, 4, 123, 123, 0.9)]
    }

    fn classifier(rects: Vec<Rect>) -> FaceClassifier {
        FaceClassifier::new(Box::new(Fixed(rects)), ClassifierConfig::default())
    }

    #[test]
    fn all_gates_pass() {
        let mut c = classifier(full_canvas_hit());
        let verdict = c
            .classify(&crop(), &face_box(), &good_landmarks(), &embedding(25.0))
            .unwrap();
        assert_eq!(verdict, Verdict::Pass);
    }

    #[test]
    fn low_norm_fails_first() {
        // Even with an empty secondary detector, the norm gate fires first.
        let mut c = classifier(vec![]);
        let verdict = c
            .classify(&crop(), &face_box(), &good_landmarks(), &embedding(19.0))
            .unwrap();
        assert_eq!(verdict, Verdict::LowNorm);
    }

    #[test]
    fn norm_gate_is_monotonic_at_threshold() {
        let mut c = classifier(full_canvas_hit());
        let at = c
            .classify(&crop(), &face_box(), &good_landmarks(), &embedding(20.0))
            .unwrap();
        assert_eq!(at, Verdict::Pass);
        let below = c
            .classify(&crop(), &face_box(), &good_landmarks(), &embedding(19.99))
            .unwrap();
        assert_eq!(below, Verdict::LowNorm);
    }

    #[test]
    fn small_landmark_spread_fails() {
        let tiny = Landmarks {
            points: [(50, 50), (52, 50), (51, 51), (50, 52), (52, 52)],
        };
        let mut c = classifier(full_canvas_hit());
        let verdict = c
            .classify(&crop(), &face_box(), &tiny, &embedding(25.0))
            .unwrap();
        assert_eq!(verdict, Verdict::SmallScale);
    }

    #[test]
    fn disjoint_landmarks_fail_iou_gate() {
        // Big spread but nowhere near the face box.
        let elsewhere = Landmarks {
            points: [(300, 300), (360, 300), (330, 330), (305, 360), (355, 360)],
        };
        let mut c = classifier(full_canvas_hit());
        let verdict = c
            .classify(&crop(), &face_box(), &elsewhere, &embedding(25.0))
            .unwrap();
        assert_eq!(verdict, Verdict::LowLandmarkIoU);
    }

    #[test]
    fn missing_secondary_face_fails() {
        let mut c = classifier(vec![]);
        let verdict = c
            .classify(&crop(), &face_box(), &good_landmarks(), &embedding(25.0))
            .unwrap();
        assert_eq!(verdict, Verdict::NoSecondaryFace);
    }

    #[test]
    fn off_center_secondary_face_fails() {
        // Tiny detection in a corner of the 128x128 crop.
        let mut c = classifier(vec![Rect::new(0, 0, 20, 20, 0.8)]);
        let verdict = c
            .classify(&crop(), &face_box(), &good_landmarks(), &embedding(25.0))
            .unwrap();
        assert_eq!(verdict, Verdict::LowFaceIoU);
    }
}

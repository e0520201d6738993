//! Data model shared across the pipeline stages.

use serde::{Deserialize, Serialize};

use crate::rect::Rect;

/// Length of a face embedding vector.
pub const EMBEDDING_DIM: usize = 512;

/// Byte length of an encoded template: 512 little-endian f32 values.
pub const TEMPLATE_BYTES: usize = EMBEDDING_DIM * 4;

/// Borrowed, read-only view of a caller-owned interleaved image buffer.
///
/// Row-major, `channels` interleaved bytes per pixel. The pipeline only
/// reads from it; crops are copied into new [`Pixmap`]s.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: &'a [u8],
}

impl<'a> ImageView<'a> {
    pub fn new(width: usize, height: usize, channels: usize, data: &'a [u8]) -> Self {
        debug_assert_eq!(data.len(), width * height * channels);
        Self { width, height, channels, data }
    }

    /// Byte offset of pixel (x, y).
    pub fn offset(&self, x: usize, y: usize) -> usize {
        (y * self.width + x) * self.channels
    }
}

/// Owned pixel buffer produced by cropping or resampling.
#[derive(Debug, Clone)]
pub struct Pixmap {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl Pixmap {
    pub fn zeroed(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0u8; width * height * channels],
        }
    }

    pub fn view(&self) -> ImageView<'_> {
        ImageView::new(self.width, self.height, self.channels, &self.data)
    }
}

/// Five facial landmarks in image space, in fixed order:
/// left eye, right eye, nose, left mouth corner, right mouth corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Landmarks {
    pub points: [(i32, i32); 5],
}

impl Landmarks {
    pub fn left_eye(&self) -> (i32, i32) {
        self.points[0]
    }

    pub fn right_eye(&self) -> (i32, i32) {
        self.points[1]
    }

    pub fn nose(&self) -> (i32, i32) {
        self.points[2]
    }

    /// Axis-aligned bounding box of the five points.
    pub fn bounding_rect(&self) -> Rect {
        let mut x1 = i32::MAX;
        let mut y1 = i32::MAX;
        let mut x2 = i32::MIN;
        let mut y2 = i32::MIN;
        for &(x, y) in &self.points {
            x1 = x1.min(x);
            y1 = y1.min(y);
            x2 = x2.max(x);
            y2 = y2.max(y);
        }
        Rect::new(x1, y1, x2, y2, 1.0)
    }
}

/// Raw (un-normalized) face embedding as produced by the embedding backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn l2_norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

/// Eye positions in the original image coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EyePair {
    pub left_x: i32,
    pub left_y: i32,
    pub right_x: i32,
    pub right_y: i32,
}

impl From<&Landmarks> for EyePair {
    fn from(lms: &Landmarks) -> Self {
        let (left_x, left_y) = lms.left_eye();
        let (right_x, right_y) = lms.right_eye();
        Self { left_x, left_y, right_x, right_y }
    }
}

/// Purpose of a template; logged but does not change processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateRole {
    Enrollment,
    Verification,
}

/// Outcome of the face-quality classifier. Anything but `Pass` names the
/// first gate that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    LowNorm,
    SmallScale,
    LowLandmarkIoU,
    NoSecondaryFace,
    LowFaceIoU,
}

/// Why an input image contributed nothing to the template. Per-image and
/// recoverable: the image is skipped and processing continues.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    NoFace,
    NoLandmarks,
    Rejected(Verdict),
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landmark_bounding_rect_spans_all_points() {
        let lms = Landmarks {
            points: [(30, 40), (70, 38), (50, 60), (35, 80), (65, 82)],
        };
        let r = lms.bounding_rect();
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (30, 38, 70, 82));
    }

    #[test]
    fn eye_pair_takes_first_two_points() {
        let lms = Landmarks {
            points: [(30, 40), (70, 38), (50, 60), (35, 80), (65, 82)],
        };
        let eyes = EyePair::from(&lms);
        assert_eq!((eyes.left_x, eyes.left_y), (30, 40));
        assert_eq!((eyes.right_x, eyes.right_y), (70, 38));
    }

    #[test]
    fn embedding_norm() {
        let e = Embedding { values: vec![3.0, 4.0] };
        assert!((e.l2_norm() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn pixmap_view_roundtrip() {
        let p = Pixmap::zeroed(4, 3, 3);
        let v = p.view();
        assert_eq!(v.offset(1, 2), (2 * 4 + 1) * 3);
        assert_eq!(v.data.len(), 4 * 3 * 3);
    }
}

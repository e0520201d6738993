//! Anchor-box decoding and non-max suppression for detectors that emit raw
//! per-anchor classification and regression maps.

use crate::rect::Rect;

/// Anchor lattice at one detector output stride. Anchor centers sit at
/// `stride / 2 + cell * stride`; every anchor has side `stride * scale`.
#[derive(Debug, Clone, Copy)]
pub struct AnchorGrid {
    pub stride: usize,
    pub cols: usize,
    pub rows: usize,
    pub scale: f32,
}

impl AnchorGrid {
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn center(&self, index: usize) -> (f32, f32) {
        let row = index / self.cols;
        let col = index % self.cols;
        let half = self.stride as f32 * 0.5;
        (
            half + (col * self.stride) as f32,
            half + (row * self.stride) as f32,
        )
    }

    fn anchor_size(&self) -> f32 {
        self.stride as f32 * self.scale
    }
}

/// Variance scales and acceptance threshold for one backend generation.
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    /// `variances[0]` scales the center offset, `variances[1]` the log-size.
    pub variances: [f32; 2],
    pub score_threshold: f32,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            variances: [0.1, 0.2],
            score_threshold: 0.5,
        }
    }
}

/// Decode per-anchor foreground scores and box regressions into scored
/// corner boxes. `offsets` holds `[dx, dy, dw, dh]` per anchor, row-major
/// over the grid. Anchors at or below the score threshold are dropped; an
/// empty result is a valid outcome, not an error.
pub fn decode(scores: &[f32], offsets: &[f32], grid: &AnchorGrid, params: &DecodeParams) -> Vec<Rect> {
    let mut rects = Vec::new();

    for idx in 0..grid.len() {
        let score = match scores.get(idx) {
            Some(&s) if s > params.score_threshold => s,
            _ => continue,
        };

        let off = idx * 4;
        if off + 3 >= offsets.len() {
            break;
        }

        let (acx, acy) = grid.center(idx);
        let a = grid.anchor_size();

        let cx = acx + offsets[off] * params.variances[0] * a;
        let cy = acy + offsets[off + 1] * params.variances[0] * a;
        let w = a * (offsets[off + 2] * params.variances[1]).exp();
        let h = a * (offsets[off + 3] * params.variances[1]).exp();

        let x1 = cx - w * 0.5;
        let y1 = cy - h * 0.5;
        rects.push(Rect::new(
            x1 as i32,
            y1 as i32,
            (x1 + w) as i32,
            (y1 + h) as i32,
            score,
        ));
    }

    rects
}

/// Greedy non-max suppression. Candidates are stably sorted by score
/// descending (ties keep their original order), then each survivor
/// suppresses every remaining box overlapping it by more than
/// `iou_threshold`.
pub fn nms(mut candidates: Vec<Rect>, iou_threshold: f32) -> Vec<Rect> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(candidates[i]);

        for j in (i + 1)..candidates.len() {
            if !suppressed[j] && candidates[i].iou(&candidates[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

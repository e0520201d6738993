//! Ordered detector ensemble.
//!
//! Only the single best box per image ever propagates downstream; images
//! with several faces are treated as single-face inputs where the first
//! detection wins.

use serde::Deserialize;

use crate::backends::{BackendError, DetectorBackend};
use crate::rect::Rect;
use crate::types::ImageView;

/// How the ensemble combines its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnsemblePolicy {
    /// Try members in order, return the first member's top box.
    FirstHit,
    /// Query every member and average the coordinates of each member's top
    /// box component-wise.
    Average,
}

pub struct DetectorEnsemble {
    detectors: Vec<Box<dyn DetectorBackend>>,
    policy: EnsemblePolicy,
}

impl DetectorEnsemble {
    pub fn new(detectors: Vec<Box<dyn DetectorBackend>>, policy: EnsemblePolicy) -> Self {
        Self { detectors, policy }
    }

    /// Best face box for the image, or `None` when no member finds one.
    /// An empty member list is also `None`, not an error.
    pub fn detect_best(&mut self, image: &ImageView<'_>) -> Result<Option<Rect>, BackendError> {
        match self.policy {
            EnsemblePolicy::FirstHit => self.first_hit(image),
            EnsemblePolicy::Average => self.average(image),
        }
    }

    fn first_hit(&mut self, image: &ImageView<'_>) -> Result<Option<Rect>, BackendError> {
        for (i, detector) in self.detectors.iter_mut().enumerate() {
            let rects = detector.detect(image)?;
            if let Some(best) = rects.first() {
                tracing::debug!(member = i, score = best.score, "ensemble hit");
                return Ok(Some(*best));
            }
        }
        Ok(None)
    }

    fn average(&mut self, image: &ImageView<'_>) -> Result<Option<Rect>, BackendError> {
        let mut tops: Vec<Rect> = Vec::new();
        for detector in self.detectors.iter_mut() {
            let rects = detector.detect(image)?;
            if let Some(best) = rects.first() {
                tops.push(*best);
            }
        }

        if tops.is_empty() {
            return Ok(None);
        }

        let n = tops.len() as i64;
        let sum = |f: fn(&Rect) -> i32| tops.iter().map(|r| f(r) as i64).sum::<i64>();
        let averaged = Rect::new(
            (sum(|r| r.x1) / n) as i32,
            (sum(|r| r.y1) / n) as i32,
            (sum(|r| r.x2) / n) as i32,
            (sum(|r| r.y2) / n) as i32,
            tops.iter().map(|r| r.score).sum::<f32>() / tops.len() as f32,
        );
        tracing::debug!(members = tops.len(), score = averaged.score, "ensemble average");
        Ok(Some(averaged))
    }
}

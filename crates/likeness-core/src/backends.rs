//! Capability seams for the three model stages.
//!
//! Each stage is a narrow trait with a small closed set of implementations
//! selected at construction time via configuration. Detection backends
//! return boxes already decoded and suppression-filtered; landmark backends
//! return five image-space points; embedding backends return the raw
//! forward-pass output.

use thiserror::Error;

use crate::rect::Rect;
use crate::types::{Embedding, ImageView, Landmarks, Pixmap};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face detection over a full input image. Zero boxes is a valid outcome.
/// Returned boxes are sorted by score descending.
pub trait DetectorBackend {
    fn detect(&mut self, image: &ImageView<'_>) -> Result<Vec<Rect>, BackendError>;
}

/// Five-point landmark localization for one detected face.
/// `Ok(None)` reports a landmarking failure on an otherwise healthy backend.
pub trait LandmarkBackend {
    fn detect(
        &mut self,
        image: &ImageView<'_>,
        face: &Rect,
    ) -> Result<Option<Landmarks>, BackendError>;
}

/// Embedding extraction from a normalized recognition crop.
pub trait EmbeddingBackend {
    fn embed(&mut self, crop: &Pixmap) -> Result<Embedding, BackendError>;
}

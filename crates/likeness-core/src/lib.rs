//! likeness-core — face template creation and 1:1 matching.
//!
//! Pipeline: detect a face, locate five landmarks, gate on quality,
//! normalize the face region, embed, and pool per-image embeddings into a
//! single fixed-length template. Model execution sits behind narrow
//! backend traits running via ONNX Runtime; this crate owns the
//! orchestration and geometry between the models.

pub mod anchors;
pub mod backends;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod embedder;
pub mod ensemble;
pub mod landmarks;
pub mod normalize;
pub mod pipeline;
pub mod rect;
pub mod ssd;
pub mod template;
pub mod types;

pub use pipeline::{PipelineError, TemplatePipeline, TemplateRecord};
pub use rect::Rect;
pub use types::{
    Embedding, EyePair, ImageView, Landmarks, Pixmap, RejectionReason, TemplateRole, Verdict,
};

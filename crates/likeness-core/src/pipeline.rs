//! Template creation and matching, the host-facing surface of the crate.
//!
//! Processing is synchronous and strictly sequential per image. A failure
//! on one image is a value, not an unwind: the image is skipped and the
//! remaining ones still contribute.

use std::path::Path;

use thiserror::Error;

use crate::backends::{BackendError, DetectorBackend, EmbeddingBackend, LandmarkBackend};
use crate::classifier::FaceClassifier;
use crate::config::{ConfigError, PipelineConfig, RecognitionConfig};
use crate::detector::SfdDetector;
use crate::embedder::SphereFaceEmbedder;
use crate::ensemble::DetectorEnsemble;
use crate::landmarks::DnetLandmarker;
use crate::normalize;
use crate::ssd::SsdDetector;
use crate::template::{self, TemplateError};
use crate::types::{Embedding, EyePair, ImageView, RejectionReason, TemplateRole, Verdict};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("backend initialization: {0}")]
    Backend(#[from] BackendError),
}

/// Result of one template-creation call. `eyes` has one entry per accepted
/// image; an empty list marks the zero-sentinel template.
#[derive(Debug, Clone)]
pub struct TemplateRecord {
    pub template: Vec<u8>,
    pub eyes: Vec<EyePair>,
}

impl TemplateRecord {
    pub fn has_face(&self) -> bool {
        !self.eyes.is_empty()
    }
}

pub struct TemplatePipeline {
    ensemble: DetectorEnsemble,
    landmarker: Box<dyn LandmarkBackend>,
    embedder: Box<dyn EmbeddingBackend>,
    classifier: FaceClassifier,
    recognition: RecognitionConfig,
}

impl TemplatePipeline {
    /// Construct every backend from model files under `config_dir`, reading
    /// an optional `likeness.toml` alongside them. Any failure here is
    /// fatal to subsequent calls; nothing is retried.
    pub fn initialize(config_dir: &Path) -> Result<Self, PipelineError> {
        let config = PipelineConfig::load(config_dir)?;

        let mut detectors: Vec<Box<dyn DetectorBackend>> = vec![Box::new(SfdDetector::load(
            &config_dir.join(&config.detector.model),
            config.detector.clone(),
        )?)];
        for fallback in &config.ensemble.fallbacks {
            detectors.push(Box::new(SsdDetector::load(
                &config_dir.join(&fallback.model),
                fallback,
            )?));
        }
        let ensemble = DetectorEnsemble::new(detectors, config.ensemble.policy);

        let landmarker = DnetLandmarker::load(
            &config_dir.join(&config.landmarks.model),
            &config.landmarks,
        )?;
        let embedder = SphereFaceEmbedder::load(
            &config_dir.join(&config.recognition.model),
            config.recognition.clone(),
        )?;
        let secondary = SsdDetector::load(
            &config_dir.join(&config.classifier.secondary.model),
            &config.classifier.secondary,
        )?;
        let classifier = FaceClassifier::new(Box::new(secondary), config.classifier.clone());

        tracing::info!(config_dir = %config_dir.display(), "pipeline initialized");

        Ok(Self::from_parts(
            ensemble,
            Box::new(landmarker),
            Box::new(embedder),
            classifier,
            config.recognition,
        ))
    }

    /// Assemble from explicit parts. Backends sit behind traits, so hosts
    /// and tests can substitute their own implementations.
    pub fn from_parts(
        ensemble: DetectorEnsemble,
        landmarker: Box<dyn LandmarkBackend>,
        embedder: Box<dyn EmbeddingBackend>,
        classifier: FaceClassifier,
        recognition: RecognitionConfig,
    ) -> Self {
        Self {
            ensemble,
            landmarker,
            embedder,
            classifier,
            recognition,
        }
    }

    /// Build one template from the given images.
    ///
    /// Images are processed independently; any per-image failure skips that
    /// image. Zero accepted images yields the zero-sentinel template with
    /// an empty eye list — a soft outcome the caller checks via
    /// [`TemplateRecord::has_face`].
    pub fn create_template(
        &mut self,
        images: &[ImageView<'_>],
        role: TemplateRole,
    ) -> TemplateRecord {
        let mut accepted: Vec<Embedding> = Vec::new();
        let mut eyes: Vec<EyePair> = Vec::new();

        for (index, image) in images.iter().enumerate() {
            match self.process_image(image) {
                Ok((embedding, pair)) => {
                    accepted.push(embedding);
                    eyes.push(pair);
                }
                Err(reason) => {
                    tracing::debug!(index, ?reason, "image skipped");
                }
            }
        }

        tracing::info!(
            ?role,
            total = images.len(),
            accepted = accepted.len(),
            "template created"
        );

        TemplateRecord {
            template: template::encode(&template::aggregate(&accepted)),
            eyes,
        }
    }

    fn process_image(
        &mut self,
        image: &ImageView<'_>,
    ) -> Result<(Embedding, EyePair), RejectionReason> {
        let backend = |e: BackendError| RejectionReason::Backend(e.to_string());

        let face = self
            .ensemble
            .detect_best(image)
            .map_err(backend)?
            .ok_or(RejectionReason::NoFace)?;

        let landmarks = self
            .landmarker
            .detect(image, &face)
            .map_err(backend)?
            .ok_or(RejectionReason::NoLandmarks)?;

        let crop = normalize::recognition_crop(
            image,
            &landmarks,
            self.recognition.margin,
            self.recognition.input_size,
        );

        let embedding = self.embedder.embed(&crop).map_err(backend)?;

        match self
            .classifier
            .classify(&crop, &face, &landmarks, &embedding)
            .map_err(backend)?
        {
            Verdict::Pass => Ok((embedding, EyePair::from(&landmarks))),
            verdict => Err(RejectionReason::Rejected(verdict)),
        }
    }

    /// Similarity between two encoded templates; see [`template::similarity`].
    pub fn match_templates(a: &[u8], b: &[u8]) -> Result<f64, TemplateError> {
        template::similarity(a, b)
    }
}

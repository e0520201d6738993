//! Pipeline configuration.
//!
//! Every component receives its parameters explicitly from this structure;
//! there is no process-wide mutable state. Values come from an optional
//! `likeness.toml` under the configuration directory, with defaults matching
//! the shipped model suite.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::ensemble::EnsemblePolicy;

/// Name of the optional configuration file under the config directory.
pub const CONFIG_FILE: &str = "likeness.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading likeness.toml: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing likeness.toml: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Channel layout the embedding network was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorOrder {
    Rgb,
    Bgr,
    Gray,
}

/// Primary anchor-regression detector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model: String,
    /// Foreground acceptance threshold; backend-generation dependent.
    pub score_threshold: f32,
    pub nms_iou: f32,
    pub variances: [f32; 2],
    /// Anchor side as a multiple of the output stride.
    pub anchor_scale: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: "sfd.onnx".into(),
            score_threshold: 0.5,
            nms_iou: 0.3,
            variances: [0.1, 0.2],
            anchor_scale: 4.0,
        }
    }
}

/// A single-shot detector emitting already-decoded normalized boxes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SsdConfig {
    pub model: String,
    pub input_size: usize,
    pub score_threshold: f32,
}

impl Default for SsdConfig {
    fn default() -> Self {
        Self {
            model: "facessd_mobilenet_128.onnx".into(),
            input_size: 128,
            score_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub policy: EnsemblePolicy,
    /// Further detectors tried (first-hit) or pooled (average) after the
    /// primary one.
    pub fallbacks: Vec<SsdConfig>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            policy: EnsemblePolicy::FirstHit,
            fallbacks: vec![
                SsdConfig {
                    model: "facessd_mobilenet_512.onnx".into(),
                    input_size: 512,
                    score_threshold: 0.3,
                },
                SsdConfig {
                    model: "facessd_mobilenet_352.onnx".into(),
                    input_size: 352,
                    score_threshold: 0.3,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    pub model: String,
    /// Fixed square network input resolution.
    pub input_size: usize,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            model: "dnet_landmarks.onnx".into(),
            input_size: 48,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub model: String,
    pub input_size: usize,
    /// Landmark bounding box expansion on every side, as a fraction of its
    /// width/height.
    pub margin: f32,
    pub color: ColorOrder,
    /// Pixel value mapping into the network range: `p * scale + shift`.
    pub pixel_scale: f32,
    pub pixel_shift: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            model: "sphereface.onnx".into(),
            input_size: 128,
            margin: 0.75,
            color: ColorOrder::Bgr,
            pixel_scale: 1.0 / 255.0,
            pixel_shift: -0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Independent detector run over the recognition crop.
    pub secondary: SsdConfig,
    pub min_embedding_norm: f32,
    /// Minimum landmark spread (max of bounding-box width/height), pixels.
    pub min_face_scale: i32,
    pub min_landmark_iou: f32,
    pub min_face_iou: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            secondary: SsdConfig::default(),
            min_embedding_norm: 20.0,
            min_face_scale: 20,
            min_landmark_iou: 0.06,
            min_face_iou: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detector: DetectorConfig,
    pub ensemble: EnsembleConfig,
    pub landmarks: LandmarkConfig,
    pub recognition: RecognitionConfig,
    pub classifier: ClassifierConfig,
}

impl PipelineConfig {
    /// Load from `<config_dir>/likeness.toml`; a missing file yields the
    /// defaults, a malformed one is an error.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&text)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        assert_eq!(config.recognition.input_size, 128);
        assert!((config.recognition.margin - 0.75).abs() < 1e-6);
        assert_eq!(config.classifier.min_face_scale, 20);
        assert_eq!(config.ensemble.policy, EnsemblePolicy::FirstHit);
        assert_eq!(config.ensemble.fallbacks.len(), 2);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let text = r#"
            [classifier]
            min_embedding_norm = 12.5

            [ensemble]
            policy = "average"
            fallbacks = []
        "#;
        let config: PipelineConfig = toml::from_str(text).unwrap();
        assert!((config.classifier.min_embedding_norm - 12.5).abs() < 1e-6);
        assert!((config.classifier.min_landmark_iou - 0.06).abs() < 1e-6);
        assert_eq!(config.ensemble.policy, EnsemblePolicy::Average);
        assert!(config.ensemble.fallbacks.is_empty());
        assert_eq!(config.detector.model, "sfd.onnx");
    }

    #[test]
    fn color_order_parses_kebab_case() {
        let text = r#"
            [recognition]
            color = "gray"
        "#;
        let config: PipelineConfig = toml::from_str(text).unwrap();
        assert_eq!(config.recognition.color, ColorOrder::Gray);
    }
}

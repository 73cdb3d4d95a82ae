pub mod blob;
pub mod capture;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod render;
pub mod source;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use blob::{BlobStore, BlobUrl};
pub use error::{PipelineError, SourceError};
pub use pipeline::{FramePipeline, PipelineState, ProcessedVideo, Progress, SourceVideo};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    pub estimator: EstimatorConfig,
    pub overlay: OverlayConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Samples taken per second of source duration.
    pub sample_rate: u32,
    /// Upper bound for one seek or one inference call.
    pub frame_timeout_ms: u64,
    /// Upper bound for the capture stream's finalize event.
    pub finalize_timeout_ms: u64,
    /// How long the CLI waits for the estimator before giving up.
    pub estimator_init_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Frame rate assumed for Motion-JPEG sources that do not record one.
    pub frame_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub min_detection_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub connector_color: String,
    pub connector_width: u32,
    pub landmark_color: String,
    pub landmark_radius: u32,
    pub min_visibility: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output MIME types in descending preference order.
    pub formats: Vec<String>,
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig {
                sample_rate: 30,
                frame_timeout_ms: 10_000,
                finalize_timeout_ms: 5 * 60 * 1000,
                estimator_init_timeout_ms: 60_000,
            },
            source: SourceConfig { frame_rate: 30.0 },
            estimator: EstimatorConfig {
                min_detection_confidence: 0.5,
            },
            overlay: OverlayConfig {
                connector_color: "#00FF00".into(),
                connector_width: 4,
                landmark_color: "#FF0000".into(),
                landmark_radius: 6,
                min_visibility: 0.5,
            },
            output: OutputConfig {
                formats: vec![
                    "video/webm;codecs=vp9".into(),
                    "video/webm".into(),
                    "video/x-motion-jpeg".into(),
                ],
                jpeg_quality: 85,
            },
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `FORMCHECK__*` environment
    /// variables, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(
                config::Environment::with_prefix("FORMCHECK")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

impl PipelineConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }

    pub fn estimator_init_timeout(&self) -> Duration {
        Duration::from_millis(self.estimator_init_timeout_ms)
    }
}

/// Statistics collected over one processing run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub samples: u64,
    pub poses_detected: u64,
    pub missing_estimates: u64,
    pub output_bytes: usize,
    pub elapsed: Duration,
}

use std::time::Duration;

use thiserror::Error;

/// Failure of a single processing run.
///
/// Every variant is terminal for the run that produced it. The pipeline is
/// back in `Idle` by the time the caller sees one of these.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode source video: {0}")]
    Decode(#[from] SourceError),
    #[error("Pose estimator is not ready")]
    EstimatorNotReady,
    #[error("Pose inference failed on sample {sample}: {reason}")]
    Inference { sample: u64, reason: String },
    #[error("No supported output format (tried: {})", .tried.join(", "))]
    EncodingUnsupported { tried: Vec<String> },
    #[error("Capture stream did not finalize within {0:?}")]
    CaptureTimeout(Duration),
    #[error("Timed out after {timeout:?} waiting for {stage} of sample {sample}")]
    FrameTimeout {
        stage: &'static str,
        sample: u64,
        timeout: Duration,
    },
    #[error("Failed to render sample {sample}: {reason}")]
    Render { sample: u64, reason: String },
    #[error("Capture stream error: {0}")]
    Capture(String),
    #[error("A processing run is already active")]
    Busy,
    #[error("Processing run was cancelled")]
    Cancelled,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Errors raised while reading a source video.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source blob is empty")]
    Empty,
    #[error("no JPEG frame starts at offset {0}")]
    NotJpeg(usize),
    #[error("frame starting at offset {0} is truncated")]
    Truncated(usize),
    #[error("invalid frame rate {0}")]
    InvalidFrameRate(f64),
    #[error("frame {index} could not be decoded: {reason}")]
    Frame { index: usize, reason: String },
    #[error("unsupported pixel layout {0}")]
    UnsupportedLayout(String),
    #[error("{0}")]
    Other(String),
}

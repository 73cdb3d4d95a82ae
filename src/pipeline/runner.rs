//! Frame processing pipeline
//!
//! One run seeks the source to every sample timestamp, asks the estimator for
//! that frame's pose, renders frame and skeleton onto a surface and feeds the
//! surface to a capture stream. Samples are strictly sequential; a pipeline
//! instance runs at most one video at a time.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::progress::{Progress, ProgressTracker};
use super::sampler::SampleClock;
use super::state::{PipelineState, RunGuard, StateCell};
use crate::blob::{BlobStore, BlobUrl};
use crate::capture::{FrameEncoder, MjpegRecorder};
use crate::error::{PipelineError, SourceError};
use crate::inference::{EstimatorHandle, EstimatorState, PoseEstimator};
use crate::render::{OverlayStyle, Surface};
use crate::source::{MjpegDecoder, VideoDecoder};
use crate::utils::{concat_chunks, negotiate_format};
use crate::{Config, RunStats, CONFIG};

const UNTYPED_MIME: &str = "application/octet-stream";

/// Video submitted for processing
#[derive(Debug, Clone)]
pub struct SourceVideo {
    pub data: Bytes,
    /// Exercise label, carried through untouched
    pub label: String,
    pub mime: Option<String>,
}

impl SourceVideo {
    pub fn new(data: impl Into<Bytes>, label: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            label: label.into(),
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct ProcessedVideo {
    /// Reference to the rendered video; the receiver owns its release
    pub url: BlobUrl,
    pub mime: String,
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub samples: u64,
    pub duration: Duration,
    pub stats: RunStats,
}

pub struct FramePipeline {
    estimator: EstimatorHandle,
    decoder: Arc<dyn VideoDecoder>,
    encoder: Arc<dyn FrameEncoder>,
    blobs: BlobStore,
    state: StateCell,
    progress: ProgressTracker,
    style: OverlayStyle,
    config: Arc<Config>,
}

#[derive(Default)]
pub struct PipelineBuilder {
    estimator: Option<Arc<dyn PoseEstimator>>,
    decoder: Option<Arc<dyn VideoDecoder>>,
    encoder: Option<Arc<dyn FrameEncoder>>,
    blobs: Option<BlobStore>,
    config: Option<Arc<Config>>,
}

impl PipelineBuilder {
    pub fn estimator(mut self, estimator: Arc<dyn PoseEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn VideoDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn FrameEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn blobs(mut self, blobs: BlobStore) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Without this the global [`CONFIG`] is used
    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the pipeline and start initializing the estimator in the
    /// background. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<FramePipeline, PipelineError> {
        let config = self.config.unwrap_or_else(|| CONFIG.load_full());
        let estimator = self
            .estimator
            .ok_or_else(|| PipelineError::Config("a pose estimator is required".into()))?;

        let decoder = match self.decoder {
            Some(decoder) => decoder,
            None => Arc::new(
                MjpegDecoder::new(config.source.frame_rate)
                    .map_err(|e| PipelineError::Config(e.to_string()))?,
            ),
        };
        let encoder = self
            .encoder
            .unwrap_or_else(|| Arc::new(MjpegRecorder::new(config.output.jpeg_quality)));
        let style = OverlayStyle::from_config(&config.overlay)?;

        if config.pipeline.sample_rate == 0 {
            return Err(PipelineError::Config("sample_rate must be positive".into()));
        }

        Ok(FramePipeline {
            estimator: EstimatorHandle::spawn(estimator),
            decoder,
            encoder,
            blobs: self.blobs.unwrap_or_default(),
            state: StateCell::new(),
            progress: ProgressTracker::new(),
            style,
            config,
        })
    }
}

/// Why an awaited step did not produce a value
enum Interrupt {
    Cancelled,
    TimedOut,
}

async fn await_step<F: Future>(
    cancel: &CancellationToken,
    limit: Duration,
    fut: F,
) -> Result<F::Output, Interrupt> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        res = tokio::time::timeout(limit, fut) => res.map_err(|_| Interrupt::TimedOut),
    }
}

fn frame_interrupt(
    stage: &'static str,
    sample: u64,
    timeout: Duration,
) -> impl Fn(Interrupt) -> PipelineError {
    move |interrupt| match interrupt {
        Interrupt::Cancelled => PipelineError::Cancelled,
        Interrupt::TimedOut => PipelineError::FrameTimeout {
            stage,
            sample,
            timeout,
        },
    }
}

impl FramePipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn estimator_state(&self) -> EstimatorState {
        self.estimator.state()
    }

    /// Wait until the estimator finished initializing, bounded by `timeout`
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), PipelineError> {
        self.estimator.wait_ready(timeout).await
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Release the estimator's resources
    pub async fn close(&self) {
        self.estimator.estimator().close().await;
    }

    /// Render `video` with pose overlays.
    ///
    /// `on_complete` runs once, only on success, before the pipeline returns
    /// to `Idle`. Any error leaves the pipeline idle with progress reset.
    #[instrument(skip_all, fields(label = %video.label, bytes = video.data.len()))]
    pub async fn process_video<F>(
        &self,
        video: SourceVideo,
        on_complete: F,
        cancel: CancellationToken,
    ) -> Result<ProcessedVideo, PipelineError>
    where
        F: FnOnce(&ProcessedVideo) + Send,
    {
        let guard = self.state.begin()?;

        if !self.estimator.is_ready() {
            warn!("Rejecting run: estimator is {:?}", self.estimator.state());
            return Err(PipelineError::EstimatorNotReady);
        }

        self.progress.start();
        let started = Instant::now();
        let mut source_url = None;
        let mut stats = RunStats::default();
        let result = self
            .execute(&guard, video, &cancel, &mut source_url, &mut stats)
            .await;

        match result {
            Ok(mut processed) => {
                processed.stats.elapsed = started.elapsed();
                on_complete(&processed);
                guard.advance(PipelineState::Idle);
                self.release(source_url);
                self.progress.finish();

                metrics::counter!("formcheck_runs_completed_total").increment(1);
                info!(
                    "Processed '{}': {} samples, {} with a pose, {} bytes in {:?}",
                    processed.label,
                    processed.samples,
                    processed.stats.poses_detected,
                    processed.stats.output_bytes,
                    processed.stats.elapsed
                );
                Ok(processed)
            }
            Err(e) => {
                guard.advance(PipelineState::Failed);
                self.release(source_url);
                self.progress.reset();

                metrics::counter!("formcheck_runs_failed_total").increment(1);
                error!("Run failed after {} samples: {}", stats.samples, e);
                Err(e)
            }
        }
    }

    fn release(&self, url: Option<BlobUrl>) {
        if let Some(url) = url {
            self.blobs.revoke(&url);
        }
    }

    async fn execute(
        &self,
        guard: &RunGuard<'_>,
        video: SourceVideo,
        cancel: &CancellationToken,
        source_url: &mut Option<BlobUrl>,
        stats: &mut RunStats,
    ) -> Result<ProcessedVideo, PipelineError> {
        let pipeline = &self.config.pipeline;
        let frame_timeout = pipeline.frame_timeout();

        // Loading
        let mime = negotiate_format(&self.config.output.formats, self.encoder.as_ref())?;

        let url = self.blobs.create(
            video.data.clone(),
            video.mime.as_deref().unwrap_or(UNTYPED_MIME),
        );
        let blob = self
            .blobs
            .fetch(&url)
            .ok_or_else(|| PipelineError::Unknown(format!("{} vanished", url)))?;
        *source_url = Some(url);

        let mut source = match await_step(cancel, frame_timeout, self.decoder.open(blob.data)).await
        {
            Ok(opened) => opened?,
            Err(Interrupt::Cancelled) => return Err(PipelineError::Cancelled),
            Err(Interrupt::TimedOut) => {
                return Err(SourceError::Other(format!(
                    "opening the source took longer than {:?}",
                    frame_timeout
                ))
                .into())
            }
        };
        let meta = source.metadata().clone();
        let clock = SampleClock::new(meta.duration, pipeline.sample_rate);
        if meta.width == 0 || meta.height == 0 || clock.total() == 0 {
            return Err(SourceError::Other(format!(
                "source has nothing to sample ({}x{}, {:?})",
                meta.width, meta.height, meta.duration
            ))
            .into());
        }

        // Running
        guard.advance(PipelineState::Running);
        info!(
            "Sampling {} frames at {}/s from {}x{} source ({:?})",
            clock.total(),
            clock.rate(),
            meta.width,
            meta.height,
            meta.duration
        );

        let mut stream = self
            .encoder
            .begin(&mime, meta.width, meta.height, clock.rate())?;
        let chunk_rx = stream.chunks();
        let mut chunks: Vec<Bytes> = Vec::new();
        let mut surface = Surface::new(meta.width, meta.height);
        let estimator = self.estimator.estimator();

        for (sample, timestamp) in clock.timestamps() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let seek_start = Instant::now();
            let frame = await_step(cancel, frame_timeout, source.seek(timestamp))
                .await
                .map_err(frame_interrupt("seek", sample, frame_timeout))??;
            metrics::histogram!("formcheck_seek_time_us")
                .record(seek_start.elapsed().as_micros() as f64);

            let inference_start = Instant::now();
            let estimate = await_step(cancel, frame_timeout, estimator.estimate(&frame))
                .await
                .map_err(frame_interrupt("inference", sample, frame_timeout))?
                .map_err(|e| match e {
                    PipelineError::Inference { .. } => e,
                    other => PipelineError::Inference {
                        sample,
                        reason: other.to_string(),
                    },
                })?;
            metrics::histogram!("formcheck_inference_time_us")
                .record(inference_start.elapsed().as_micros() as f64);

            surface
                .draw_frame(&frame)
                .map_err(|reason| PipelineError::Render { sample, reason })?;
            drop(frame);

            match estimate {
                Some(estimate) => {
                    if estimate.has_pose() {
                        stats.poses_detected += 1;
                    }
                    if tracing::enabled!(tracing::Level::DEBUG) {
                        let hidden: Vec<&str> = (0..estimate.keypoints.len())
                            .filter(|&i| {
                                !estimate.keypoints[i].is_visible(self.style.min_visibility)
                            })
                            .filter_map(|i| estimate.label(i))
                            .collect();
                        if !hidden.is_empty() {
                            debug!("Sample {} hides {:?}", sample, hidden);
                        }
                    }
                    surface.draw_pose(&estimate, &self.style);
                }
                None => {
                    warn!(
                        "No estimate image for sample {} at {:?}, skipping overlay",
                        sample, timestamp
                    );
                    stats.missing_estimates += 1;
                }
            }

            stream.append(surface.image())?;
            chunks.extend(chunk_rx.try_iter());

            stats.samples += 1;
            metrics::counter!("formcheck_samples_total").increment(1);
            self.progress.advance(clock.percent_after(sample + 1));
            debug!("Sample {}/{} at {:?} done", sample + 1, clock.total(), timestamp);
        }

        // Finalizing
        guard.advance(PipelineState::Finalizing);
        let finalized = stream.stop();
        self.progress.complete();

        let finalize_timeout = pipeline.finalize_timeout();
        match await_step(cancel, finalize_timeout, finalized).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(PipelineError::Capture(
                    "stream closed without finalizing".into(),
                ))
            }
            Err(Interrupt::Cancelled) => return Err(PipelineError::Cancelled),
            Err(Interrupt::TimedOut) => {
                return Err(PipelineError::CaptureTimeout(finalize_timeout))
            }
        }
        chunks.extend(chunk_rx.drain());

        let output = concat_chunks(&chunks);
        drop(chunks);
        stats.output_bytes = output.len();

        let url = self.blobs.create(output, mime.clone());
        Ok(ProcessedVideo {
            url,
            mime,
            label: video.label,
            width: meta.width,
            height: meta.height,
            samples: clock.total(),
            duration: clock.output_duration(),
            stats: stats.clone(),
        })
    }
}

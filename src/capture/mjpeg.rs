//! Motion-JPEG recorder: every appended frame becomes one JPEG chunk that
//! records the stream's frame rate

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::{CaptureStream, FinalizeEvent, FrameEncoder};
use crate::error::PipelineError;
use crate::source::mjpeg::tag_frame_rate;

pub const MIME_TYPES: [&str; 2] = ["video/x-motion-jpeg", "video/mjpeg"];

#[derive(Debug, Clone)]
pub struct MjpegRecorder {
    quality: u8,
}

impl MjpegRecorder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl FrameEncoder for MjpegRecorder {
    fn name(&self) -> &'static str {
        "mjpeg"
    }

    fn supports(&self, mime: &str) -> bool {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        MIME_TYPES.iter().any(|m| m.eq_ignore_ascii_case(essence))
    }

    fn begin(
        &self,
        mime: &str,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn CaptureStream>, PipelineError> {
        if !self.supports(mime) {
            return Err(PipelineError::EncodingUnsupported {
                tried: vec![mime.to_string()],
            });
        }
        if width == 0 || height == 0 {
            return Err(PipelineError::Capture(format!(
                "invalid frame size {}x{}",
                width, height
            )));
        }
        if fps == 0 {
            return Err(PipelineError::Capture("frame rate must be positive".into()));
        }
        info!(
            "Recording {} at {}x{} ({} fps, quality {})",
            mime, width, height, fps, self.quality
        );

        let (tx, rx) = flume::unbounded();
        Ok(Box::new(MjpegStream {
            tx: Some(tx),
            rx,
            quality: self.quality,
            width,
            height,
            fps,
            frames: 0,
        }))
    }
}

struct MjpegStream {
    tx: Option<flume::Sender<Bytes>>,
    rx: flume::Receiver<Bytes>,
    quality: u8,
    width: u32,
    height: u32,
    fps: u32,
    frames: u64,
}

impl CaptureStream for MjpegStream {
    fn append(&mut self, image: &RgbImage) -> Result<(), PipelineError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| PipelineError::Capture("stream already stopped".into()))?;
        if image.dimensions() != (self.width, self.height) {
            return Err(PipelineError::Capture(format!(
                "frame is {}x{}, stream expects {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            )));
        }

        let mut chunk = Vec::new();
        JpegEncoder::new_with_quality(&mut chunk, self.quality)
            .encode(image.as_raw(), self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| PipelineError::Capture(format!("JPEG encode failed: {}", e)))?;
        tag_frame_rate(&mut chunk, f64::from(self.fps));

        self.frames += 1;
        tx.send(Bytes::from(chunk))
            .map_err(|_| PipelineError::Capture("chunk receiver dropped".into()))
    }

    fn chunks(&self) -> flume::Receiver<Bytes> {
        self.rx.clone()
    }

    fn stop(&mut self) -> FinalizeEvent {
        let (done, event) = oneshot::channel();
        // Chunks are emitted synchronously, so dropping the sender is the flush
        if self.tx.take().is_some() {
            debug!("Recorder stopped after {} frames", self.frames);
            let _ = done.send(());
        }
        event
    }
}

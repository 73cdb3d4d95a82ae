//! Output capture: rendered frames in, encoded chunks out

pub mod mjpeg;

use bytes::Bytes;
use image::RgbImage;
use tokio::sync::oneshot;

pub use mjpeg::MjpegRecorder;

use crate::error::PipelineError;

/// Fires once a stopped stream has emitted all of its chunks
pub type FinalizeEvent = oneshot::Receiver<()>;

/// Capture/encode capability
pub trait FrameEncoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this encoder can produce `mime`
    fn supports(&self, mime: &str) -> bool;

    /// Open a stream producing `mime` at the given size and nominal rate
    fn begin(
        &self,
        mime: &str,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn CaptureStream>, PipelineError>;
}

/// One recording in progress
pub trait CaptureStream: Send {
    /// Encode a rendered frame. Chunks may be emitted immediately or later.
    fn append(&mut self, image: &RgbImage) -> Result<(), PipelineError>;

    /// Receiver for encoded chunks, in output order
    fn chunks(&self) -> flume::Receiver<Bytes>;

    /// Stop accepting frames and start flushing
    fn stop(&mut self) -> FinalizeEvent;
}

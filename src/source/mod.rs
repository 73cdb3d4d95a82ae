pub mod decoder;
pub mod frame;
pub mod mjpeg;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use frame::{Frame, FrameMetadata, PixelFormat};
pub use mjpeg::{MjpegDecoder, MjpegSource};

use crate::error::SourceError;

/// Properties of an opened source video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub duration: Duration,
    pub frame_count: u64,
}

/// Decode capability: turns a blob into a seekable source
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    async fn open(&self, blob: Bytes) -> Result<Box<dyn VideoSource>, SourceError>;
}

/// An opened video that yields decoded frames by timestamp
#[async_trait]
pub trait VideoSource: Send {
    fn metadata(&self) -> &VideoMetadata;

    /// Seek to `timestamp` and return the RGB frame shown there.
    async fn seek(&mut self, timestamp: Duration) -> Result<Frame, SourceError>;
}

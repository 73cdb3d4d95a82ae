use bytes::Bytes;
use image::{ImageBuffer, Rgb};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Frame data with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across tasks without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Index of the source frame this snapshot was taken from
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    /// Sample timestamp the frame was requested for
    pub timestamp: Duration,
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Mjpeg,
}

impl Frame {
    pub fn new(data: Bytes, meta: FrameMetadata) -> Self {
        Self {
            data,
            meta: Arc::new(meta),
        }
    }

    /// Borrow the frame as an RGB image view, if it is decoded and well-sized
    pub fn as_rgb(&self) -> Option<ImageBuffer<Rgb<u8>, &[u8]>> {
        if self.meta.format != PixelFormat::Rgb24 {
            return None;
        }
        ImageBuffer::from_raw(self.meta.width, self.meta.height, &self.data[..])
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("bytes", &self.data.len())
            .field("meta", &self.meta)
            .finish()
    }
}

//! Motion-JPEG source: a blob of back-to-back JPEG images
//!
//! Blobs written by the recorder carry their frame rate in a `COM` segment
//! (`formcheck:fps=<rate>`) ahead of each scan. Untagged blobs play at the
//! decoder's configured rate.

use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, instrument};

use super::decoder::decode_frame;
use super::frame::{Frame, FrameMetadata, PixelFormat};
use super::{VideoDecoder, VideoMetadata, VideoSource};
use crate::error::SourceError;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;
const APP0: u8 = 0xE0;
const COM: u8 = 0xFE;

pub const FRAME_RATE_TAG: &str = "formcheck:fps=";

/// Opens Motion-JPEG blobs at a fixed frame rate
#[derive(Debug, Clone)]
pub struct MjpegDecoder {
    frame_rate: f64,
}

impl MjpegDecoder {
    /// `frame_rate` applies to blobs that do not record their own
    pub fn new(frame_rate: f64) -> Result<Self, SourceError> {
        Ok(Self {
            frame_rate: valid_frame_rate(frame_rate)?,
        })
    }
}

fn valid_frame_rate(frame_rate: f64) -> Result<f64, SourceError> {
    if frame_rate.is_finite() && frame_rate > 0.0 {
        Ok(frame_rate)
    } else {
        Err(SourceError::InvalidFrameRate(frame_rate))
    }
}

#[async_trait]
impl VideoDecoder for MjpegDecoder {
    async fn open(&self, blob: Bytes) -> Result<Box<dyn VideoSource>, SourceError> {
        let source = MjpegSource::open(blob, self.frame_rate).await?;
        Ok(Box::new(source))
    }
}

/// Seekable view over an indexed Motion-JPEG blob
pub struct MjpegSource {
    data: Bytes,
    frames: Vec<Range<usize>>,
    frame_rate: f64,
    metadata: VideoMetadata,
}

impl MjpegSource {
    /// Index the blob and decode the first frame to learn the dimensions.
    /// A rate recorded in the blob wins over `frame_rate`.
    #[instrument(skip(data), fields(bytes = data.len()))]
    pub async fn open(data: Bytes, frame_rate: f64) -> Result<Self, SourceError> {
        let frames = split_frames(&data)?;
        let frame_rate = match tagged_frame_rate(&data[frames[0].clone()])? {
            Some(tagged) => {
                debug!("Blob records {} fps", tagged);
                tagged
            }
            None => valid_frame_rate(frame_rate)?,
        };
        let first = decode_at(data.slice(frames[0].clone()), 0, Duration::ZERO).await?;

        let frame_count = frames.len() as u64;
        let duration = Duration::try_from_secs_f64(frame_count as f64 / frame_rate)
            .map_err(|_| SourceError::InvalidFrameRate(frame_rate))?;
        let metadata = VideoMetadata {
            width: first.meta.width,
            height: first.meta.height,
            duration,
            frame_count,
        };
        info!(
            "Opened MJPEG source: {} frames, {}x{}, {:?}",
            frame_count, metadata.width, metadata.height, metadata.duration
        );

        Ok(Self {
            data,
            frames,
            frame_rate,
            metadata,
        })
    }

    /// Source frame shown at `timestamp`
    pub fn frame_index(&self, timestamp: Duration) -> usize {
        let index = (timestamp.as_secs_f64() * self.frame_rate + 1e-9).floor() as usize;
        index.min(self.frames.len() - 1)
    }
}

#[async_trait]
impl VideoSource for MjpegSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    async fn seek(&mut self, timestamp: Duration) -> Result<Frame, SourceError> {
        let index = self.frame_index(timestamp);
        debug!("Seek {:?} -> frame {}", timestamp, index);
        decode_at(self.data.slice(self.frames[index].clone()), index, timestamp).await
    }
}

/// JPEG decoding is CPU-bound, keep it off the async workers
async fn decode_at(data: Bytes, index: usize, timestamp: Duration) -> Result<Frame, SourceError> {
    let compressed = Frame::new(
        data,
        FrameMetadata {
            sequence: index as u64,
            width: 0,
            height: 0,
            stride: 0,
            format: PixelFormat::Mjpeg,
            timestamp,
        },
    );
    tokio::task::spawn_blocking(move || decode_frame(&compressed))
        .await
        .map_err(|e| SourceError::Other(format!("decode task failed: {}", e)))?
}

/// Locate every JPEG image in `data` by walking its marker segments.
pub fn split_frames(data: &[u8]) -> Result<Vec<Range<usize>>, SourceError> {
    if data.is_empty() {
        return Err(SourceError::Empty);
    }

    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if data.get(pos) != Some(&0xFF) || data.get(pos + 1) != Some(&SOI) {
            return Err(SourceError::NotJpeg(pos));
        }
        let end = frame_end(data, pos, frames.len())?;
        frames.push(pos..end);
        pos = end;
    }
    Ok(frames)
}

/// Offset one past the EOI marker of the image starting at `start`
fn frame_end(data: &[u8], start: usize, index: usize) -> Result<usize, SourceError> {
    let truncated = || SourceError::Truncated(start);
    let mut pos = start + 2;

    loop {
        if *data.get(pos).ok_or_else(truncated)? != 0xFF {
            return Err(SourceError::Frame {
                index,
                reason: format!("expected marker at offset {}", pos),
            });
        }
        // Any number of 0xFF fill bytes may precede a marker
        while data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        let marker = *data.get(pos + 1).ok_or_else(truncated)?;
        match marker {
            EOI => return Ok(pos + 2),
            TEM | 0xD0..=0xD7 => pos += 2,
            _ => {
                let len = segment_len(data, pos).ok_or_else(truncated)?;
                pos += 2 + len;
                if marker == SOS {
                    pos = skip_entropy_data(data, pos).ok_or_else(truncated)?;
                }
            }
        }
    }
}

/// Record `frame_rate` in a `COM` segment right after SOI and the JFIF header
pub fn tag_frame_rate(jpeg: &mut Vec<u8>, frame_rate: f64) {
    if !jpeg.starts_with(&[0xFF, SOI]) {
        return;
    }
    let mut at = 2;
    if jpeg.get(2..4) == Some(&[0xFF, APP0][..]) {
        if let Some(len) = segment_len(jpeg, 2) {
            at += 2 + len;
        }
    }

    let payload = format!("{}{}", FRAME_RATE_TAG, frame_rate);
    let mut segment = vec![0xFF, COM];
    segment.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    segment.extend_from_slice(payload.as_bytes());
    jpeg.splice(at..at, segment);
}

/// Frame rate recorded in the header segments of `frame`, if any
pub fn tagged_frame_rate(frame: &[u8]) -> Result<Option<f64>, SourceError> {
    let mut pos = 2;
    while frame.get(pos) == Some(&0xFF) {
        let Some(&marker) = frame.get(pos + 1) else {
            break;
        };
        match marker {
            SOS | EOI => break,
            0xFF => pos += 1,
            TEM | 0xD0..=0xD7 => pos += 2,
            _ => {
                let Some(len) = segment_len(frame, pos) else {
                    break;
                };
                let body = &frame[pos + 4..pos + 2 + len];
                if marker == COM {
                    if let Some(value) = body.strip_prefix(FRAME_RATE_TAG.as_bytes()) {
                        let rate = std::str::from_utf8(value)
                            .ok()
                            .and_then(|v| v.trim().parse::<f64>().ok())
                            .unwrap_or(f64::NAN);
                        return valid_frame_rate(rate).map(Some);
                    }
                }
                pos += 2 + len;
            }
        }
    }
    Ok(None)
}

fn segment_len(data: &[u8], marker_pos: usize) -> Option<usize> {
    let hi = *data.get(marker_pos + 2)?;
    let lo = *data.get(marker_pos + 3)?;
    let len = usize::from(u16::from_be_bytes([hi, lo]));
    (len >= 2 && marker_pos + 2 + len <= data.len()).then_some(len)
}

/// Scan entropy-coded data up to the next real marker
fn skip_entropy_data(data: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        if *data.get(pos)? != 0xFF {
            pos += 1;
            continue;
        }
        match *data.get(pos + 1)? {
            // stuffed zero byte or restart marker inside the scan
            0x00 | 0xD0..=0xD7 => pos += 2,
            0xFF => pos += 1,
            _ => return Some(pos),
        }
    }
}

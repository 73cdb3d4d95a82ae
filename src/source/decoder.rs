use bytes::Bytes;
use jpeg_decoder::Decoder;

use super::frame::{Frame, FrameMetadata, PixelFormat};
use crate::error::SourceError;

/// Decode `frame` into packed RGB24. Already-decoded frames pass through.
pub fn decode_frame(frame: &Frame) -> Result<Frame, SourceError> {
    match frame.meta.format {
        PixelFormat::Mjpeg => {
            let mut decoder = Decoder::new(&frame.data[..]);
            let pixels = decoder.decode().map_err(|e| SourceError::Frame {
                index: frame.meta.sequence as usize,
                reason: e.to_string(),
            })?;
            let info = decoder.info().ok_or_else(|| SourceError::Frame {
                index: frame.meta.sequence as usize,
                reason: "missing frame header".into(),
            })?;

            let rgb = match info.pixel_format {
                jpeg_decoder::PixelFormat::RGB24 => pixels,
                jpeg_decoder::PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
                other => return Err(SourceError::UnsupportedLayout(format!("{:?}", other))),
            };

            let width = u32::from(info.width);
            let height = u32::from(info.height);
            Ok(Frame::new(
                Bytes::from(rgb),
                FrameMetadata {
                    sequence: frame.meta.sequence,
                    width,
                    height,
                    stride: width * 3,
                    format: PixelFormat::Rgb24,
                    timestamp: frame.meta.timestamp,
                },
            ))
        }
        PixelFormat::Rgb24 => {
            // Already in RGB format
            Ok(frame.clone())
        }
    }
}

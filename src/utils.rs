use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::capture::FrameEncoder;
use crate::error::PipelineError;

/// Pick the first output format in `preferences` the encoder supports
pub fn negotiate_format(
    preferences: &[String],
    encoder: &dyn FrameEncoder,
) -> Result<String, PipelineError> {
    for mime in preferences {
        if encoder.supports(mime) {
            info!("Using output format {} ({})", mime, encoder.name());
            return Ok(mime.clone());
        }
        debug!("Output format {} not supported by {}", mime, encoder.name());
    }

    Err(PipelineError::EncodingUnsupported {
        tried: preferences.to_vec(),
    })
}

/// Concatenate encoded chunks into one contiguous blob
pub fn concat_chunks(chunks: &[Bytes]) -> Bytes {
    match chunks {
        [] => Bytes::new(),
        [single] => single.clone(),
        _ => {
            let mut out = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
            for chunk in chunks {
                out.extend_from_slice(chunk);
            }
            out.freeze()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MjpegRecorder;

    #[test]
    fn negotiation_respects_preference_order() {
        let recorder = MjpegRecorder::new(80);
        let prefs = vec![
            "video/webm;codecs=vp9".to_string(),
            "video/mjpeg".to_string(),
            "video/x-motion-jpeg".to_string(),
        ];
        assert_eq!(negotiate_format(&prefs, &recorder).unwrap(), "video/mjpeg");
    }

    #[test]
    fn negotiation_fails_when_nothing_matches() {
        let recorder = MjpegRecorder::new(80);
        let prefs = vec!["video/webm".to_string()];
        match negotiate_format(&prefs, &recorder) {
            Err(PipelineError::EncodingUnsupported { tried }) => assert_eq!(tried, prefs),
            other => panic!("unexpected {:?}", other),
        }
        assert!(negotiate_format(&[], &recorder).is_err());
    }

    #[test]
    fn concatenates_in_order() {
        let chunks = [Bytes::from_static(b"ab"), Bytes::from_static(b"c"), Bytes::new()];
        assert_eq!(&concat_chunks(&chunks)[..], b"abc");
        assert!(concat_chunks(&[]).is_empty());
    }
}

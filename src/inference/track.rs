//! Replays precomputed pose tracks
//!
//! A track file is JSON:
//!
//! ```json
//! { "entries": [ { "timestamp_ms": 0, "score": 0.93, "keypoints": [ { "x": 0.5, "y": 0.2 } ] } ] }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use super::estimator::PoseEstimator;
use super::pose::{Keypoint, PoseEstimate};
use crate::error::PipelineError;
use crate::source::Frame;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseTrack {
    pub entries: Vec<TrackEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackEntry {
    pub timestamp_ms: u64,
    /// Detection confidence for the whole pose
    #[serde(default = "full_score")]
    pub score: f32,
    pub keypoints: Vec<Keypoint>,
    #[serde(default)]
    pub connections: Option<Vec<(usize, usize)>>,
}

fn full_score() -> f32 {
    1.0
}

enum TrackOrigin {
    File(PathBuf),
    Memory(PoseTrack),
}

/// Pose estimator backed by a recorded keypoint track
pub struct TrackEstimator {
    origin: TrackOrigin,
    track: OnceCell<PoseTrack>,
    tolerance: Duration,
    min_detection_confidence: f32,
}

impl TrackEstimator {
    /// Track loaded from a JSON file during `initialize`
    pub fn from_file(path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self::with_origin(TrackOrigin::File(path.into()), sample_rate)
    }

    pub fn from_track(track: PoseTrack, sample_rate: u32) -> Self {
        Self::with_origin(TrackOrigin::Memory(track), sample_rate)
    }

    fn with_origin(origin: TrackOrigin, sample_rate: u32) -> Self {
        Self {
            origin,
            track: OnceCell::new(),
            // half a sample interval either side of the requested timestamp
            tolerance: Duration::from_secs_f64(0.5 / f64::from(sample_rate.max(1))),
            min_detection_confidence: 0.5,
        }
    }

    pub fn min_detection_confidence(mut self, confidence: f32) -> Self {
        self.min_detection_confidence = confidence;
        self
    }

    fn lookup(&self, track: &PoseTrack, timestamp: Duration) -> PoseEstimate {
        let at = |e: &TrackEntry| Duration::from_millis(e.timestamp_ms);
        let entries = &track.entries;
        // entries are sorted by timestamp once the track is initialized
        let nearest = match entries.binary_search_by_key(&timestamp, at) {
            Ok(i) => entries.get(i),
            Err(i) => {
                let before = i.checked_sub(1).and_then(|j| entries.get(j));
                before
                    .into_iter()
                    .chain(entries.get(i))
                    .min_by_key(|e| distance(at(*e), timestamp))
            }
        };

        match nearest {
            Some(entry)
                if distance(at(entry), timestamp) <= self.tolerance
                    && entry.score >= self.min_detection_confidence =>
            {
                PoseEstimate {
                    keypoints: entry.keypoints.clone(),
                    connections: entry.connections.clone(),
                }
            }
            _ => PoseEstimate::empty(),
        }
    }
}

fn distance(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[async_trait]
impl PoseEstimator for TrackEstimator {
    #[instrument(skip(self))]
    async fn initialize(&self) -> Result<(), PipelineError> {
        self.track
            .get_or_try_init(|| async {
                let mut track = match &self.origin {
                    TrackOrigin::Memory(track) => track.clone(),
                    TrackOrigin::File(path) => {
                        let raw = tokio::fs::read(path).await.map_err(|e| {
                            PipelineError::Unknown(format!(
                                "failed to read pose track {}: {}",
                                path.display(),
                                e
                            ))
                        })?;
                        serde_json::from_slice(&raw).map_err(|e| {
                            PipelineError::Unknown(format!(
                                "invalid pose track {}: {}",
                                path.display(),
                                e
                            ))
                        })?
                    }
                };
                track.entries.sort_by_key(|e| e.timestamp_ms);
                info!("Loaded pose track with {} entries", track.entries.len());
                Ok::<_, PipelineError>(track)
            })
            .await?;
        Ok(())
    }

    async fn estimate(&self, frame: &Frame) -> Result<Option<PoseEstimate>, PipelineError> {
        let track = self.track.get().ok_or(PipelineError::EstimatorNotReady)?;
        let estimate = self.lookup(track, frame.meta.timestamp);
        debug!(
            "Track estimate at {:?}: {} keypoints",
            frame.meta.timestamp,
            estimate.keypoints.len()
        );
        Ok(Some(estimate))
    }

    fn name(&self) -> &'static str {
        "pose-track"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FrameMetadata, PixelFormat};
    use bytes::Bytes;

    fn frame_at(ms: u64) -> Frame {
        frame_at_time(Duration::from_millis(ms))
    }

    fn frame_at_time(timestamp: Duration) -> Frame {
        Frame::new(
            Bytes::new(),
            FrameMetadata {
                sequence: 0,
                width: 0,
                height: 0,
                stride: 0,
                format: PixelFormat::Rgb24,
                timestamp,
            },
        )
    }

    fn entry(timestamp_ms: u64, score: f32) -> TrackEntry {
        TrackEntry {
            timestamp_ms,
            score,
            keypoints: vec![Keypoint::new(timestamp_ms as f32 / 1000.0, 0.5)],
            connections: None,
        }
    }

    #[tokio::test]
    async fn estimate_before_initialize_fails() {
        let estimator = TrackEstimator::from_track(PoseTrack::default(), 30);
        let err = estimator.estimate(&frame_at(0)).await.unwrap_err();
        assert!(matches!(err, PipelineError::EstimatorNotReady));
    }

    #[tokio::test]
    async fn picks_nearest_entry_within_tolerance() {
        let track = PoseTrack {
            entries: vec![entry(100, 0.9), entry(0, 0.9)],
        };
        let estimator = TrackEstimator::from_track(track, 30);
        estimator.initialize().await.unwrap();

        let at_zero = estimator.estimate(&frame_at(10)).await.unwrap().unwrap();
        assert_eq!(at_zero.keypoints[0].x, 0.0);

        let at_hundred = estimator.estimate(&frame_at(95)).await.unwrap().unwrap();
        assert_eq!(at_hundred.keypoints[0].x, 0.1);

        // 50ms away from both entries, tolerance is ~16.7ms
        let gap = estimator.estimate(&frame_at(50)).await.unwrap().unwrap();
        assert!(!gap.has_pose());
    }

    #[tokio::test]
    async fn sub_millisecond_offsets_pick_the_closer_entry() {
        let track = PoseTrack {
            entries: vec![entry(101, 0.9), entry(100, 0.9), entry(300, 0.9)],
        };
        let estimator = TrackEstimator::from_track(track, 30);
        estimator.initialize().await.unwrap();

        let late = estimator
            .estimate(&frame_at_time(Duration::from_micros(100_900)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(late.keypoints[0].x, 0.101);

        let early = estimator
            .estimate(&frame_at_time(Duration::from_micros(100_200)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(early.keypoints[0].x, 0.1);

        let past_end = estimator.estimate(&frame_at(310)).await.unwrap().unwrap();
        assert_eq!(past_end.keypoints[0].x, 0.3);
    }

    #[tokio::test]
    async fn low_confidence_entries_are_dropped() {
        let track = PoseTrack {
            entries: vec![entry(0, 0.2)],
        };
        let estimator = TrackEstimator::from_track(track, 30).min_detection_confidence(0.5);
        estimator.initialize().await.unwrap();

        let estimate = estimator.estimate(&frame_at(0)).await.unwrap().unwrap();
        assert!(!estimate.has_pose());
    }

    #[tokio::test]
    async fn loads_track_file() {
        let dir = std::env::temp_dir().join(format!("formcheck-track-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("track.json");
        std::fs::write(
            &path,
            r#"{"entries":[{"timestamp_ms":0,"keypoints":[{"x":0.5,"y":0.5,"visibility":0.9}]}]}"#,
        )
        .unwrap();

        let estimator = TrackEstimator::from_file(&path, 30);
        estimator.initialize().await.unwrap();
        let estimate = estimator.estimate(&frame_at(0)).await.unwrap().unwrap();
        assert_eq!(estimate.keypoints.len(), 1);

        let missing = TrackEstimator::from_file(dir.join("nope.json"), 30);
        assert!(missing.initialize().await.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}

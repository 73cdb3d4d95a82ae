use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tokio_util::sync::CancellationToken;

use formcheck::capture::MjpegRecorder;
use formcheck::inference::{Keypoint, PoseTrack, TrackEntry, TrackEstimator};
use formcheck::source::{MjpegDecoder, VideoDecoder, VideoSource};
use formcheck::{Config, FramePipeline, PipelineError, PipelineState, SourceVideo};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn gray_mjpeg(frames: usize) -> Bytes {
    let pixels = vec![60u8; (WIDTH * HEIGHT * 3) as usize];
    let mut blob = Vec::new();
    for _ in 0..frames {
        JpegEncoder::new_with_quality(&mut blob, 90)
            .encode(&pixels, WIDTH, HEIGHT, ExtendedColorType::Rgb8)
            .unwrap();
    }
    Bytes::from(blob)
}

/// One entry per sample at `rate` samples/second
fn track(samples: u64, rate: u64) -> PoseTrack {
    let entries = (0..samples)
        .map(|k| TrackEntry {
            timestamp_ms: k * 1000 / rate,
            score: 0.9,
            keypoints: vec![Keypoint::new(0.25, 0.5), Keypoint::new(0.75, 0.5)],
            connections: Some(vec![(0, 1)]),
        })
        .collect();
    PoseTrack { entries }
}

fn config(source_fps: f64, sample_rate: u32) -> Config {
    let mut config = Config::default();
    config.source.frame_rate = source_fps;
    config.pipeline.sample_rate = sample_rate;
    config
}

async fn pipeline(config: Config, track: PoseTrack) -> FramePipeline {
    let pipeline = FramePipeline::builder()
        .estimator(Arc::new(TrackEstimator::from_track(
            track,
            config.pipeline.sample_rate,
        )))
        .decoder(Arc::new(MjpegDecoder::new(config.source.frame_rate).unwrap()))
        .encoder(Arc::new(MjpegRecorder::new(config.output.jpeg_quality)))
        .config(Arc::new(config))
        .build()
        .unwrap();
    pipeline
        .wait_until_ready(Duration::from_secs(5))
        .await
        .unwrap();
    pipeline
}

#[tokio::test]
async fn output_decodes_to_the_sampled_duration() {
    // 20 source frames at 10 fps: two seconds, resampled at 30/s
    let config = config(10.0, 30);
    let decoder = MjpegDecoder::new(config.source.frame_rate).unwrap();
    let pipeline = pipeline(config, track(60, 30)).await;
    let video = SourceVideo::new(gray_mjpeg(20), "agachamento").with_mime("video/x-motion-jpeg");

    let mut handed_over = None;
    let processed = pipeline
        .process_video(
            video,
            |p| handed_over = Some(p.url.clone()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(handed_over, Some(processed.url.clone()));
    assert_eq!(processed.samples, 60);
    assert_eq!(processed.mime, "video/x-motion-jpeg");
    assert_eq!((processed.width, processed.height), (WIDTH, HEIGHT));

    let blob = pipeline.blobs().fetch(&processed.url).unwrap();
    assert_eq!(blob.mime, "video/x-motion-jpeg");
    let mut output = decoder.open(blob.data).await.unwrap();
    let meta = output.metadata().clone();

    let interval = Duration::from_secs_f64(1.0 / 30.0);
    let expected = Duration::from_secs(2);
    assert_eq!(meta.frame_count, 60);
    assert!(meta.duration + interval >= expected && meta.duration <= expected + interval);
    assert_eq!((meta.width, meta.height), (WIDTH, HEIGHT));

    // landmark markers survive encoding: the left keypoint sits at (16, 24)
    let frame = output.seek(Duration::from_millis(500)).await.unwrap();
    let px = &frame.data[((24 * WIDTH + 16) * 3) as usize..][..3];
    assert!(px[0] > 150 && px[1] < 120, "pixel {:?} is not red", px);

    // between the keypoints the connector is green
    let px = &frame.data[((24 * WIDTH + 32) * 3) as usize..][..3];
    assert!(px[1] > 150 && px[0] < 120, "pixel {:?} is not green", px);
}

#[tokio::test]
async fn output_keeps_its_duration_at_a_lower_sample_rate() {
    // 60 source frames at 30 fps: two seconds, resampled at 15/s
    let config = config(30.0, 15);
    let decoder = MjpegDecoder::new(config.source.frame_rate).unwrap();
    let pipeline = pipeline(config, track(30, 15)).await;

    let processed = pipeline
        .process_video(
            SourceVideo::new(gray_mjpeg(60), "remada"),
            |_| {},
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(processed.samples, 30);
    assert_eq!(processed.duration, Duration::from_secs(2));
    assert_eq!(processed.stats.poses_detected, 30);

    let blob = pipeline.blobs().fetch(&processed.url).unwrap();
    let output = decoder.open(blob.data).await.unwrap();
    let meta = output.metadata();
    let interval = Duration::from_secs_f64(1.0 / 15.0);
    assert_eq!(meta.frame_count, 30);
    assert!(meta.duration + interval >= processed.duration);
    assert!(meta.duration <= processed.duration + interval);
}

#[tokio::test]
async fn source_reference_is_released_after_success_and_failure() {
    let pipeline = pipeline(config(30.0, 30), track(30, 30)).await;

    let processed = pipeline
        .process_video(
            SourceVideo::new(gray_mjpeg(30), "prancha"),
            |_| {},
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(pipeline.blobs().live(), 1);
    pipeline.blobs().revoke(&processed.url);

    let err = pipeline
        .process_video(
            SourceVideo::new(&b"not a video"[..], "prancha"),
            |_| panic!("no completion for a failed run"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Decode(_)));
    assert_eq!(pipeline.blobs().live(), 0);
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(pipeline.progress().borrow().percent, 0);
}

#[tokio::test]
async fn empty_track_still_renders_every_sample() {
    let pipeline = pipeline(config(30.0, 30), PoseTrack::default()).await;

    let processed = pipeline
        .process_video(
            SourceVideo::new(gray_mjpeg(15), "afundos"),
            |_| {},
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(processed.samples, 15);
    assert_eq!(processed.stats.poses_detected, 0);
    assert_eq!(processed.stats.missing_estimates, 0);
}

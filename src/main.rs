//! formcheck: render pose skeletons onto an exercise video

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use formcheck::capture::MjpegRecorder;
use formcheck::inference::TrackEstimator;
use formcheck::source::MjpegDecoder;
use formcheck::{Config, FramePipeline, SourceVideo};

#[derive(Parser, Debug)]
#[command(version, about = "Overlay pose skeletons onto an exercise video")]
struct Args {
    /// Motion-JPEG input video
    #[arg(short, long)]
    input: PathBuf,

    /// Pose track (JSON) matching the input
    #[arg(short, long)]
    poses: PathBuf,

    /// Where to write the rendered video
    #[arg(short, long)]
    output: PathBuf,

    /// Exercise label
    #[arg(short, long, default_value = "exercise")]
    label: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("formcheck=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let args = Args::parse();
    info!("formcheck starting");

    // Load configuration
    let config = Config::load(args.config.as_deref()).wrap_err("failed to load configuration")?;
    formcheck::CONFIG.store(Arc::new(config.clone()));

    let estimator = TrackEstimator::from_file(&args.poses, config.pipeline.sample_rate)
        .min_detection_confidence(config.estimator.min_detection_confidence);
    let pipeline = FramePipeline::builder()
        .estimator(Arc::new(estimator))
        .decoder(Arc::new(MjpegDecoder::new(config.source.frame_rate)?))
        .encoder(Arc::new(MjpegRecorder::new(config.output.jpeg_quality)))
        .build()?;

    pipeline
        .wait_until_ready(config.pipeline.estimator_init_timeout())
        .await
        .wrap_err_with(|| format!("pose track {} unavailable", args.poses.display()))?;

    let data = tokio::fs::read(&args.input)
        .await
        .wrap_err_with(|| format!("failed to read {}", args.input.display()))?;
    let video = SourceVideo::new(data, args.label).with_mime("video/x-motion-jpeg");

    // Cancel the run on Ctrl-C
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            ctrl_c.cancel();
        }
    });

    // Log progress changes
    let mut progress = pipeline.progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            if current.running {
                info!("Progress: {}%", current.percent);
            }
        }
    });

    let blobs = pipeline.blobs().clone();
    let mut written = Ok(());
    let output_path = args.output.clone();
    let processed = pipeline
        .process_video(
            video,
            |processed| {
                written = match blobs.fetch(&processed.url) {
                    Some(blob) => std::fs::write(&output_path, &blob.data)
                        .wrap_err_with(|| format!("failed to write {}", output_path.display())),
                    None => Err(eyre!("output reference {} is gone", processed.url)),
                };
            },
            cancel,
        )
        .await?;
    written?;
    pipeline.blobs().revoke(&processed.url);

    pipeline.close().await;
    drop(pipeline);
    reporter.abort();

    info!(
        "Wrote {} ({} samples, {:?}, pose found in {})",
        args.output.display(),
        processed.samples,
        processed.duration,
        processed.stats.poses_detected
    );
    Ok(())
}

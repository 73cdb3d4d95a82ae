pub mod progress;
pub mod runner;
pub mod sampler;
pub mod state;

pub use progress::{Progress, ProgressTracker};
pub use runner::{FramePipeline, PipelineBuilder, ProcessedVideo, SourceVideo};
pub use sampler::SampleClock;
pub use state::PipelineState;

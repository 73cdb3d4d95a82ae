pub mod estimator;
pub mod pose;
pub mod topology;
pub mod track;

pub use estimator::{EstimatorHandle, EstimatorState, PoseEstimator};
pub use pose::{Keypoint, PoseEstimate};
pub use track::{PoseTrack, TrackEntry, TrackEstimator};

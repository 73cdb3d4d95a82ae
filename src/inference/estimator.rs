use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info};

use super::pose::PoseEstimate;
use crate::error::PipelineError;
use crate::source::Frame;

/// Pose-inference capability
///
/// `estimate` is called once per submitted frame and returns that frame's
/// result directly. `Ok(None)` means the model produced no result image for
/// the frame; the pipeline skips the overlay and carries on.
#[async_trait]
pub trait PoseEstimator: Send + Sync {
    /// Load models or other resources. Called once, before any `estimate`.
    async fn initialize(&self) -> Result<(), PipelineError>;

    async fn estimate(&self, frame: &Frame) -> Result<Option<PoseEstimate>, PipelineError>;

    async fn close(&self) {}

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorState {
    Initializing,
    Ready,
    Failed(String),
}

/// Estimator plus its readiness, initialized in the background
#[derive(Clone)]
pub struct EstimatorHandle {
    estimator: Arc<dyn PoseEstimator>,
    state: watch::Receiver<EstimatorState>,
}

impl EstimatorHandle {
    /// Start initializing `estimator` on the current runtime
    pub fn spawn(estimator: Arc<dyn PoseEstimator>) -> Self {
        let (tx, rx) = watch::channel(EstimatorState::Initializing);
        let task_estimator = Arc::clone(&estimator);

        tokio::spawn(async move {
            let name = task_estimator.name();
            let state = match task_estimator.initialize().await {
                Ok(()) => {
                    info!("Pose estimator '{}' ready", name);
                    EstimatorState::Ready
                }
                Err(e) => {
                    error!("Pose estimator '{}' failed to initialize: {}", name, e);
                    EstimatorState::Failed(e.to_string())
                }
            };
            let _ = tx.send(state);
        });

        Self {
            estimator,
            state: rx,
        }
    }

    pub fn state(&self) -> EstimatorState {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == EstimatorState::Ready
    }

    /// Wait for initialization to settle, bounded by `timeout`
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), PipelineError> {
        let mut state = self.state.clone();
        let settled = tokio::time::timeout(
            timeout,
            state.wait_for(|s| !matches!(s, EstimatorState::Initializing)),
        )
        .await;

        match settled {
            Ok(Ok(s)) if *s == EstimatorState::Ready => Ok(()),
            _ => Err(PipelineError::EstimatorNotReady),
        }
    }

    pub fn estimator(&self) -> &dyn PoseEstimator {
        self.estimator.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl PoseEstimator for Slow {
        async fn initialize(&self) -> Result<(), PipelineError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(PipelineError::Unknown("model missing".into()))
            } else {
                Ok(())
            }
        }

        async fn estimate(&self, _frame: &Frame) -> Result<Option<PoseEstimate>, PipelineError> {
            Ok(Some(PoseEstimate::empty()))
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn becomes_ready_in_background() {
        let handle = EstimatorHandle::spawn(Arc::new(Slow {
            delay: Duration::from_millis(20),
            fail: false,
        }));
        assert_eq!(handle.state(), EstimatorState::Initializing);
        assert!(!handle.is_ready());

        handle.wait_ready(Duration::from_secs(5)).await.unwrap();
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn failed_initialization_is_not_ready() {
        let handle = EstimatorHandle::spawn(Arc::new(Slow {
            delay: Duration::ZERO,
            fail: true,
        }));
        let err = handle.wait_ready(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, PipelineError::EstimatorNotReady));
        assert!(matches!(handle.state(), EstimatorState::Failed(msg) if msg.contains("model missing")));
    }

    #[tokio::test]
    async fn wait_is_bounded() {
        let handle = EstimatorHandle::spawn(Arc::new(Slow {
            delay: Duration::from_secs(3600),
            fail: false,
        }));
        let err = handle.wait_ready(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, PipelineError::EstimatorNotReady));
    }
}

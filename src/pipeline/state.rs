use std::fmt;
use std::sync::Mutex;

use tracing::{debug, info};

use crate::error::PipelineError;

/// Lifecycle of a pipeline instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading,
    Running,
    Finalizing,
    Failed,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Loading)
                | (Loading, Running)
                | (Running, Finalizing)
                | (Finalizing, Idle)
                | (Loading | Running | Finalizing, Failed)
                | (Failed, Idle)
        )
    }

    pub fn is_active(self) -> bool {
        self != PipelineState::Idle
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Shared state cell; the only way to start a run is [`StateCell::begin`]
#[derive(Debug)]
pub struct StateCell {
    state: Mutex<PipelineState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PipelineState::Idle),
        }
    }

    pub fn get(&self) -> PipelineState {
        *self.lock()
    }

    /// Claim the pipeline for one run, `Idle -> Loading`
    pub fn begin(&self) -> Result<RunGuard<'_>, PipelineError> {
        let mut state = self.lock();
        if state.is_active() {
            debug!("Rejecting run request while {}", *state);
            return Err(PipelineError::Busy);
        }
        *state = PipelineState::Loading;
        info!("Pipeline state: Idle -> Loading");
        Ok(RunGuard { cell: self })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PipelineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive claim on a pipeline for one run. Dropping it returns the
/// pipeline to `Idle`, whichever state the run ended in.
#[derive(Debug)]
pub struct RunGuard<'a> {
    cell: &'a StateCell,
}

impl RunGuard<'_> {
    pub fn advance(&self, next: PipelineState) {
        let mut state = self.cell.lock();
        debug_assert!(
            state.can_transition_to(next),
            "illegal transition {} -> {}",
            *state,
            next
        );
        info!("Pipeline state: {} -> {}", *state, next);
        *state = next;
    }

    pub fn state(&self) -> PipelineState {
        self.cell.get()
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.cell.lock();
        if state.is_active() {
            info!("Pipeline state: {} -> Idle", *state);
            *state = PipelineState::Idle;
        }
    }
}

use tokio::sync::watch;

/// Externally observable progress of the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub percent: u8,
    pub running: bool,
}

/// Single writer for [`Progress`]. Within a run the percentage only moves
/// forward and stays at or below 99 until [`ProgressTracker::complete`].
#[derive(Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<Progress>,
}

pub const CAP_BEFORE_COMPLETE: u8 = 99;

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Progress::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.tx.subscribe()
    }

    pub fn start(&self) {
        self.tx.send_replace(Progress {
            percent: 0,
            running: true,
        });
    }

    pub fn advance(&self, percent: u8) {
        let percent = percent.min(CAP_BEFORE_COMPLETE);
        self.tx.send_if_modified(|p| {
            if percent > p.percent {
                p.percent = percent;
                true
            } else {
                false
            }
        });
    }

    pub fn complete(&self) {
        self.tx.send_modify(|p| p.percent = 100);
    }

    pub fn finish(&self) {
        self.tx.send_modify(|p| p.running = false);
    }

    pub fn reset(&self) {
        self.tx.send_replace(Progress::default());
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_moves_backwards_and_caps_at_99() {
        let tracker = ProgressTracker::new();
        let rx = tracker.subscribe();
        tracker.start();
        tracker.advance(40);
        tracker.advance(20);
        assert_eq!(rx.borrow().percent, 40);

        tracker.advance(100);
        assert_eq!(rx.borrow().percent, 99);

        tracker.complete();
        assert_eq!(
            *rx.borrow(),
            Progress {
                percent: 100,
                running: true
            }
        );
        tracker.finish();
        assert!(!rx.borrow().running);
    }

    #[test]
    fn reset_clears_both_fields() {
        let tracker = ProgressTracker::new();
        let rx = tracker.subscribe();
        tracker.start();
        tracker.advance(55);
        tracker.reset();
        assert_eq!(*rx.borrow(), Progress::default());
    }
}

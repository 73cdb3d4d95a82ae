use std::time::Duration;

/// Fixed-rate sample clock over a source duration
///
/// Sample `k` sits at `k / rate` and every sample is strictly before the end
/// of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleClock {
    rate: u32,
    total: u64,
}

impl SampleClock {
    pub fn new(duration: Duration, rate: u32) -> Self {
        let rate = rate.max(1);
        let secs = duration.as_secs_f64();
        let mut total = (secs * f64::from(rate)).ceil() as u64;
        // float noise can push an exact multiple one sample past the end
        while total > 0 && (total - 1) as f64 / f64::from(rate) >= secs {
            total -= 1;
        }
        Self { rate, total }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn timestamp(&self, sample: u64) -> Duration {
        Duration::from_secs_f64(sample as f64 / f64::from(self.rate))
    }

    pub fn timestamps(&self) -> impl Iterator<Item = (u64, Duration)> + '_ {
        (0..self.total).map(move |k| (k, self.timestamp(k)))
    }

    /// floor(min(done / total * 100, 99))
    pub fn percent_after(&self, done: u64) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let percent = (done as f64 / self.total as f64 * 100.0).min(99.0);
        percent.floor() as u8
    }

    /// Length of the output once every sample is rendered
    pub fn output_duration(&self) -> Duration {
        self.timestamp(self.total)
    }
}

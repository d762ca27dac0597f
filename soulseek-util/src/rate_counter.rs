use std::time::{Duration, Instant};

/// Tracks a rolling bytes-per-second rate, grounded on the teacher's
/// `Tracker`/`RateCounter` pairing in `p2p::conn` (sent/received byte
/// counters consulted by transfer progress and diagnostics).
pub struct RateCounter {
    window: Duration,
    samples: Vec<(Instant, u64)>,
    total: u64,
}

impl RateCounter {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(5))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            samples: Vec::new(),
            total: 0,
        }
    }

    pub fn inc(&mut self, bytes: u64) {
        self.total += bytes;
        self.samples.push((Instant::now(), bytes));
        self.evict();
    }

    /// Like `inc` but for bulk/attachment traffic that shouldn't dominate the
    /// rate estimate (mirrors the teacher's `inc_quiet_received`).
    pub fn inc_quiet(&mut self, bytes: u64) {
        self.total += bytes;
    }

    fn evict(&mut self) {
        let cutoff = Instant::now() - self.window;
        self.samples.retain(|(at, _)| *at >= cutoff);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Average bytes/sec over the trailing window.
    pub fn rate(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let bytes: u64 = self.samples.iter().map(|(_, b)| *b).sum();
        bytes as f64 / self.window.as_secs_f64()
    }
}

impl Default for RateCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_total() {
        let mut rc = RateCounter::new();
        rc.inc(100);
        rc.inc(50);
        assert_eq!(rc.total(), 150);
        assert!(rc.rate() > 0.0);
    }
}

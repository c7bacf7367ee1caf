use std::time::Instant;

/// A simple rolling byte-rate tracker.
///
/// Grounded on `thrill::common::Aggregate`'s running-statistics shape, but
/// narrowed to what the profiler needs from the pool: bytes moved since the
/// last sample, divided by elapsed wall time.
#[derive(Debug)]
pub struct RateTracker {
    bytes_since_sample: u64,
    last_sample: Instant,
}

impl RateTracker {
    pub fn new() -> Self {
        Self {
            bytes_since_sample: 0,
            last_sample: Instant::now(),
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.bytes_since_sample += bytes;
    }

    /// Returns bytes/sec since the last call to `sample`, then resets.
    pub fn sample(&mut self) -> f64 {
        let elapsed = self.last_sample.elapsed().as_secs_f64();
        let bytes = std::mem::take(&mut self.bytes_since_sample);
        self.last_sample = Instant::now();

        if elapsed <= 0.0 {
            0.0
        } else {
            bytes as f64 / elapsed
        }
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}

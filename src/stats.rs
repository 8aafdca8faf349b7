//! Latency/upload-time statistics, replacing the original's ImGui plotting
//! with `hdrhistogram` so a host application can surface percentiles through
//! whatever overlay it has (explicitly out of scope here).
//!
//! Not wired into `StreamerController::queries_end` automatically — a host
//! that wants these numbers records them around its own calls into the
//! controller, e.g. timing `queries_end` itself or each `cache_mips` install.

use std::time::Duration;

use hdrhistogram::Histogram;

/// Tracks the distribution of per-frame `queries_end` durations and of
/// individual mip-install ("upload") durations.
pub struct StreamerStats {
    frame_times_us: Histogram<u64>,
    upload_times_us: Histogram<u64>,
}

impl Default for StreamerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamerStats {
    /// Tracks up to one hour of microsecond-resolution samples with 3
    /// significant decimal digits, matching the precision a frame-time
    /// overlay typically needs.
    pub fn new() -> Self {
        let max_value = Duration::from_secs(3600).as_micros() as u64;
        Self {
            frame_times_us: Histogram::new_with_bounds(1, max_value, 3).expect("valid histogram bounds"),
            upload_times_us: Histogram::new_with_bounds(1, max_value, 3).expect("valid histogram bounds"),
        }
    }

    pub fn record_frame(&mut self, elapsed: Duration) {
        let _ = self.frame_times_us.record(elapsed.as_micros() as u64);
    }

    pub fn record_upload(&mut self, elapsed: Duration) {
        let _ = self.upload_times_us.record(elapsed.as_micros() as u64);
    }

    pub fn frame_time_percentile(&self, percentile: f64) -> Duration {
        Duration::from_micros(self.frame_times_us.value_at_percentile(percentile))
    }

    pub fn upload_time_percentile(&self, percentile: f64) -> Duration {
        Duration::from_micros(self.upload_times_us.value_at_percentile(percentile))
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_times_us.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_reflect_recorded_samples() {
        let mut stats = StreamerStats::new();
        for ms in [1, 2, 3, 4, 20] {
            stats.record_frame(Duration::from_millis(ms));
        }
        assert_eq!(stats.frame_count(), 5);
        // The max recorded sample must be a lower bound for p100.
        assert!(stats.frame_time_percentile(100.0) >= Duration::from_millis(20));
        assert!(stats.frame_time_percentile(0.0) <= Duration::from_millis(1));
    }

    #[test]
    fn upload_and_frame_histograms_are_independent() {
        let mut stats = StreamerStats::new();
        stats.record_frame(Duration::from_millis(16));
        stats.record_upload(Duration::from_millis(4));
        assert_eq!(stats.frame_count(), 1);
        assert!(stats.upload_time_percentile(100.0) >= Duration::from_millis(4));
    }
}

//! Speed Measurement
//!
//! Estimates instantaneous input speed from the most recent samples. Speed is
//! the magnitude travelled since the oldest sample inside the window, divided
//! by the time elapsed since that sample. A lone sample after rest is spread
//! over the whole window.

use crate::utils::circular_buffer::CircularBuffer;

/// Number of samples kept for speed estimation
pub const SPEED_SAMPLES: usize = 16;

/// Floor for the elapsed time between two samples (1 ms)
const MIN_ELAPSED_NS: u64 = 1_000_000;

/// Sliding-window speed estimator
#[derive(Debug, Clone)]
pub struct SpeedMeter {
    /// `(timestamp_ns, magnitude)` samples
    samples: CircularBuffer<(u64, f64), SPEED_SAMPLES>,

    /// Samples older than this relative to the newest are ignored
    window_ns: u64,
}

impl SpeedMeter {
    /// Create a meter averaging over `window_ms`
    pub fn new(window_ms: u64) -> Self {
        Self {
            samples: CircularBuffer::new(),
            window_ns: window_ms.max(1) * 1_000_000,
        }
    }

    /// Record a sample and return the speed in units per second
    pub fn record(&mut self, timestamp_ns: u64, magnitude: f64) -> f64 {
        let magnitude = if magnitude.is_finite() {
            magnitude.abs()
        } else {
            0.0
        };

        // Out-of-order timestamps restart measurement
        if let Some((last, _)) = self.samples.newest() {
            if timestamp_ns < last {
                self.samples.clear();
            }
        }

        self.samples.push((timestamp_ns, magnitude));
        self.speed()
    }

    /// Current speed estimate in units per second
    pub fn speed(&self) -> f64 {
        let Some((newest, _)) = self.samples.newest() else {
            return 0.0;
        };
        let cutoff = newest.saturating_sub(self.window_ns);

        let mut window = self.samples.iter().filter(|(ts, _)| *ts >= cutoff);
        let Some((oldest, first)) = window.next() else {
            return 0.0;
        };
        let (count, total) = window.fold((1usize, 0.0), |(n, sum), (_, m)| (n + 1, sum + m));

        // Motion after rest: spread the lone sample over the whole window
        if count == 1 {
            return first / (self.window_ns as f64 / 1_000_000_000.0);
        }

        // The oldest sample only marks where the interval starts
        let elapsed_ns = (newest - oldest).max(MIN_ELAPSED_NS);
        total / (elapsed_ns as f64 / 1_000_000_000.0)
    }

    /// Drop all samples
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_meter_is_zero() {
        let meter = SpeedMeter::new(50);
        assert_eq!(meter.speed(), 0.0);
    }

    #[test]
    fn test_constant_rate() {
        let mut meter = SpeedMeter::new(100);
        // 10 units every 10 ms
        for i in 0..5u64 {
            meter.record(i * 10_000_000, 10.0);
        }
        // 40 units over 40 ms
        assert!((meter.speed() - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_old_samples_leave_window() {
        let mut meter = SpeedMeter::new(20);
        meter.record(0, 1000.0);
        meter.record(100_000_000, 1.0);
        meter.record(110_000_000, 1.0);

        // Only the two recent samples count: 1 unit over 10 ms
        assert!((meter.speed() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_and_reordering() {
        let mut meter = SpeedMeter::new(50);
        meter.record(50_000_000, 5.0);
        meter.record(10_000_000, 1.0);
        // Backwards timestamp cleared history: single sample over the window
        assert!((meter.speed() - 20.0).abs() < 1e-6);

        meter.reset();
        assert_eq!(meter.speed(), 0.0);
    }
}

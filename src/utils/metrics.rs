//! Pipeline Metrics
//!
//! Counters and a latency histogram for the event tap pipeline:
//! - Event counts (processed, passed through, suppressed)
//! - Emission outcomes (emitted, refused, retried, dropped)
//! - Scheduler ticks and skipped ticks
//! - Per-event processing latency
//!
//! Counters are lock-free atomics so the tap thread never waits on a reader.
//! Latency is kept in a fixed window of recent samples; recording takes a
//! `parking_lot` mutex that readers hold only while copying the window.
//!
//! Snapshots can be exported as JSON.

use crate::utils::circular_buffer::CircularBuffer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// Number of latency samples kept
pub const LATENCY_WINDOW: usize = 1024;

/// Metrics shared between the tap thread and observers
pub struct PipelineMetrics {
    events_processed: AtomicU64,
    events_passthrough: AtomicU64,
    events_suppressed: AtomicU64,
    emissions: AtomicU64,
    emissions_refused: AtomicU64,
    emissions_retried: AtomicU64,
    emissions_dropped: AtomicU64,
    ticks: AtomicU64,
    ticks_skipped: AtomicU64,
    faults_recovered: AtomicU64,
    reloads_adopted: AtomicU64,
    latency_us: Mutex<CircularBuffer<f64, LATENCY_WINDOW>>,
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create zeroed metrics
    pub fn new() -> Self {
        Self {
            events_processed: AtomicU64::new(0),
            events_passthrough: AtomicU64::new(0),
            events_suppressed: AtomicU64::new(0),
            emissions: AtomicU64::new(0),
            emissions_refused: AtomicU64::new(0),
            emissions_retried: AtomicU64::new(0),
            emissions_dropped: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            faults_recovered: AtomicU64::new(0),
            reloads_adopted: AtomicU64::new(0),
            latency_us: Mutex::new(CircularBuffer::new()),
            start_time: Instant::now(),
        }
    }

    /// Raw event entered the pipeline
    pub fn record_event(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Event forwarded unmodified
    pub fn record_passthrough(&self) {
        self.events_passthrough.fetch_add(1, Ordering::Relaxed);
    }

    /// Event consumed without output
    pub fn record_suppressed(&self) {
        self.events_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Emission reached the sink
    pub fn record_emission(&self) {
        self.emissions.fetch_add(1, Ordering::Relaxed);
    }

    /// Coordinator refused an emission
    pub fn record_refused(&self) {
        self.emissions_refused.fetch_add(1, Ordering::Relaxed);
    }

    /// Parked emission retried
    pub fn record_retry(&self) {
        self.emissions_retried.fetch_add(1, Ordering::Relaxed);
    }

    /// Emission dropped for good
    pub fn record_dropped(&self) {
        self.emissions_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Scheduler tick processed
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Scheduler tick skipped because the tap channel was full
    pub fn record_tick_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Internal fault degraded to pass-through
    pub fn record_fault(&self) {
        self.faults_recovered.fetch_add(1, Ordering::Relaxed);
    }

    /// New configuration adopted
    pub fn record_reload(&self) {
        self.reloads_adopted.fetch_add(1, Ordering::Relaxed);
    }

    /// Per-event processing time
    pub fn record_latency(&self, elapsed: Duration) {
        self.latency_us.lock().push(elapsed.as_secs_f64() * 1_000_000.0);
    }

    /// Latency statistics over the recent window (microseconds)
    pub fn latency_stats(&self) -> HistogramStats {
        let window = self.latency_us.lock().clone();
        HistogramStats::from_samples(window.iter())
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: SystemTime::now(),
            uptime: self.start_time.elapsed(),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_passthrough: self.events_passthrough.load(Ordering::Relaxed),
            events_suppressed: self.events_suppressed.load(Ordering::Relaxed),
            emissions: self.emissions.load(Ordering::Relaxed),
            emissions_refused: self.emissions_refused.load(Ordering::Relaxed),
            emissions_retried: self.emissions_retried.load(Ordering::Relaxed),
            emissions_dropped: self.emissions_dropped.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            faults_recovered: self.faults_recovered.load(Ordering::Relaxed),
            reloads_adopted: self.reloads_adopted.load(Ordering::Relaxed),
            latency_us: self.latency_stats(),
        }
    }

    /// Export metrics as JSON
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate percentile from sorted values (inclusive, lower index)
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let index = ((sorted_values.len() - 1) as f64 * p) as usize;
    sorted_values[index.min(sorted_values.len() - 1)]
}

/// Distribution statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramStats {
    /// Number of observations
    pub count: u64,
    /// Sum of observations
    pub sum: f64,
    /// Minimum
    pub min: f64,
    /// Maximum
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Standard deviation
    pub stddev: f64,
    /// Median
    pub p50: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

impl HistogramStats {
    /// Compute statistics from samples
    pub fn from_samples(samples: impl Iterator<Item = f64>) -> Self {
        let mut sorted: Vec<f64> = samples.filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Self::default();
        }
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let mean = sum / count as f64;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Self {
            count: count as u64,
            sum,
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            stddev: variance.sqrt(),
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
        }
    }
}

/// Point-in-time snapshot of pipeline metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When this snapshot was taken
    pub timestamp: SystemTime,
    /// Time since metrics creation
    pub uptime: Duration,
    /// Raw events entering the pipeline
    pub events_processed: u64,
    /// Events forwarded unmodified
    pub events_passthrough: u64,
    /// Events consumed without output
    pub events_suppressed: u64,
    /// Emissions delivered to the sink
    pub emissions: u64,
    /// Emissions refused by the coordinator
    pub emissions_refused: u64,
    /// Parked emissions retried
    pub emissions_retried: u64,
    /// Emissions dropped after retry
    pub emissions_dropped: u64,
    /// Scheduler ticks processed
    pub ticks: u64,
    /// Scheduler ticks skipped
    pub ticks_skipped: u64,
    /// Faults that degraded to pass-through
    pub faults_recovered: u64,
    /// Configuration snapshots adopted
    pub reloads_adopted: u64,
    /// Per-event processing latency (microseconds)
    pub latency_us: HistogramStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = PipelineMetrics::new();
        metrics.record_event();
        metrics.record_event();
        metrics.record_passthrough();
        metrics.record_dropped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_processed, 2);
        assert_eq!(snapshot.events_passthrough, 1);
        assert_eq!(snapshot.emissions_dropped, 1);
        assert_eq!(snapshot.emissions, 0);
    }

    #[test]
    fn test_latency_window() {
        let metrics = PipelineMetrics::new();
        for us in [10, 20, 30] {
            metrics.record_latency(Duration::from_micros(us));
        }

        let stats = metrics.latency_stats();
        assert_eq!(stats.count, 3);
        assert!((stats.min - 10.0).abs() < 0.01);
        assert!((stats.max - 30.0).abs() < 0.01);
        assert!((stats.mean - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let metrics = PipelineMetrics::new();
        for _ in 0..(LATENCY_WINDOW + 100) {
            metrics.record_latency(Duration::from_micros(5));
        }
        assert_eq!(metrics.latency_stats().count, LATENCY_WINDOW as u64);
    }

    #[test]
    fn test_percentile() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];

        assert_eq!(percentile(&values, 0.50), 5.0);
        assert_eq!(percentile(&values, 0.95), 9.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_json_export() {
        let metrics = PipelineMetrics::new();
        metrics.record_tick();
        let json = metrics.export_json().unwrap();
        assert!(json.contains("\"ticks\": 1"));
    }
}

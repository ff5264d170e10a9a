//! Monotonic Time Source
//!
//! The tap thread stamps every raw event with `Clock::now_ns`. Production uses
//! `MonotonicClock`; tests drive a `ManualClock` so speed measurement and
//! idle timeouts are deterministic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic nanosecond timestamps
pub trait Clock: Send {
    /// Nanoseconds since an arbitrary fixed epoch
    fn now_ns(&self) -> u64;
}

/// Clock backed by `std::time::Instant`
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    /// Create a clock whose epoch is now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

/// Manually advanced clock
///
/// Clones share the same time, so a test can keep a handle while the
/// pipeline owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current_ns: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to an absolute time
    pub fn set_ns(&self, ns: u64) {
        self.current_ns.store(ns, Ordering::Release);
    }

    /// Advance by `delta_ns`
    pub fn advance_ns(&self, delta_ns: u64) {
        self.current_ns.fetch_add(delta_ns, Ordering::AcqRel);
    }

    /// Advance by whole milliseconds
    pub fn advance_ms(&self, delta_ms: u64) {
        self.advance_ns(delta_ms * 1_000_000);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.current_ns.load(Ordering::Acquire)
    }
}

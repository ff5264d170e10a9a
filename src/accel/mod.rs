//! Pointer Acceleration
//!
//! Speed-dependent gain for relative pointer motion.
//!
//! # Model
//!
//! ```text
//! speed = Σ|delta| / elapsed          (px/s over a short window)
//! out   = delta × gain(speed) × sensitivity
//! ```
//!
//! `gain` comes from an `AccelerationTable` fitted to the configured
//! `[speed, gain]` samples. The table is owned by the device registry and
//! passed in per call, so a rebuild takes effect on the next event.
//!
//! Fractional output is carried by a `VectorSubPixelator`. Motion that
//! resumes after the speed window has elapsed starts a new session with
//! cleared remainders.

pub mod regression;
pub mod speed;
pub mod table;

pub use regression::{FitError, PolynomialRegression};
pub use speed::SpeedMeter;
pub use table::{AccelerationTable, CurveSource};

use crate::input::subpixel::VectorSubPixelator;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Pointer acceleration profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerConfig {
    /// `[speed (px/s), gain]` samples
    #[serde(default = "default_pointer_acceleration")]
    pub acceleration: Vec<[f64; 2]>,

    /// Polynomial degree for the fitted curve
    #[serde(default = "default_pointer_degree")]
    pub degree: usize,

    /// Constant factor applied on top of the curve
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,

    /// Speed measurement window (ms)
    #[serde(default = "default_pointer_window_ms")]
    pub speed_window_ms: u64,
}

fn default_pointer_acceleration() -> Vec<[f64; 2]> {
    vec![
        [0.0, 1.0],
        [400.0, 1.0],
        [1200.0, 1.6],
        [2400.0, 2.2],
        [4800.0, 2.6],
    ]
}

fn default_pointer_degree() -> usize {
    3
}

fn default_sensitivity() -> f64 {
    1.0
}

fn default_pointer_window_ms() -> u64 {
    50
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            acceleration: default_pointer_acceleration(),
            degree: default_pointer_degree(),
            sensitivity: default_sensitivity(),
            speed_window_ms: default_pointer_window_ms(),
        }
    }
}

impl PointerConfig {
    /// Samples as `(speed, gain)` tuples
    pub fn acceleration_samples(&self) -> Vec<(f64, f64)> {
        self.acceleration.iter().map(|s| (s[0], s[1])).collect()
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<(), String> {
        if self.degree >= self.acceleration.len() {
            return Err(format!(
                "pointer degree {} needs more than {} samples",
                self.degree,
                self.acceleration.len()
            ));
        }
        if !(self.sensitivity > 0.0) || !self.sensitivity.is_finite() {
            return Err(format!(
                "pointer sensitivity must be positive, got {}",
                self.sensitivity
            ));
        }
        if self.speed_window_ms == 0 {
            return Err("pointer speed_window_ms must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Per-device pointer accelerator
#[derive(Debug, Clone)]
pub struct PointerAccelerator {
    speed: SpeedMeter,
    subpixel: VectorSubPixelator,
    sensitivity: f64,
    window_ns: u64,
    last_event_at_ns: Option<u64>,
}

impl PointerAccelerator {
    /// Create an accelerator for `config`
    pub fn new(config: &PointerConfig) -> Self {
        Self {
            speed: SpeedMeter::new(config.speed_window_ms),
            subpixel: VectorSubPixelator::new(),
            sensitivity: config.sensitivity,
            window_ns: config.speed_window_ms.max(1) * 1_000_000,
            last_event_at_ns: None,
        }
    }

    /// Scale `delta` by the gain at the current speed
    ///
    /// Returns whole pixels; the fraction is carried to the next call.
    pub fn accelerate(
        &mut self,
        delta: [f64; 2],
        timestamp_ns: u64,
        table: &AccelerationTable,
    ) -> [i32; 2] {
        let [dx, dy] = delta;
        if !dx.is_finite() || !dy.is_finite() {
            return [0, 0];
        }

        let resumed = match self.last_event_at_ns {
            Some(last) => timestamp_ns.saturating_sub(last) > self.window_ns,
            None => true,
        };
        if resumed {
            self.reset();
        }
        self.last_event_at_ns = Some(timestamp_ns);

        let speed = self.speed.record(timestamp_ns, dx.hypot(dy));
        let gain = table.lookup(speed) * self.sensitivity;
        trace!("Pointer speed {:.1} px/s, gain {:.3}", speed, gain);

        self.subpixel.accumulate([dx * gain, dy * gain])
    }

    /// Measured speed (px/s)
    pub fn speed(&self) -> f64 {
        self.speed.speed()
    }

    /// Carried fractional remainder
    pub fn remainder(&self) -> [f64; 2] {
        self.subpixel.remainder()
    }

    /// Forget speed history and remainders
    pub fn reset(&mut self) {
        self.speed.reset();
        self.subpixel.reset();
        self.last_event_at_ns = None;
    }
}

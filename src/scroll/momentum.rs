//! Inertial Scrolling
//!
//! Geometric decay of the last delta of a gesture:
//!
//! ```text
//! v(n+1) = v(n) * decay        until |v| < min_magnitude
//! ```
//!
//! One step is taken per scheduler tick, so the cadence of momentum events
//! equals the tick interval.

use serde::{Deserialize, Serialize};

/// Momentum parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumConfig {
    /// Emit momentum after a gesture ends
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Minimum magnitude of the last delta that starts momentum
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: f64,

    /// Per-tick decay factor (0.0-1.0 exclusive)
    #[serde(default = "default_decay")]
    pub decay: f64,

    /// Momentum stops once a delta falls below this magnitude
    #[serde(default = "default_min_magnitude")]
    pub min_magnitude: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_trigger_threshold() -> f64 {
    3.0
}

fn default_decay() -> f64 {
    0.85
}

fn default_min_magnitude() -> f64 {
    0.25
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            trigger_threshold: default_trigger_threshold(),
            decay: default_decay(),
            min_magnitude: default_min_magnitude(),
        }
    }
}

impl MomentumConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<(), String> {
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(format!("momentum decay must be in (0, 1), got {}", self.decay));
        }
        if !(self.min_magnitude > 0.0) || !self.min_magnitude.is_finite() {
            return Err(format!(
                "momentum min_magnitude must be positive, got {}",
                self.min_magnitude
            ));
        }
        if !(self.trigger_threshold >= 0.0) || !self.trigger_threshold.is_finite() {
            return Err(format!(
                "momentum trigger_threshold must be non-negative, got {}",
                self.trigger_threshold
            ));
        }
        Ok(())
    }
}

/// Decaying velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Momentum {
    velocity: [f64; 2],
    decay: f64,
    min_magnitude: f64,
}

impl Momentum {
    /// Start momentum from the last delta, if it is strong enough
    pub fn start(last_delta: [f64; 2], config: &MomentumConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let magnitude = last_delta[0].hypot(last_delta[1]);
        if !magnitude.is_finite() || magnitude < config.trigger_threshold {
            return None;
        }
        Some(Self {
            velocity: last_delta,
            decay: config.decay,
            min_magnitude: config.min_magnitude,
        })
    }

    /// Next synthetic delta, or `None` once it decayed below the minimum
    pub fn next(&mut self) -> Option<[f64; 2]> {
        self.velocity = [self.velocity[0] * self.decay, self.velocity[1] * self.decay];
        if self.velocity[0].hypot(self.velocity[1]) < self.min_magnitude {
            None
        } else {
            Some(self.velocity)
        }
    }

    /// Current velocity
    pub fn velocity(&self) -> [f64; 2] {
        self.velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: f64) -> MomentumConfig {
        MomentumConfig {
            enabled: true,
            trigger_threshold: threshold,
            decay: 0.5,
            min_magnitude: 1.0,
        }
    }

    #[test]
    fn test_below_threshold_does_not_start() {
        assert!(Momentum::start([0.0, 2.0], &config(3.0)).is_none());
        assert!(Momentum::start([0.0, 3.0], &config(3.0)).is_some());
    }

    #[test]
    fn test_disabled() {
        let mut cfg = config(0.0);
        cfg.enabled = false;
        assert!(Momentum::start([0.0, 100.0], &cfg).is_none());
    }

    #[test]
    fn test_geometric_decay_terminates() {
        let mut m = Momentum::start([0.0, 8.0], &config(1.0)).unwrap();
        assert_eq!(m.next(), Some([0.0, 4.0]));
        assert_eq!(m.next(), Some([0.0, 2.0]));
        assert_eq!(m.next(), Some([0.0, 1.0]));
        assert_eq!(m.next(), None);
    }

    #[test]
    fn test_validate() {
        assert!(MomentumConfig::default().validate().is_ok());
        let mut cfg = MomentumConfig::default();
        cfg.decay = 1.0;
        assert!(cfg.validate().is_err());
    }
}

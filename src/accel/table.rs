//! Acceleration Table
//!
//! Maps instantaneous input speed to a gain. Built once per device class and
//! configuration, then shared read-only; a rebuild produces a new table that
//! replaces the old one wholesale.
//!
//! # Construction
//!
//! ```text
//! samples ──validate──> PolynomialRegression::fit(degree)
//!                              │ ok                 │ FitError
//!                              ▼                    ▼
//!                    render dense curve      piecewise-linear
//!                              │                    ▲
//!                     monotone in range? ── no ─────┘
//!                              │ yes
//!                              ▼
//!                   running max + clamp to [min_gain, max_gain]
//! ```
//!
//! The rendered curve is a dense grid of `CURVE_RESOLUTION` knots over the
//! sampled speed range. `lookup` interpolates linearly between knots, so the
//! result is monotonic non-decreasing by construction.

use crate::accel::regression::PolynomialRegression;
use crate::input::error::{recovery_action, PipelineError, RecoveryAction, Result};
use tracing::{debug, warn};

/// Number of knots in the rendered curve
pub const CURVE_RESOLUTION: usize = 256;

/// Largest decrease (relative to the gain span) tolerated as numeric noise
const MONOTONE_TOLERANCE: f64 = 1e-6;

/// Where the rendered curve came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveSource {
    /// Fitted polynomial passed the monotonicity check
    Polynomial,
    /// Fit failed or was non-monotone; raw samples interpolated
    PiecewiseLinear,
}

/// Speed → gain lookup structure
#[derive(Debug, Clone)]
pub struct AccelerationTable {
    /// Raw `(speed, gain)` samples, speed strictly increasing
    samples: Vec<(f64, f64)>,

    /// Fitted coefficients (empty when the fit was rejected)
    coefficients: Vec<f64>,

    /// Dense curve knots `(speed, gain)`
    curve: Vec<(f64, f64)>,

    min_gain: f64,
    max_gain: f64,
    source: CurveSource,
}

impl AccelerationTable {
    /// Build a table from samples, fitting a polynomial of `degree`
    pub fn build(samples: &[(f64, f64)], degree: usize) -> Result<Self> {
        validate_samples(samples)?;

        let min_gain = samples.iter().map(|s| s.1).fold(f64::INFINITY, f64::min);
        let max_gain = samples
            .iter()
            .map(|s| s.1)
            .fold(f64::NEG_INFINITY, f64::max);

        let (coefficients, curve, source) = match PolynomialRegression::fit(samples, degree) {
            Ok(fit) => {
                let rendered = render(samples, |x| fit.evaluate(x));
                if is_monotone(&rendered, max_gain - min_gain) {
                    (fit.coefficients().to_vec(), rendered, CurveSource::Polynomial)
                } else {
                    debug!(
                        "Fitted degree-{} curve is not monotone over sampled range, using linear interpolation",
                        degree
                    );
                    (
                        Vec::new(),
                        render(samples, |x| interpolate(samples, x)),
                        CurveSource::PiecewiseLinear,
                    )
                }
            }
            Err(e) => {
                let error = PipelineError::from(e);
                if recovery_action(&error, 0) != RecoveryAction::FallbackLinear {
                    return Err(error);
                }
                warn!("{}, using linear interpolation", error);
                (
                    Vec::new(),
                    render(samples, |x| interpolate(samples, x)),
                    CurveSource::PiecewiseLinear,
                )
            }
        };

        let curve = finalize(curve, min_gain, max_gain);

        Ok(Self {
            samples: samples.to_vec(),
            coefficients,
            curve,
            min_gain,
            max_gain,
            source,
        })
    }

    /// Table with a constant gain at every speed
    pub fn flat(gain: f64) -> Self {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 1.0 };
        let samples = vec![(0.0, gain), (1.0, gain)];
        Self {
            curve: samples.clone(),
            samples,
            coefficients: vec![gain],
            min_gain: gain,
            max_gain: gain,
            source: CurveSource::Polynomial,
        }
    }

    /// Gain at `speed`
    ///
    /// Always finite, non-negative and monotonic non-decreasing in `speed`.
    pub fn lookup(&self, speed: f64) -> f64 {
        let speed = if speed.is_nan() { 0.0 } else { speed.max(0.0) };

        let first = self.curve[0];
        let last = self.curve[self.curve.len() - 1];

        let gain = if speed <= first.0 {
            first.1
        } else if speed >= last.0 {
            last.1
        } else {
            // First knot with x > speed; guaranteed in 1..len by the guards above
            let upper = self.curve.partition_point(|&(x, _)| x <= speed);
            let (x0, y0) = self.curve[upper - 1];
            let (x1, y1) = self.curve[upper];
            if x1 <= x0 {
                y1
            } else {
                y0 + (y1 - y0) * (speed - x0) / (x1 - x0)
            }
        };

        gain.clamp(self.min_gain, self.max_gain)
    }

    /// Raw samples the table was built from
    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }

    /// Fitted coefficients (empty when interpolating)
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Lowest gain in the sample table
    pub fn min_gain(&self) -> f64 {
        self.min_gain
    }

    /// Highest gain in the sample table
    pub fn max_gain(&self) -> f64 {
        self.max_gain
    }

    /// Curve origin
    pub fn source(&self) -> CurveSource {
        self.source
    }
}

/// Check the invariants every sample table must satisfy
pub fn validate_samples(samples: &[(f64, f64)]) -> Result<()> {
    if samples.len() < 2 {
        return Err(PipelineError::InvalidTable(format!(
            "need at least 2 samples, got {}",
            samples.len()
        )));
    }

    for (i, &(speed, gain)) in samples.iter().enumerate() {
        if !speed.is_finite() || !gain.is_finite() {
            return Err(PipelineError::InvalidTable(format!(
                "sample {} is not finite",
                i
            )));
        }
        if speed < 0.0 || gain < 0.0 {
            return Err(PipelineError::InvalidTable(format!(
                "sample {} is negative ({}, {})",
                i, speed, gain
            )));
        }
    }

    for (i, pair) in samples.windows(2).enumerate() {
        if pair[1].0 <= pair[0].0 {
            return Err(PipelineError::InvalidTable(format!(
                "speeds must be strictly increasing (sample {} -> {})",
                i,
                i + 1
            )));
        }
        if pair[1].1 < pair[0].1 {
            return Err(PipelineError::InvalidTable(format!(
                "gains must not decrease (sample {} -> {})",
                i,
                i + 1
            )));
        }
    }

    Ok(())
}

/// Piecewise-linear interpolation over raw samples
fn interpolate(samples: &[(f64, f64)], x: f64) -> f64 {
    let first = samples[0];
    let last = samples[samples.len() - 1];
    if x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }
    let upper = samples.partition_point(|&(sx, _)| sx <= x);
    let (x0, y0) = samples[upper - 1];
    let (x1, y1) = samples[upper];
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Sample `f` at evenly spaced knots spanning the sample range
fn render(samples: &[(f64, f64)], f: impl Fn(f64) -> f64) -> Vec<(f64, f64)> {
    let start = samples[0].0;
    let end = samples[samples.len() - 1].0;
    let step = (end - start) / (CURVE_RESOLUTION - 1) as f64;

    (0..CURVE_RESOLUTION)
        .map(|i| {
            let x = if i == CURVE_RESOLUTION - 1 {
                end
            } else {
                start + step * i as f64
            };
            (x, f(x))
        })
        .collect()
}

fn is_monotone(curve: &[(f64, f64)], span: f64) -> bool {
    let tolerance = MONOTONE_TOLERANCE * span.max(1.0);
    curve.iter().all(|(_, y)| y.is_finite())
        && curve.windows(2).all(|w| w[1].1 >= w[0].1 - tolerance)
}

/// Flatten residual dips and clamp into the sampled gain range
fn finalize(curve: Vec<(f64, f64)>, min_gain: f64, max_gain: f64) -> Vec<(f64, f64)> {
    let mut running = f64::NEG_INFINITY;
    curve
        .into_iter()
        .map(|(x, y)| {
            running = running.max(y.clamp(min_gain, max_gain));
            (x, running)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quadratic_lookup() {
        let samples = [(0.0, 0.0), (1.0, 1.0), (2.0, 4.0), (3.0, 9.0)];
        let table = AccelerationTable::build(&samples, 2).unwrap();

        assert_eq!(table.source(), CurveSource::Polynomial);
        assert!((table.lookup(1.5) - 2.25).abs() < 0.05);
        assert!((table.lookup(3.0) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamps_outside_range() {
        let samples = [(1.0, 0.5), (2.0, 1.0), (4.0, 2.0)];
        let table = AccelerationTable::build(&samples, 1).unwrap();

        assert!((table.lookup(0.0) - table.lookup(1.0)).abs() < 1e-12);
        assert!(table.lookup(1000.0) <= 2.0);
        assert!(table.lookup(-5.0) >= 0.5);
        assert!(table.lookup(f64::NAN).is_finite());
    }

    #[test]
    fn test_non_monotone_fit_falls_back() {
        // A high-degree fit through a step overshoots and dips
        let samples = [
            (0.0, 1.0),
            (1.0, 1.0),
            (2.0, 1.0),
            (3.0, 3.0),
            (4.0, 3.0),
            (5.0, 3.0),
        ];
        let table = AccelerationTable::build(&samples, 5).unwrap();

        assert_eq!(table.source(), CurveSource::PiecewiseLinear);
        assert!(table.coefficients().is_empty());
        assert!((table.lookup(2.5) - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_fit_error_falls_back() {
        let samples = [(0.0, 1.0), (10.0, 2.0)];
        // Two samples cannot determine a quartic; the fit error recovers
        let table = AccelerationTable::build(&samples, 4).unwrap();

        assert_eq!(table.source(), CurveSource::PiecewiseLinear);
        assert!(table.coefficients().is_empty());
        assert!((table.lookup(5.0) - 1.5).abs() < 0.01);
    }

    #[test]
    fn test_rejects_malformed_samples() {
        assert!(AccelerationTable::build(&[(0.0, 1.0)], 1).is_err());
        assert!(AccelerationTable::build(&[(1.0, 1.0), (1.0, 2.0)], 1).is_err());
        assert!(AccelerationTable::build(&[(0.0, 2.0), (1.0, 1.0)], 1).is_err());
        assert!(AccelerationTable::build(&[(0.0, -1.0), (1.0, 1.0)], 1).is_err());
        assert!(AccelerationTable::build(&[(0.0, 1.0), (f64::INFINITY, 2.0)], 1).is_err());
    }

    #[test]
    fn test_flat_table() {
        let table = AccelerationTable::flat(1.0);
        assert_eq!(table.lookup(0.0), 1.0);
        assert_eq!(table.lookup(500.0), 1.0);
    }

    fn sample_table() -> impl Strategy<Value = Vec<(f64, f64)>> {
        prop::collection::vec((0.01f64..50.0, 0.0f64..5.0), 2..10).prop_map(|steps| {
            let mut speed = 0.0;
            let mut gain = 0.0;
            steps
                .into_iter()
                .map(|(ds, dg)| {
                    speed += ds;
                    gain += dg;
                    (speed, gain)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_lookup_is_monotone(
            samples in sample_table(),
            degree in 1usize..6,
            a in 0.0f64..600.0,
            b in 0.0f64..600.0,
        ) {
            let table = AccelerationTable::build(&samples, degree).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let g_lo = table.lookup(lo);
            let g_hi = table.lookup(hi);

            prop_assert!(g_lo.is_finite() && g_lo >= 0.0);
            prop_assert!(g_hi >= g_lo);
        }
    }
}

//! Scroll Simulator
//!
//! Turns a stream of raw wheel/trackpad deltas into phase-tagged scroll
//! output.
//!
//! # Phases
//!
//! ```text
//!        delta                     delta
//! Idle ─────────> Began ─────────> Changed ──┐
//!  ▲                │                 ▲  │   │ delta
//!  │                │ idle timeout    │  └───┘
//!  │                ▼                 │
//!  │              Ended <─────────────┘ idle timeout
//!  │                │
//!  │    no momentum │ last |delta| ≥ trigger
//!  ├────────────────┤
//!  │                ▼
//!  └──────── Momentum ... MomentumEnded
//! ```
//!
//! The simulator is tick driven: the scheduler posts one tick per interval
//! and `idle_timeout_ticks` consecutive ticks without input end the gesture.
//! A zero delta is treated as an empty tick. A delta arriving during momentum
//! ends the momentum and opens a fresh gesture with reset remainders.
//!
//! # Per-delta transform
//!
//! ```text
//! raw ─> invert ─> modification ─> × gain(speed) ─> sub-pixelate ─> emit
//! ```
//!
//! Speed is wheel ticks per second over a short window.

use crate::accel::speed::SpeedMeter;
use crate::accel::table::AccelerationTable;
use crate::input::error::{PipelineError, Result};
use crate::input::event::ScrollPhase;
use crate::input::subpixel::VectorSubPixelator;
use crate::remap::action::ScrollModification;
use crate::scroll::momentum::{Momentum, MomentumConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Scroll profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollConfig {
    /// `[speed (ticks/s), gain]` samples
    #[serde(default = "default_scroll_acceleration")]
    pub acceleration: Vec<[f64; 2]>,

    /// Polynomial degree for the fitted curve
    #[serde(default = "default_scroll_degree")]
    pub degree: usize,

    /// Empty ticks before a gesture ends
    #[serde(default = "default_idle_timeout_ticks")]
    pub idle_timeout_ticks: u32,

    /// Speed measurement window (ms)
    #[serde(default = "default_speed_window_ms")]
    pub speed_window_ms: u64,

    /// Multiplier for `precise` scrolling
    #[serde(default = "default_precise_multiplier")]
    pub precise_multiplier: f64,

    /// Multiplier for `quick` scrolling
    #[serde(default = "default_quick_multiplier")]
    pub quick_multiplier: f64,

    /// Invert horizontal direction
    #[serde(default)]
    pub inverted_x: bool,

    /// Invert vertical direction
    #[serde(default)]
    pub inverted_y: bool,

    /// Inertial scrolling
    #[serde(default)]
    pub momentum: MomentumConfig,
}

fn default_scroll_acceleration() -> Vec<[f64; 2]> {
    vec![[0.0, 1.0], [15.0, 1.0], [30.0, 1.5], [60.0, 3.0]]
}

fn default_scroll_degree() -> usize {
    2
}

fn default_idle_timeout_ticks() -> u32 {
    6
}

fn default_speed_window_ms() -> u64 {
    250
}

fn default_precise_multiplier() -> f64 {
    0.25
}

fn default_quick_multiplier() -> f64 {
    3.0
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            acceleration: default_scroll_acceleration(),
            degree: default_scroll_degree(),
            idle_timeout_ticks: default_idle_timeout_ticks(),
            speed_window_ms: default_speed_window_ms(),
            precise_multiplier: default_precise_multiplier(),
            quick_multiplier: default_quick_multiplier(),
            inverted_x: false,
            inverted_y: false,
            momentum: MomentumConfig::default(),
        }
    }
}

impl ScrollConfig {
    /// Samples as `(speed, gain)` tuples
    pub fn acceleration_samples(&self) -> Vec<(f64, f64)> {
        self.acceleration.iter().map(|s| (s[0], s[1])).collect()
    }

    /// Check parameter ranges
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.idle_timeout_ticks == 0 {
            return Err("scroll idle_timeout_ticks must be at least 1".to_string());
        }
        if self.degree >= self.acceleration.len() {
            return Err(format!(
                "scroll degree {} needs more than {} samples",
                self.degree,
                self.acceleration.len()
            ));
        }
        for (name, value) in [
            ("precise_multiplier", self.precise_multiplier),
            ("quick_multiplier", self.quick_multiplier),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(format!("scroll {} must be positive, got {}", name, value));
            }
        }
        self.momentum.validate()
    }
}

/// Simulator input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollInput {
    /// Raw scroll delta in wheel ticks
    Delta {
        /// Horizontal delta
        dx: f64,
        /// Vertical delta
        dy: f64,
        /// Capture time
        timestamp_ns: u64,
    },
    /// Scheduler tick without input
    Tick,
    /// Terminate the gesture (incompatible gesture or reload)
    Cancel,
}

/// One phase-tagged output delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollStep {
    /// Horizontal delta
    pub dx: i32,
    /// Vertical delta
    pub dy: i32,
    /// Phase tag
    pub phase: ScrollPhase,
}

impl ScrollStep {
    /// Step with zero delta
    pub fn marker(phase: ScrollPhase) -> Self {
        Self { dx: 0, dy: 0, phase }
    }
}

/// Output of one transition (at most two steps)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutput {
    steps: [Option<ScrollStep>; 2],
}

impl StepOutput {
    /// Empty output
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, step: ScrollStep) {
        if let Some(slot) = self.steps.iter_mut().find(|s| s.is_none()) {
            *slot = Some(step);
        }
    }

    /// Steps in emission order
    pub fn iter(&self) -> impl Iterator<Item = ScrollStep> + '_ {
        self.steps.iter().flatten().copied()
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.iter().flatten().count()
    }

    /// True when nothing is emitted
    pub fn is_empty(&self) -> bool {
        self.steps[0].is_none()
    }
}

/// Snapshot of the active scroll session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSession {
    /// Last emitted phase
    pub phase: ScrollPhase,
    /// Carried sub-pixel remainder
    pub remainder: [f64; 2],
    /// First delta of the gesture
    pub started_at_ns: u64,
    /// Most recent delta
    pub last_event_at_ns: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SimPhase {
    Idle,
    Active { empty_ticks: u32 },
    Momentum(Momentum),
}

/// Apply inversion and a scroll modification to a raw delta
pub fn modify_delta(
    delta: [f64; 2],
    modification: Option<ScrollModification>,
    config: &ScrollConfig,
) -> [f64; 2] {
    let [mut dx, mut dy] = delta;
    if config.inverted_x {
        dx = -dx;
    }
    if config.inverted_y {
        dy = -dy;
    }

    match modification {
        None => [dx, dy],
        Some(ScrollModification::Precise) => {
            [dx * config.precise_multiplier, dy * config.precise_multiplier]
        }
        Some(ScrollModification::Quick) => [dx * config.quick_multiplier, dy * config.quick_multiplier],
        Some(ScrollModification::SwapAxes) => [dy, dx],
        Some(ScrollModification::Horizontal) => [dx + dy, 0.0],
    }
}

/// Per-device scroll state machine
#[derive(Debug, Clone)]
pub struct ScrollSimulator {
    config: ScrollConfig,
    table: Arc<AccelerationTable>,
    /// Table adopted at the start of the next gesture
    next_table: Option<Arc<AccelerationTable>>,
    modification: Option<ScrollModification>,
    phase: SimPhase,
    last_phase: Option<ScrollPhase>,
    subpixel: VectorSubPixelator,
    speed: SpeedMeter,
    last_delta: [f64; 2],
    started_at_ns: u64,
    last_event_at_ns: u64,
}

impl ScrollSimulator {
    /// Create an idle simulator
    pub fn new(config: ScrollConfig, table: Arc<AccelerationTable>) -> Self {
        Self {
            speed: SpeedMeter::new(config.speed_window_ms),
            config,
            table,
            next_table: None,
            modification: None,
            phase: SimPhase::Idle,
            last_phase: None,
            subpixel: VectorSubPixelator::new(),
            last_delta: [0.0, 0.0],
            started_at_ns: 0,
            last_event_at_ns: 0,
        }
    }

    /// Modification applied to subsequent deltas
    pub fn set_modification(&mut self, modification: Option<ScrollModification>) {
        self.modification = modification;
    }

    /// Use `table` from the next gesture on
    pub fn set_table(&mut self, table: Arc<AccelerationTable>) {
        if matches!(self.phase, SimPhase::Idle) {
            self.table = table;
            self.next_table = None;
        } else {
            self.next_table = Some(table);
        }
    }

    /// Replace the profile (only while idle)
    pub fn reconfigure(&mut self, config: ScrollConfig) -> Result<()> {
        if !self.is_idle() {
            return Err(PipelineError::InvalidState(
                "scroll session active".to_string(),
            ));
        }
        self.speed = SpeedMeter::new(config.speed_window_ms);
        self.config = config;
        Ok(())
    }

    /// True when no gesture or momentum is running
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, SimPhase::Idle)
    }

    /// True while decaying momentum is being emitted
    pub fn in_momentum(&self) -> bool {
        matches!(self.phase, SimPhase::Momentum(_))
    }

    /// Active session snapshot
    pub fn session(&self) -> Option<ScrollSession> {
        if self.is_idle() {
            return None;
        }
        Some(ScrollSession {
            phase: self.last_phase.unwrap_or(ScrollPhase::Began),
            remainder: self.subpixel.remainder(),
            started_at_ns: self.started_at_ns,
            last_event_at_ns: self.last_event_at_ns,
        })
    }

    /// Advance the state machine
    pub fn step(&mut self, input: ScrollInput) -> StepOutput {
        let mut out = StepOutput::new();

        let input = match input {
            ScrollInput::Delta { dx, dy, .. }
                if (dx == 0.0 && dy == 0.0) || !dx.is_finite() || !dy.is_finite() =>
            {
                ScrollInput::Tick
            }
            other => other,
        };

        self.phase = match (self.phase, input) {
            (SimPhase::Idle, ScrollInput::Delta { dx, dy, timestamp_ns }) => {
                self.begin([dx, dy], timestamp_ns, &mut out)
            }

            (SimPhase::Active { .. }, ScrollInput::Delta { dx, dy, timestamp_ns }) => {
                self.apply([dx, dy], timestamp_ns, ScrollPhase::Changed, &mut out);
                SimPhase::Active { empty_ticks: 0 }
            }

            (SimPhase::Momentum(_), ScrollInput::Delta { dx, dy, timestamp_ns }) => {
                out.push(ScrollStep::marker(ScrollPhase::MomentumEnded));
                self.begin([dx, dy], timestamp_ns, &mut out)
            }

            (SimPhase::Idle, ScrollInput::Tick | ScrollInput::Cancel) => SimPhase::Idle,

            (SimPhase::Active { empty_ticks }, ScrollInput::Tick) => {
                let empty_ticks = empty_ticks + 1;
                if empty_ticks >= self.config.idle_timeout_ticks {
                    out.push(ScrollStep::marker(ScrollPhase::Ended));
                    match Momentum::start(self.last_delta, &self.config.momentum) {
                        Some(momentum) => {
                            trace!("Scroll momentum from {:?}", self.last_delta);
                            SimPhase::Momentum(momentum)
                        }
                        None => SimPhase::Idle,
                    }
                } else {
                    SimPhase::Active { empty_ticks }
                }
            }

            (SimPhase::Momentum(mut momentum), ScrollInput::Tick) => match momentum.next() {
                Some(velocity) => {
                    let [dx, dy] = self.subpixel.accumulate(velocity);
                    out.push(ScrollStep {
                        dx,
                        dy,
                        phase: ScrollPhase::Momentum,
                    });
                    SimPhase::Momentum(momentum)
                }
                None => {
                    out.push(ScrollStep::marker(ScrollPhase::MomentumEnded));
                    SimPhase::Idle
                }
            },

            (SimPhase::Active { .. }, ScrollInput::Cancel) => {
                out.push(ScrollStep::marker(ScrollPhase::Cancelled));
                SimPhase::Idle
            }

            (SimPhase::Momentum(_), ScrollInput::Cancel) => {
                out.push(ScrollStep::marker(ScrollPhase::MomentumEnded));
                SimPhase::Idle
            }
        };

        if let Some(last) = out.iter().last() {
            self.last_phase = Some(last.phase);
        }
        if self.is_idle() {
            if let Some(table) = self.next_table.take() {
                self.table = table;
            }
        }

        out
    }

    fn begin(&mut self, delta: [f64; 2], timestamp_ns: u64, out: &mut StepOutput) -> SimPhase {
        if let Some(table) = self.next_table.take() {
            self.table = table;
        }
        self.subpixel.reset();
        self.speed.reset();
        self.started_at_ns = timestamp_ns;
        self.apply(delta, timestamp_ns, ScrollPhase::Began, out);
        SimPhase::Active { empty_ticks: 0 }
    }

    fn apply(&mut self, raw: [f64; 2], timestamp_ns: u64, phase: ScrollPhase, out: &mut StepOutput) {
        let modified = modify_delta(raw, self.modification, &self.config);
        let speed = self.speed.record(timestamp_ns, raw[0].hypot(raw[1]));
        let gain = self.table.lookup(speed);
        let scaled = [modified[0] * gain, modified[1] * gain];

        self.last_delta = scaled;
        self.last_event_at_ns = timestamp_ns;

        let [dx, dy] = self.subpixel.accumulate(scaled);
        out.push(ScrollStep { dx, dy, phase });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator(idle_timeout_ticks: u32, momentum: MomentumConfig) -> ScrollSimulator {
        let config = ScrollConfig {
            idle_timeout_ticks,
            momentum,
            ..ScrollConfig::default()
        };
        ScrollSimulator::new(config, Arc::new(AccelerationTable::flat(1.0)))
    }

    fn no_momentum() -> MomentumConfig {
        MomentumConfig {
            enabled: false,
            ..MomentumConfig::default()
        }
    }

    fn delta(dy: f64, ms: u64) -> ScrollInput {
        ScrollInput::Delta {
            dx: 0.0,
            dy,
            timestamp_ns: ms * 1_000_000,
        }
    }

    fn run(sim: &mut ScrollSimulator, inputs: &[ScrollInput]) -> Vec<ScrollStep> {
        inputs.iter().flat_map(|i| sim.step(*i).iter().collect::<Vec<_>>()).collect()
    }

    #[test]
    fn test_sequence_with_idle_timeout() {
        let mut sim = simulator(3, no_momentum());
        let inputs: Vec<ScrollInput> = [5.0, 5.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0]
            .iter()
            .enumerate()
            .map(|(i, dy)| delta(*dy, i as u64 * 16))
            .collect();

        let steps = run(&mut sim, &inputs);
        assert_eq!(
            steps,
            vec![
                ScrollStep { dx: 0, dy: 5, phase: ScrollPhase::Began },
                ScrollStep { dx: 0, dy: 5, phase: ScrollPhase::Changed },
                ScrollStep { dx: 0, dy: 5, phase: ScrollPhase::Changed },
                ScrollStep::marker(ScrollPhase::Ended),
            ]
        );
        assert!(sim.is_idle());
    }

    #[test]
    fn test_isolated_tick_below_threshold_has_no_momentum() {
        let momentum = MomentumConfig {
            trigger_threshold: 3.0,
            ..MomentumConfig::default()
        };
        let mut sim = simulator(2, momentum);

        let steps = run(
            &mut sim,
            &[delta(1.0, 0), ScrollInput::Tick, ScrollInput::Tick, ScrollInput::Tick],
        );
        let phases: Vec<ScrollPhase> = steps.iter().map(|s| s.phase).collect();
        assert_eq!(phases, vec![ScrollPhase::Began, ScrollPhase::Ended]);
        assert!(sim.is_idle());
    }

    #[test]
    fn test_momentum_decays_then_ends() {
        let momentum = MomentumConfig {
            enabled: true,
            trigger_threshold: 3.0,
            decay: 0.5,
            min_magnitude: 1.0,
        };
        let mut sim = simulator(1, momentum);

        let mut steps = run(&mut sim, &[delta(8.0, 0), ScrollInput::Tick]);
        assert!(sim.in_momentum());
        for _ in 0..5 {
            steps.extend(sim.step(ScrollInput::Tick).iter());
        }

        let phases: Vec<ScrollPhase> = steps.iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![
                ScrollPhase::Began,
                ScrollPhase::Ended,
                ScrollPhase::Momentum,
                ScrollPhase::Momentum,
                ScrollPhase::Momentum,
                ScrollPhase::MomentumEnded,
            ]
        );
        let momentum_deltas: Vec<i32> = steps
            .iter()
            .filter(|s| s.phase == ScrollPhase::Momentum)
            .map(|s| s.dy)
            .collect();
        assert_eq!(momentum_deltas, vec![4, 2, 1]);
        assert!(sim.is_idle());
    }

    #[test]
    fn test_delta_during_momentum_starts_new_gesture() {
        let momentum = MomentumConfig {
            enabled: true,
            trigger_threshold: 1.0,
            decay: 0.9,
            min_magnitude: 0.1,
        };
        let mut sim = simulator(1, momentum);
        run(&mut sim, &[delta(10.0, 0), ScrollInput::Tick, ScrollInput::Tick]);
        assert!(sim.in_momentum());

        let out = sim.step(delta(2.0, 100));
        let phases: Vec<ScrollPhase> = out.iter().map(|s| s.phase).collect();
        assert_eq!(phases, vec![ScrollPhase::MomentumEnded, ScrollPhase::Began]);
        assert!(sim.session().unwrap().remainder[1].abs() < 1e-9);
    }

    #[test]
    fn test_fractions_carry_within_gesture() {
        let mut sim = simulator(10, no_momentum());
        let steps = run(
            &mut sim,
            &[delta(0.4, 0), delta(0.4, 10), delta(0.4, 20)],
        );
        let total: i32 = steps.iter().map(|s| s.dy).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_modifications() {
        let config = ScrollConfig::default();
        assert_eq!(
            modify_delta([0.0, 4.0], Some(ScrollModification::Precise), &config),
            [0.0, 1.0]
        );
        assert_eq!(
            modify_delta([1.0, 2.0], Some(ScrollModification::SwapAxes), &config),
            [2.0, 1.0]
        );
        assert_eq!(
            modify_delta([0.0, 2.0], Some(ScrollModification::Horizontal), &config),
            [2.0, 0.0]
        );

        let inverted = ScrollConfig {
            inverted_y: true,
            ..ScrollConfig::default()
        };
        assert_eq!(modify_delta([0.0, 2.0], None, &inverted), [0.0, -2.0]);
    }

    #[test]
    fn test_cancel_emits_cancelled() {
        let mut sim = simulator(5, no_momentum());
        sim.step(delta(3.0, 0));
        let out = sim.step(ScrollInput::Cancel);
        assert_eq!(
            out.iter().collect::<Vec<_>>(),
            vec![ScrollStep::marker(ScrollPhase::Cancelled)]
        );
        assert!(sim.is_idle());
        assert!(sim.step(ScrollInput::Cancel).is_empty());
    }

    #[test]
    fn test_table_swap_waits_for_idle() {
        let mut sim = simulator(1, no_momentum());
        sim.step(delta(2.0, 0));
        sim.set_table(Arc::new(AccelerationTable::flat(2.0)));

        // Still the old gain mid-gesture
        let out = sim.step(delta(2.0, 10));
        assert_eq!(out.iter().next().unwrap().dy, 2);

        sim.step(ScrollInput::Tick);
        let out = sim.step(delta(2.0, 500));
        assert_eq!(out.iter().next().unwrap().dy, 4);
    }

    #[test]
    fn test_reconfigure_requires_idle() {
        let mut sim = simulator(1, no_momentum());
        sim.step(delta(1.0, 0));
        assert!(sim.reconfigure(ScrollConfig::default()).is_err());
        sim.step(ScrollInput::Tick);
        assert!(sim.reconfigure(ScrollConfig::default()).is_ok());
    }
}

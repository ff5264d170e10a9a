//! Gesture Scroll Simulator
//!
//! Phase bookkeeping for gesture output driven by an active modified drag.
//! Unlike `ScrollSimulator` the gesture boundaries are explicit (button
//! press and release), so there is no idle timeout; momentum after release
//! is driven by scheduler ticks.

use crate::input::event::ScrollPhase;
use crate::input::subpixel::VectorSubPixelator;
use crate::scroll::momentum::{Momentum, MomentumConfig};
use crate::scroll::simulator::{ScrollStep, StepOutput};
use crate::utils::circular_buffer::CircularBuffer;

/// Deltas averaged for the release velocity
const RELEASE_SAMPLES: usize = 4;

/// Gesture simulator input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureInput {
    /// Gesture motion (opens the gesture when idle)
    Motion([f64; 2]),
    /// Button released
    End,
    /// Gesture aborted
    Cancel,
    /// Scheduler tick
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GesturePhase {
    Idle,
    Active,
    Momentum(Momentum),
}

/// Phase-tagged gesture synthesis
#[derive(Debug, Clone)]
pub struct GestureScrollSimulator {
    phase: GesturePhase,
    subpixel: VectorSubPixelator,
    recent: CircularBuffer<[f64; 2], RELEASE_SAMPLES>,
    momentum: MomentumConfig,
}

impl GestureScrollSimulator {
    /// Create an idle simulator
    pub fn new(momentum: MomentumConfig) -> Self {
        Self {
            phase: GesturePhase::Idle,
            subpixel: VectorSubPixelator::new(),
            recent: CircularBuffer::new(),
            momentum,
        }
    }

    /// True when no gesture or momentum is running
    pub fn is_idle(&self) -> bool {
        matches!(self.phase, GesturePhase::Idle)
    }

    /// True while the gesture is held
    pub fn is_active(&self) -> bool {
        matches!(self.phase, GesturePhase::Active)
    }

    /// Replace momentum parameters (applies to the next release)
    pub fn set_momentum(&mut self, momentum: MomentumConfig) {
        self.momentum = momentum;
    }

    /// Advance the state machine
    pub fn step(&mut self, input: GestureInput) -> StepOutput {
        let mut out = StepOutput::new();

        self.phase = match (self.phase, input) {
            (GesturePhase::Idle, GestureInput::Motion(delta)) => {
                self.open(delta, &mut out);
                GesturePhase::Active
            }

            (GesturePhase::Momentum(_), GestureInput::Motion(delta)) => {
                out.push(ScrollStep::marker(ScrollPhase::MomentumEnded));
                self.open(delta, &mut out);
                GesturePhase::Active
            }

            (GesturePhase::Active, GestureInput::Motion(delta)) => {
                self.emit(delta, ScrollPhase::Changed, &mut out);
                GesturePhase::Active
            }

            (GesturePhase::Active, GestureInput::End) => {
                out.push(ScrollStep::marker(ScrollPhase::Ended));
                match Momentum::start(self.release_velocity(), &self.momentum) {
                    Some(momentum) => GesturePhase::Momentum(momentum),
                    None => GesturePhase::Idle,
                }
            }

            (GesturePhase::Active, GestureInput::Cancel) => {
                out.push(ScrollStep::marker(ScrollPhase::Cancelled));
                GesturePhase::Idle
            }

            (GesturePhase::Momentum(_), GestureInput::Cancel | GestureInput::End) => {
                out.push(ScrollStep::marker(ScrollPhase::MomentumEnded));
                GesturePhase::Idle
            }

            (GesturePhase::Momentum(mut momentum), GestureInput::Tick) => match momentum.next() {
                Some(velocity) => {
                    let [dx, dy] = self.subpixel.accumulate(velocity);
                    out.push(ScrollStep {
                        dx,
                        dy,
                        phase: ScrollPhase::Momentum,
                    });
                    GesturePhase::Momentum(momentum)
                }
                None => {
                    out.push(ScrollStep::marker(ScrollPhase::MomentumEnded));
                    GesturePhase::Idle
                }
            },

            (GesturePhase::Active, GestureInput::Tick) => GesturePhase::Active,

            (GesturePhase::Idle, GestureInput::End | GestureInput::Cancel | GestureInput::Tick) => {
                GesturePhase::Idle
            }
        };

        out
    }

    fn open(&mut self, delta: [f64; 2], out: &mut StepOutput) {
        self.subpixel.reset();
        self.recent.clear();
        self.emit(delta, ScrollPhase::Began, out);
    }

    fn emit(&mut self, delta: [f64; 2], phase: ScrollPhase, out: &mut StepOutput) {
        self.recent.push(delta);
        let [dx, dy] = self.subpixel.accumulate(delta);
        out.push(ScrollStep { dx, dy, phase });
    }

    fn release_velocity(&self) -> [f64; 2] {
        if self.recent.is_empty() {
            return [0.0, 0.0];
        }
        let n = self.recent.len() as f64;
        let sum = self
            .recent
            .iter()
            .fold([0.0, 0.0], |acc, d| [acc[0] + d[0], acc[1] + d[1]]);
        [sum[0] / n, sum[1] / n]
    }
}

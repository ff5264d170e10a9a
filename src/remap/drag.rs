//! Modified Drag
//!
//! Turns a held-button-plus-motion sequence into synthetic gesture output.
//!
//! # States
//!
//! ```text
//!          begin                 |offset| > deadzone
//!   Idle ─────────> Candidate ─────────────────────> Active
//!    ▲                  │                              │
//!    └──────────────────┴──────── release/cancel ──────┘
//! ```
//!
//! While `Candidate` motion is accumulated and withheld. Crossing the
//! deadzone commits the gesture and replays the withheld motion as its first
//! delta. While `Active` raw pointer motion is never produced for gesture
//! kinds; it is replaced by phase-tagged `Gesture` events. Release always
//! lands in `Idle`.
//!
//! `PassThrough` drags are the exception: committing replays the swallowed
//! button press, and motion is handed back to the pointer path.

use crate::input::event::MouseButton;
use crate::input::modifiers::ModifierSet;
use crate::output::OutputEvent;
use crate::remap::action::{DragKind, KeyCombo};
use crate::scroll::gesture::{GestureInput, GestureScrollSimulator};
use crate::scroll::momentum::MomentumConfig;
use crate::scroll::simulator::StepOutput;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Drag gesture profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragConfig {
    /// Distance (px) the pointer must travel before a drag commits
    #[serde(default = "default_deadzone_px")]
    pub deadzone_px: f64,

    /// Scroll ticks per pixel of drag motion
    #[serde(default = "default_gesture_scale")]
    pub gesture_scale: f64,

    /// Scroll opposite to the drag direction
    #[serde(default)]
    pub inverted: bool,

    /// Continue scroll gestures with momentum after release
    #[serde(default = "default_true")]
    pub momentum: bool,

    /// Swipe gesture key bindings
    #[serde(default)]
    pub swipe: SwipeConfig,
}

fn default_deadzone_px() -> f64 {
    8.0
}

fn default_gesture_scale() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            deadzone_px: default_deadzone_px(),
            gesture_scale: default_gesture_scale(),
            inverted: false,
            momentum: true,
            swipe: SwipeConfig::default(),
        }
    }
}

impl DragConfig {
    /// Check parameter ranges
    pub fn validate(&self) -> Result<(), String> {
        if !(self.deadzone_px >= 0.0) || !self.deadzone_px.is_finite() {
            return Err(format!(
                "drag deadzone_px must be non-negative, got {}",
                self.deadzone_px
            ));
        }
        if !(self.gesture_scale > 0.0) || !self.gesture_scale.is_finite() {
            return Err(format!(
                "drag gesture_scale must be positive, got {}",
                self.gesture_scale
            ));
        }
        if !(self.swipe.threshold_px > 0.0) || !self.swipe.threshold_px.is_finite() {
            return Err(format!(
                "swipe threshold_px must be positive, got {}",
                self.swipe.threshold_px
            ));
        }
        Ok(())
    }
}

/// Key combos sent at the end of a swipe, by direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwipeConfig {
    /// Distance (px) along the dominant axis needed to fire
    #[serde(default = "default_swipe_threshold")]
    pub threshold_px: f64,

    /// Swipe left
    #[serde(default = "default_swipe_left")]
    pub left: KeyCombo,

    /// Swipe right
    #[serde(default = "default_swipe_right")]
    pub right: KeyCombo,

    /// Swipe up
    #[serde(default = "default_swipe_up")]
    pub up: KeyCombo,

    /// Swipe down
    #[serde(default = "default_swipe_down")]
    pub down: KeyCombo,
}

const KEY_LEFTCTRL: u16 = 29;
const KEY_LEFTALT: u16 = 56;

fn ctrl_alt(key: u16) -> KeyCombo {
    KeyCombo::from_keys([KEY_LEFTCTRL, KEY_LEFTALT, key])
}

fn default_swipe_threshold() -> f64 {
    120.0
}

fn default_swipe_left() -> KeyCombo {
    ctrl_alt(105)
}

fn default_swipe_right() -> KeyCombo {
    ctrl_alt(106)
}

fn default_swipe_up() -> KeyCombo {
    ctrl_alt(103)
}

fn default_swipe_down() -> KeyCombo {
    ctrl_alt(108)
}

impl Default for SwipeConfig {
    fn default() -> Self {
        Self {
            threshold_px: default_swipe_threshold(),
            left: default_swipe_left(),
            right: default_swipe_right(),
            up: default_swipe_up(),
            down: default_swipe_down(),
        }
    }
}

impl SwipeConfig {
    /// Combo for a swipe covering `offset`, if it went far enough
    pub fn combo_for(&self, offset: [f64; 2]) -> Option<KeyCombo> {
        let [x, y] = offset;
        if x.abs() >= y.abs() {
            if x.abs() < self.threshold_px {
                return None;
            }
            Some(if x > 0.0 { self.right } else { self.left })
        } else {
            if y.abs() < self.threshold_px {
                return None;
            }
            Some(if y > 0.0 { self.down } else { self.up })
        }
    }
}

/// Drag state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    /// No drag
    Idle,
    /// Trigger held, deadzone not yet exceeded
    Candidate,
    /// Gesture committed
    Active,
}

/// Snapshot of the current drag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    /// Triggering button
    pub button: MouseButton,
    /// Gesture produced
    pub kind: DragKind,
    /// Modifiers held when the drag began
    pub triggering_modifiers: ModifierSet,
    /// Offset where the drag started (always the origin)
    pub start_point: [f64; 2],
    /// Accumulated offset from the start
    pub current_point: [f64; 2],
    /// State
    pub state: DragState,
}

/// What the pipeline should do with a move event during a drag
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragMotion {
    /// Motion was consumed; emit whatever was written to the output
    Consumed,
    /// Route this delta through the pointer path
    Pointer([f64; 2]),
}

/// Per-device modified drag
#[derive(Debug, Clone)]
pub struct ModifiedDrag {
    config: DragConfig,
    momentum: MomentumConfig,
    session: Option<DragSession>,
    gesture: GestureScrollSimulator,
}

impl ModifiedDrag {
    /// Create an idle drag for `config`
    ///
    /// `momentum` parameterizes scroll-gesture momentum after release.
    pub fn new(config: DragConfig, momentum: MomentumConfig) -> Self {
        Self {
            gesture: GestureScrollSimulator::new(momentum),
            config,
            momentum,
            session: None,
        }
    }

    /// Current state
    pub fn state(&self) -> DragState {
        self.session.map_or(DragState::Idle, |s| s.state)
    }

    /// Current session, if any
    pub fn session(&self) -> Option<DragSession> {
        self.session
    }

    /// True while the trigger is held
    pub fn is_engaged(&self) -> bool {
        self.session.is_some()
    }

    /// True when neither a drag nor its momentum is running
    pub fn is_idle(&self) -> bool {
        self.session.is_none() && self.gesture.is_idle()
    }

    /// Replace the profile (takes effect on the next drag)
    pub fn reconfigure(&mut self, config: DragConfig, momentum: MomentumConfig) {
        self.config = config;
        self.momentum = momentum;
    }

    /// Start a candidate drag, terminating any previous one first
    pub fn begin(
        &mut self,
        button: MouseButton,
        kind: DragKind,
        modifiers: ModifierSet,
        out: &mut Vec<OutputEvent>,
    ) {
        if self.session.is_some() {
            debug!("New drag on {} cancels the previous one", button);
            self.cancel(out);
        }

        let momentum = match kind {
            DragKind::ScrollGesture if self.config.momentum => self.momentum,
            _ => MomentumConfig {
                enabled: false,
                ..self.momentum
            },
        };
        self.gesture.set_momentum(momentum);

        self.session = Some(DragSession {
            button,
            kind,
            triggering_modifiers: modifiers,
            start_point: [0.0, 0.0],
            current_point: [0.0, 0.0],
            state: DragState::Candidate,
        });
    }

    /// Feed a raw move delta
    pub fn motion(&mut self, delta: [f64; 2], out: &mut Vec<OutputEvent>) -> DragMotion {
        let Some(mut session) = self.session else {
            return DragMotion::Pointer(delta);
        };

        session.current_point[0] += delta[0];
        session.current_point[1] += delta[1];

        let result = match session.state {
            DragState::Idle => DragMotion::Pointer(delta),

            DragState::Candidate => {
                let [x, y] = session.current_point;
                if x.hypot(y) <= self.config.deadzone_px {
                    DragMotion::Consumed
                } else {
                    debug!(
                        "Drag on {} committed as {:?}",
                        session.button, session.kind
                    );
                    session.state = DragState::Active;
                    self.commit(&session, out)
                }
            }

            DragState::Active => match session.kind {
                DragKind::PassThrough => DragMotion::Pointer(delta),
                kind => {
                    let step = self.gesture.step(GestureInput::Motion(self.scale(kind, delta)));
                    push_gesture(kind, step, out);
                    DragMotion::Consumed
                }
            },
        };

        self.session = Some(session);
        result
    }

    /// Finish the drag on trigger release
    ///
    /// Returns true if the drag had been committed. The state is `Idle`
    /// afterwards regardless.
    pub fn release(&mut self, out: &mut Vec<OutputEvent>) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };

        match (session.state, session.kind) {
            (DragState::Active, DragKind::PassThrough) => {
                out.push(OutputEvent::Button {
                    button: session.button,
                    pressed: false,
                });
                true
            }
            (DragState::Active, kind) => {
                push_gesture(kind, self.gesture.step(GestureInput::End), out);
                if kind == DragKind::SwipeGesture {
                    if let Some(combo) = self.config.swipe.combo_for(session.current_point) {
                        debug!("Swipe {:?} fires {:?}", session.current_point, combo.keys());
                        push_combo(combo, out);
                    }
                }
                true
            }
            (DragState::Candidate | DragState::Idle, _) => {
                trace!("Drag on {} released inside deadzone", session.button);
                false
            }
        }
    }

    /// Abort the drag and any momentum
    ///
    /// Runs the same transitions as a release, reporting `Cancelled`
    /// instead of `Ended`.
    pub fn cancel(&mut self, out: &mut Vec<OutputEvent>) {
        match self.session.take() {
            Some(DragSession {
                state: DragState::Active,
                kind: DragKind::PassThrough,
                button,
                ..
            }) => {
                out.push(OutputEvent::Button {
                    button,
                    pressed: false,
                });
            }
            Some(DragSession {
                state: DragState::Active,
                kind,
                ..
            }) => {
                push_gesture(kind, self.gesture.step(GestureInput::Cancel), out);
            }
            Some(_) => {}
            None => {
                // Momentum left over from a previous scroll gesture
                push_gesture(
                    DragKind::ScrollGesture,
                    self.gesture.step(GestureInput::Cancel),
                    out,
                );
            }
        }
    }

    /// Advance momentum after a released scroll gesture
    pub fn tick(&mut self, out: &mut Vec<OutputEvent>) {
        if self.session.is_none() && !self.gesture.is_idle() {
            push_gesture(
                DragKind::ScrollGesture,
                self.gesture.step(GestureInput::Tick),
                out,
            );
        }
    }

    fn commit(&mut self, session: &DragSession, out: &mut Vec<OutputEvent>) -> DragMotion {
        match session.kind {
            DragKind::PassThrough => {
                out.push(OutputEvent::Button {
                    button: session.button,
                    pressed: true,
                });
                DragMotion::Pointer(session.current_point)
            }
            kind => {
                let first = self.scale(kind, session.current_point);
                push_gesture(kind, self.gesture.step(GestureInput::Motion(first)), out);
                DragMotion::Consumed
            }
        }
    }

    fn scale(&self, kind: DragKind, delta: [f64; 2]) -> [f64; 2] {
        let factor = match kind {
            DragKind::ScrollGesture => self.config.gesture_scale,
            DragKind::SwipeGesture | DragKind::PassThrough => 1.0,
        };
        let sign = if self.config.inverted { -1.0 } else { 1.0 };
        [delta[0] * factor * sign, delta[1] * factor * sign]
    }
}

fn push_gesture(kind: DragKind, step: StepOutput, out: &mut Vec<OutputEvent>) {
    out.extend(step.iter().map(|s| OutputEvent::gesture(kind, s)));
}

fn push_combo(combo: KeyCombo, out: &mut Vec<OutputEvent>) {
    for &code in combo.keys() {
        out.push(OutputEvent::Key {
            code,
            pressed: true,
        });
    }
    for &code in combo.keys().iter().rev() {
        out.push(OutputEvent::Key {
            code,
            pressed: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::event::ScrollPhase;
    use crate::input::modifiers::Modifier;

    fn drag() -> ModifiedDrag {
        let momentum = MomentumConfig {
            enabled: false,
            ..MomentumConfig::default()
        };
        ModifiedDrag::new(DragConfig::default(), momentum)
    }

    fn is_raw_move(event: &OutputEvent) -> bool {
        matches!(
            event,
            OutputEvent::PointerMove { .. } | OutputEvent::Passthrough(_)
        )
    }

    #[test]
    fn test_deadzone_holds_candidate() {
        let mut drag = drag();
        let mut out = Vec::new();
        drag.begin(MouseButton::Middle, DragKind::ScrollGesture, ModifierSet::empty(), &mut out);

        assert_eq!(drag.motion([3.0, 4.0], &mut out), DragMotion::Consumed);
        assert_eq!(drag.state(), DragState::Candidate);
        assert!(out.is_empty());

        drag.motion([3.0, 4.0], &mut out);
        assert_eq!(drag.state(), DragState::Active);
        assert_eq!(out.len(), 1);
        assert!(matches!(
            out[0],
            OutputEvent::Gesture {
                kind: DragKind::ScrollGesture,
                dx: 0,
                dy: 0,
                phase: ScrollPhase::Began,
            }
        ));
    }

    #[test]
    fn test_active_drag_never_emits_raw_motion() {
        let mut drag = drag();
        let mut out = Vec::new();
        drag.begin(MouseButton::Middle, DragKind::ScrollGesture, ModifierSet::empty(), &mut out);

        for _ in 0..50 {
            assert_eq!(drag.motion([1.5, -7.0], &mut out), DragMotion::Consumed);
        }
        drag.release(&mut out);

        assert!(!out.is_empty());
        assert!(!out.iter().any(is_raw_move));
        assert_eq!(out.last().and_then(|e| e.phase()), Some(ScrollPhase::Ended));
    }

    #[test]
    fn test_release_always_returns_to_idle() {
        for moves in [0usize, 1, 20] {
            let mut drag = drag();
            let mut out = Vec::new();
            drag.begin(MouseButton::Right, DragKind::SwipeGesture, Modifier::Shift.into(), &mut out);
            for _ in 0..moves {
                drag.motion([10.0, 0.0], &mut out);
            }
            let was_active = drag.release(&mut out);

            assert_eq!(was_active, moves > 0);
            assert_eq!(drag.state(), DragState::Idle);
            assert!(drag.session().is_none());
        }
    }

    #[test]
    fn test_swipe_fires_combo_past_threshold() {
        let mut drag = drag();
        let mut out = Vec::new();
        drag.begin(MouseButton::Middle, DragKind::SwipeGesture, ModifierSet::empty(), &mut out);
        for _ in 0..15 {
            drag.motion([-10.0, 1.0], &mut out);
        }
        out.clear();
        drag.release(&mut out);

        let keys: Vec<(u16, bool)> = out
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Key { code, pressed } => Some((*code, *pressed)),
                _ => None,
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                (29, true),
                (56, true),
                (105, true),
                (105, false),
                (56, false),
                (29, false),
            ]
        );
    }

    #[test]
    fn test_short_swipe_fires_nothing() {
        let mut drag = drag();
        let mut out = Vec::new();
        drag.begin(MouseButton::Middle, DragKind::SwipeGesture, ModifierSet::empty(), &mut out);
        drag.motion([0.0, 30.0], &mut out);
        out.clear();
        drag.release(&mut out);

        assert!(!out.iter().any(|e| matches!(e, OutputEvent::Key { .. })));
    }

    #[test]
    fn test_pass_through_replays_press() {
        let mut drag = drag();
        let mut out = Vec::new();
        drag.begin(MouseButton::Left, DragKind::PassThrough, ModifierSet::empty(), &mut out);

        assert_eq!(drag.motion([5.0, 0.0], &mut out), DragMotion::Consumed);
        assert_eq!(
            drag.motion([5.0, 0.0], &mut out),
            DragMotion::Pointer([10.0, 0.0])
        );
        assert_eq!(
            out,
            vec![OutputEvent::Button {
                button: MouseButton::Left,
                pressed: true
            }]
        );

        assert_eq!(drag.motion([1.0, 2.0], &mut out), DragMotion::Pointer([1.0, 2.0]));
        out.clear();
        assert!(drag.release(&mut out));
        assert_eq!(
            out,
            vec![OutputEvent::Button {
                button: MouseButton::Left,
                pressed: false
            }]
        );
    }

    #[test]
    fn test_new_drag_cancels_previous() {
        let mut drag = drag();
        let mut out = Vec::new();
        drag.begin(MouseButton::Middle, DragKind::ScrollGesture, ModifierSet::empty(), &mut out);
        drag.motion([0.0, 50.0], &mut out);
        out.clear();

        drag.begin(MouseButton::Right, DragKind::ScrollGesture, ModifierSet::empty(), &mut out);
        assert_eq!(out.last().and_then(|e| e.phase()), Some(ScrollPhase::Cancelled));
        assert_eq!(drag.state(), DragState::Candidate);
    }

    #[test]
    fn test_momentum_continues_after_release() {
        let momentum = MomentumConfig {
            enabled: true,
            trigger_threshold: 0.5,
            decay: 0.5,
            min_magnitude: 0.2,
        };
        let mut drag = ModifiedDrag::new(DragConfig::default(), momentum);
        let mut out = Vec::new();
        drag.begin(MouseButton::Middle, DragKind::ScrollGesture, ModifierSet::empty(), &mut out);
        for _ in 0..5 {
            drag.motion([0.0, 40.0], &mut out);
        }
        drag.release(&mut out);
        assert_eq!(drag.state(), DragState::Idle);
        assert!(!drag.is_idle());

        out.clear();
        for _ in 0..10 {
            drag.tick(&mut out);
        }
        assert!(out.iter().any(|e| e.phase() == Some(ScrollPhase::Momentum)));
        assert_eq!(out.last().and_then(|e| e.phase()), Some(ScrollPhase::MomentumEnded));
        assert!(drag.is_idle());
    }
}

//! Synthetic Output
//!
//! Everything the pipeline emits goes through the `OutputCoordinator`, which
//! keeps phase-tagged sequences from different producers from interleaving
//! on the same device, and then into an `EventSink`.
//!
//! # Retry policy
//!
//! A refused emission is parked in its producer's `RetrySlot` and retried
//! once at the next scheduling opportunity (the next emission or tick),
//! then dropped with a warning. Phase reporting stays consistent:
//!
//! - dropped `Began`: the next event of the sequence is promoted to `Began`
//! - dropped terminal event: the producer's ownership is released anyway
//! - a sequence whose `Began` was dropped and that closes before anything
//!   else was emitted is skipped entirely

pub mod coordinator;
pub mod sink;

pub use coordinator::OutputCoordinator;
pub use sink::{EventSink, LogSink, RecordingSink};

use crate::device::DeviceId;
use crate::input::error::{recovery_action, RecoveryAction};
use crate::input::event::{MouseButton, RawInputEvent, ScrollPhase};
use crate::remap::action::DragKind;
use crate::scroll::simulator::ScrollStep;
use crate::utils::metrics::PipelineMetrics;
use std::fmt;
use tracing::{debug, warn};

/// Stage that produced an emission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProducerId {
    /// Accelerated pointer motion
    Pointer,
    /// Wheel scroll simulator
    Scroll,
    /// Modified drag gesture
    Drag,
    /// Remapped buttons and key combos
    Remap,
    /// Unmodified raw events
    Passthrough,
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProducerId::Pointer => "pointer",
            ProducerId::Scroll => "scroll",
            ProducerId::Drag => "drag",
            ProducerId::Remap => "remap",
            ProducerId::Passthrough => "passthrough",
        };
        write!(f, "{}", name)
    }
}

/// Synthesized output event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputEvent {
    /// Raw event forwarded unmodified
    Passthrough(RawInputEvent),
    /// Relative pointer motion
    PointerMove {
        /// Horizontal delta (pixels)
        dx: i32,
        /// Vertical delta (pixels)
        dy: i32,
    },
    /// Mouse button transition
    Button {
        /// Button
        button: MouseButton,
        /// Pressed (true) or released (false)
        pressed: bool,
    },
    /// Keyboard key transition
    Key {
        /// Linux key code
        code: u16,
        /// Pressed (true) or released (false)
        pressed: bool,
    },
    /// Phase-tagged scroll
    Scroll {
        /// Horizontal delta (wheel ticks)
        dx: i32,
        /// Vertical delta (wheel ticks)
        dy: i32,
        /// Phase
        phase: ScrollPhase,
    },
    /// Phase-tagged drag gesture
    Gesture {
        /// Gesture kind
        kind: DragKind,
        /// Horizontal delta
        dx: i32,
        /// Vertical delta
        dy: i32,
        /// Phase
        phase: ScrollPhase,
    },
}

impl OutputEvent {
    /// Scroll event from a simulator step
    pub fn scroll(step: ScrollStep) -> Self {
        OutputEvent::Scroll {
            dx: step.dx,
            dy: step.dy,
            phase: step.phase,
        }
    }

    /// Gesture event from a simulator step
    pub fn gesture(kind: DragKind, step: ScrollStep) -> Self {
        OutputEvent::Gesture {
            kind,
            dx: step.dx,
            dy: step.dy,
            phase: step.phase,
        }
    }

    /// Phase tag, if the event belongs to a sequence
    pub fn phase(&self) -> Option<ScrollPhase> {
        match self {
            OutputEvent::Scroll { phase, .. } | OutputEvent::Gesture { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Copy with a different phase tag (no-op for unphased events)
    pub fn with_phase(self, phase: ScrollPhase) -> Self {
        match self {
            OutputEvent::Scroll { dx, dy, .. } => OutputEvent::Scroll { dx, dy, phase },
            OutputEvent::Gesture { kind, dx, dy, .. } => OutputEvent::Gesture {
                kind,
                dx,
                dy,
                phase,
            },
            other => other,
        }
    }
}

/// Position of an emission within a producer's sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStep {
    /// Standalone events (clicks, pointer motion, pass-through)
    Discrete,
    /// Opens a sequence and claims the device
    Open,
    /// Continues a sequence (claims the device if unowned)
    Continue,
    /// Closes a sequence and releases the device
    Close,
}

impl SequenceStep {
    /// Step implied by a phase tag
    pub fn from_phase(phase: ScrollPhase) -> Self {
        match phase {
            ScrollPhase::Began => SequenceStep::Open,
            ScrollPhase::Changed | ScrollPhase::Momentum => SequenceStep::Continue,
            ScrollPhase::Ended | ScrollPhase::Cancelled | ScrollPhase::MomentumEnded => {
                SequenceStep::Close
            }
        }
    }
}

/// Result of submitting an emission through a retry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Delivered to the sink
    Emitted,
    /// Refused and parked for one retry
    Parked,
    /// Given up on
    Dropped,
    /// Not emitted because its sequence never visibly started
    Skipped,
}

#[derive(Debug, Clone, Copy)]
struct Parked {
    device: DeviceId,
    step: SequenceStep,
}

/// One-deep retry buffer for a producer
#[derive(Debug)]
pub struct RetrySlot {
    producer: ProducerId,
    parked: Option<Parked>,
    /// Events of the parked emission (capacity reused)
    buffer: Vec<OutputEvent>,
    /// Scratch space for phase promotion
    scratch: Vec<OutputEvent>,
    promote_next: bool,
}

impl RetrySlot {
    /// Empty slot for `producer`
    pub fn new(producer: ProducerId) -> Self {
        Self {
            producer,
            parked: None,
            buffer: Vec::with_capacity(4),
            scratch: Vec::with_capacity(4),
            promote_next: false,
        }
    }

    /// True when an emission is waiting for its retry
    pub fn is_parked(&self) -> bool {
        self.parked.is_some()
    }

    /// True when the next sequence event will be promoted to `Began`
    pub fn promotion_pending(&self) -> bool {
        self.promote_next
    }

    /// Emit `events`, retrying any parked emission first
    pub fn submit(
        &mut self,
        coordinator: &OutputCoordinator,
        metrics: &PipelineMetrics,
        device: DeviceId,
        events: &[OutputEvent],
        step: SequenceStep,
    ) -> EmitOutcome {
        self.flush(coordinator, metrics);

        if !self.promote_next || step == SequenceStep::Discrete {
            return self.emit_now(coordinator, metrics, device, events, step);
        }

        self.promote_next = false;
        if step == SequenceStep::Close {
            // Nothing of this sequence reached the sink
            coordinator.release_owner(device, self.producer);
            debug!(
                "{} sequence on {} closed before it opened, skipping",
                self.producer, device
            );
            return EmitOutcome::Skipped;
        }

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        let mut promoted = false;
        for event in events {
            if !promoted && event.phase().is_some() {
                scratch.push(event.with_phase(ScrollPhase::Began));
                promoted = true;
            } else {
                scratch.push(*event);
            }
        }
        let outcome = self.emit_now(coordinator, metrics, device, &scratch, SequenceStep::Open);
        self.scratch = scratch;
        outcome
    }

    /// Retry the parked emission, dropping it if refused again
    pub fn flush(
        &mut self,
        coordinator: &OutputCoordinator,
        metrics: &PipelineMetrics,
    ) -> Option<EmitOutcome> {
        let parked = self.parked.take()?;
        metrics.record_retry();

        let mut buffer = std::mem::take(&mut self.buffer);
        let outcome = match coordinator.emit(parked.device, self.producer, &buffer, parked.step) {
            Ok(()) => {
                metrics.record_emission();
                EmitOutcome::Emitted
            }
            Err(e) => {
                metrics.record_refused();
                warn!(
                    "Dropping {} emission for {} after retry: {}",
                    self.producer, parked.device, e
                );
                self.abandon(coordinator, metrics, parked.device, parked.step);
                EmitOutcome::Dropped
            }
        };
        buffer.clear();
        self.buffer = buffer;

        Some(outcome)
    }

    /// Forget any parked emission and pending promotion
    pub fn reset(&mut self) {
        self.parked = None;
        self.buffer.clear();
        self.promote_next = false;
    }

    fn emit_now(
        &mut self,
        coordinator: &OutputCoordinator,
        metrics: &PipelineMetrics,
        device: DeviceId,
        events: &[OutputEvent],
        step: SequenceStep,
    ) -> EmitOutcome {
        match coordinator.emit(device, self.producer, events, step) {
            Ok(()) => {
                metrics.record_emission();
                EmitOutcome::Emitted
            }
            Err(e) => {
                metrics.record_refused();
                match recovery_action(&e, 0) {
                    RecoveryAction::RetryOnce => {
                        debug!("{} emission for {} parked: {}", self.producer, device, e);
                        self.buffer.clear();
                        self.buffer.extend_from_slice(events);
                        self.parked = Some(Parked { device, step });
                        EmitOutcome::Parked
                    }
                    _ => {
                        warn!("Dropping {} emission for {}: {}", self.producer, device, e);
                        self.abandon(coordinator, metrics, device, step);
                        EmitOutcome::Dropped
                    }
                }
            }
        }
    }

    fn abandon(
        &mut self,
        coordinator: &OutputCoordinator,
        metrics: &PipelineMetrics,
        device: DeviceId,
        step: SequenceStep,
    ) {
        metrics.record_dropped();
        match step {
            SequenceStep::Open => self.promote_next = true,
            SequenceStep::Close => coordinator.release_owner(device, self.producer),
            SequenceStep::Continue | SequenceStep::Discrete => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn scroll(dy: i32, phase: ScrollPhase) -> OutputEvent {
        OutputEvent::Scroll { dx: 0, dy, phase }
    }

    fn setup() -> (Arc<RecordingSink>, OutputCoordinator, PipelineMetrics) {
        let sink = Arc::new(RecordingSink::new());
        let coordinator = OutputCoordinator::new(sink.clone(), 16);
        (sink, coordinator, PipelineMetrics::new())
    }

    #[test]
    fn test_step_from_phase() {
        assert_eq!(SequenceStep::from_phase(ScrollPhase::Began), SequenceStep::Open);
        assert_eq!(
            SequenceStep::from_phase(ScrollPhase::Momentum),
            SequenceStep::Continue
        );
        assert_eq!(
            SequenceStep::from_phase(ScrollPhase::MomentumEnded),
            SequenceStep::Close
        );
    }

    #[test]
    fn test_with_phase() {
        let e = scroll(3, ScrollPhase::Changed).with_phase(ScrollPhase::Began);
        assert_eq!(e.phase(), Some(ScrollPhase::Began));

        let b = OutputEvent::Button {
            button: MouseButton::Left,
            pressed: true,
        };
        assert_eq!(b.with_phase(ScrollPhase::Began), b);
    }

    #[test]
    fn test_refused_emission_retried_once() {
        let (sink, coordinator, metrics) = setup();
        let device = DeviceId(1);
        coordinator
            .emit(device, ProducerId::Drag, &[], SequenceStep::Open)
            .unwrap();

        let mut slot = RetrySlot::new(ProducerId::Scroll);
        let outcome = slot.submit(
            &coordinator,
            &metrics,
            device,
            &[scroll(1, ScrollPhase::Began)],
            SequenceStep::Open,
        );
        assert_eq!(outcome, EmitOutcome::Parked);

        coordinator.release_device(device);
        assert_eq!(slot.flush(&coordinator, &metrics), Some(EmitOutcome::Emitted));
        assert_eq!(sink.events(), vec![(device, scroll(1, ScrollPhase::Began))]);
    }

    #[test]
    fn test_dropped_began_promotes_next() {
        let (sink, coordinator, metrics) = setup();
        let device = DeviceId(1);
        coordinator
            .emit(device, ProducerId::Drag, &[], SequenceStep::Open)
            .unwrap();

        let mut slot = RetrySlot::new(ProducerId::Scroll);
        slot.submit(
            &coordinator,
            &metrics,
            device,
            &[scroll(1, ScrollPhase::Began)],
            SequenceStep::Open,
        );
        // Retry fails: drag still owns the device
        assert_eq!(slot.flush(&coordinator, &metrics), Some(EmitOutcome::Dropped));
        assert!(slot.promotion_pending());

        coordinator.release_device(device);
        let outcome = slot.submit(
            &coordinator,
            &metrics,
            device,
            &[scroll(2, ScrollPhase::Changed)],
            SequenceStep::Continue,
        );
        assert_eq!(outcome, EmitOutcome::Emitted);
        assert_eq!(sink.events(), vec![(device, scroll(2, ScrollPhase::Began))]);
        assert_eq!(coordinator.holder(device), Some(ProducerId::Scroll));
        assert_eq!(metrics.snapshot().emissions_dropped, 1);
    }

    #[test]
    fn test_sequence_closed_before_open_is_skipped() {
        let (sink, coordinator, metrics) = setup();
        let device = DeviceId(4);
        coordinator
            .emit(device, ProducerId::Drag, &[], SequenceStep::Open)
            .unwrap();

        let mut slot = RetrySlot::new(ProducerId::Scroll);
        slot.submit(
            &coordinator,
            &metrics,
            device,
            &[scroll(1, ScrollPhase::Began)],
            SequenceStep::Open,
        );
        slot.flush(&coordinator, &metrics);
        coordinator.release_device(device);

        let outcome = slot.submit(
            &coordinator,
            &metrics,
            device,
            &[scroll(0, ScrollPhase::Ended)],
            SequenceStep::Close,
        );
        assert_eq!(outcome, EmitOutcome::Skipped);
        assert!(sink.events().is_empty());
        assert_eq!(coordinator.holder(device), None);
    }
}

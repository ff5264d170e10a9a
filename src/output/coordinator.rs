//! Output Coordinator
//!
//! Serializes emissions per device. Each device has a lane holding the
//! producer that currently owns an open phase-tagged sequence; other
//! producers' sequence steps are refused until that sequence closes, so a
//! scroll gesture and a drag gesture never interleave their phases on one
//! device. Discrete events (motion, clicks, pass-through) never split a
//! sequence and are always accepted.
//!
//! Lane locks are only ever tried, never waited on: the capture thread must
//! not block, so a contended lane is reported as `EmissionRefused` with no
//! holder after a short spin.

use crate::device::DeviceId;
use crate::input::error::{PipelineError, Result};
use crate::output::sink::EventSink;
use crate::output::{OutputEvent, ProducerId, SequenceStep};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct Lane {
    owner: Option<ProducerId>,
}

/// Per-device emission arbiter in front of the sink
pub struct OutputCoordinator {
    sink: Arc<dyn EventSink>,
    lanes: RwLock<HashMap<DeviceId, Arc<Mutex<Lane>>>>,
    spin_limit: u32,
}

impl std::fmt::Debug for OutputCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCoordinator")
            .field("lanes", &self.lanes.read().len())
            .field("spin_limit", &self.spin_limit)
            .finish()
    }
}

impl OutputCoordinator {
    /// Create a coordinator writing to `sink`
    ///
    /// `spin_limit` bounds the attempts to take a contended lane lock.
    pub fn new(sink: Arc<dyn EventSink>, spin_limit: u32) -> Self {
        Self {
            sink,
            lanes: RwLock::new(HashMap::new()),
            spin_limit: spin_limit.max(1),
        }
    }

    /// Emit `events` for `device` on behalf of `producer`
    ///
    /// Ownership rules:
    /// - `Discrete` emissions always pass
    /// - `Open` and `Continue` claim the device
    /// - `Close` releases it after emitting
    pub fn emit(
        &self,
        device: DeviceId,
        producer: ProducerId,
        events: &[OutputEvent],
        step: SequenceStep,
    ) -> Result<()> {
        let lane = self.lane(device);
        let mut guard = self.acquire(&lane).ok_or(PipelineError::EmissionRefused {
            device,
            holder: None,
        })?;

        if let Some(owner) = guard.owner {
            if owner != producer && step != SequenceStep::Discrete {
                trace!("{} refused on {}: held by {}", producer, device, owner);
                return Err(PipelineError::EmissionRefused {
                    device,
                    holder: Some(owner),
                });
            }
        }

        if !events.is_empty() {
            self.sink.emit(device, events)?;
        }

        match step {
            SequenceStep::Open | SequenceStep::Continue => {
                if guard.owner.is_none() {
                    debug!("{} claimed {}", producer, device);
                }
                guard.owner = Some(producer);
            }
            SequenceStep::Close => {
                if guard.owner.take().is_some() {
                    debug!("{} released {}", producer, device);
                }
            }
            SequenceStep::Discrete => {}
        }

        Ok(())
    }

    /// Current sequence owner of `device`
    pub fn holder(&self, device: DeviceId) -> Option<ProducerId> {
        let lanes = self.lanes.read();
        lanes.get(&device).and_then(|lane| lane.lock().owner)
    }

    /// Release `device` if `producer` owns it
    pub fn release_owner(&self, device: DeviceId, producer: ProducerId) {
        let lane = self.lane(device);
        let mut guard = lane.lock();
        if guard.owner == Some(producer) {
            debug!("{} released {} without closing", producer, device);
            guard.owner = None;
        }
    }

    /// Forget all state for `device` (unplug or session reset)
    pub fn release_device(&self, device: DeviceId) {
        if let Some(lane) = self.lanes.write().remove(&device) {
            lane.lock().owner = None;
        }
    }

    /// Sink behind this coordinator
    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    fn lane(&self, device: DeviceId) -> Arc<Mutex<Lane>> {
        if let Some(lane) = self.lanes.read().get(&device) {
            return Arc::clone(lane);
        }
        let mut lanes = self.lanes.write();
        Arc::clone(lanes.entry(device).or_default())
    }

    fn acquire<'a>(&self, lane: &'a Mutex<Lane>) -> Option<parking_lot::MutexGuard<'a, Lane>> {
        for _ in 0..self.spin_limit {
            if let Some(guard) = lane.try_lock() {
                return Some(guard);
            }
            std::hint::spin_loop();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::event::{MouseButton, ScrollPhase};
    use crate::output::sink::RecordingSink;

    fn coordinator() -> (Arc<RecordingSink>, OutputCoordinator) {
        let sink = Arc::new(RecordingSink::new());
        let coordinator = OutputCoordinator::new(sink.clone(), 8);
        (sink, coordinator)
    }

    fn scroll(phase: ScrollPhase) -> OutputEvent {
        OutputEvent::Scroll { dx: 0, dy: 1, phase }
    }

    #[test]
    fn test_open_claims_close_releases() {
        let (sink, coordinator) = coordinator();
        let device = DeviceId(1);

        coordinator
            .emit(device, ProducerId::Scroll, &[scroll(ScrollPhase::Began)], SequenceStep::Open)
            .unwrap();
        assert_eq!(coordinator.holder(device), Some(ProducerId::Scroll));

        coordinator
            .emit(device, ProducerId::Scroll, &[scroll(ScrollPhase::Ended)], SequenceStep::Close)
            .unwrap();
        assert_eq!(coordinator.holder(device), None);
        assert_eq!(sink.events().len(), 2);
    }

    #[test]
    fn test_other_producer_refused_while_owned() {
        let (sink, coordinator) = coordinator();
        let device = DeviceId(2);
        coordinator
            .emit(device, ProducerId::Drag, &[], SequenceStep::Open)
            .unwrap();

        let err = coordinator
            .emit(device, ProducerId::Scroll, &[scroll(ScrollPhase::Began)], SequenceStep::Open)
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::EmissionRefused {
                holder: Some(ProducerId::Drag),
                ..
            }
        ));

        assert!(sink.events().is_empty());

        let click = OutputEvent::Button {
            button: MouseButton::Left,
            pressed: true,
        };
        coordinator
            .emit(device, ProducerId::Remap, &[click], SequenceStep::Discrete)
            .unwrap();
        assert_eq!(sink.events().len(), 1);
        assert_eq!(coordinator.holder(device), Some(ProducerId::Drag));
    }

    #[test]
    fn test_devices_are_independent() {
        let (_sink, coordinator) = coordinator();
        coordinator
            .emit(DeviceId(1), ProducerId::Drag, &[], SequenceStep::Open)
            .unwrap();
        assert!(coordinator
            .emit(DeviceId(2), ProducerId::Scroll, &[scroll(ScrollPhase::Began)], SequenceStep::Open)
            .is_ok());
    }

    #[test]
    fn test_release_owner_only_releases_holder() {
        let (_sink, coordinator) = coordinator();
        let device = DeviceId(3);
        coordinator
            .emit(device, ProducerId::Drag, &[], SequenceStep::Open)
            .unwrap();

        coordinator.release_owner(device, ProducerId::Scroll);
        assert_eq!(coordinator.holder(device), Some(ProducerId::Drag));

        coordinator.release_owner(device, ProducerId::Drag);
        assert_eq!(coordinator.holder(device), None);
    }

    #[test]
    fn test_contended_lane_is_refused() {
        let (_sink, coordinator) = coordinator();
        let device = DeviceId(5);
        let lane = coordinator.lane(device);
        let _held = lane.lock();

        let err = coordinator
            .emit(device, ProducerId::Pointer, &[OutputEvent::PointerMove { dx: 1, dy: 0 }], SequenceStep::Discrete)
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmissionRefused { holder: None, .. }));
    }
}

//! Event sinks
//!
//! The sink is the last stage of the pipeline: it injects synthesized events
//! back into the system. The Linux backend writes to a uinput device; the
//! recording sink keeps everything in memory for dry runs and tests.

use crate::device::DeviceId;
use crate::input::error::Result;
use crate::output::OutputEvent;
use parking_lot::Mutex;
use tracing::{debug, info};

/// Destination for synthesized events
pub trait EventSink: Send + Sync {
    /// Inject `events` originating from `device`, in order
    fn emit(&self, device: DeviceId, events: &[OutputEvent]) -> Result<()>;
}

/// In-memory sink
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(DeviceId, OutputEvent)>>,
}

impl RecordingSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn events(&self) -> Vec<(DeviceId, OutputEvent)> {
        self.events.lock().clone()
    }

    /// Drain the recording
    pub fn take(&self) -> Vec<(DeviceId, OutputEvent)> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, device: DeviceId, events: &[OutputEvent]) -> Result<()> {
        let mut recorded = self.events.lock();
        for event in events {
            debug!("{} -> {:?}", device, event);
            recorded.push((device, *event));
        }
        Ok(())
    }
}

/// Sink that only logs, for dry runs
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, device: DeviceId, events: &[OutputEvent]) -> Result<()> {
        for event in events {
            info!(%device, "dry-run: {:?}", event);
        }
        Ok(())
    }
}

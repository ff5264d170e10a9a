//! Event sources
//!
//! An `EventSource` is the interception point the tap thread owns. The Linux
//! backend reads grabbed evdev nodes; `ChannelSource` is fed from another
//! thread and is used by tests and replay tools.

use crate::device::DeviceId;
use crate::input::error::{PipelineError, Result};
use crate::input::event::HardwareEvent;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Interception point for raw hardware events
pub trait EventSource: Send {
    /// Wait up to `timeout` for events and append them to `out`
    ///
    /// Returns without events when the timeout elapses.
    fn poll(&mut self, timeout: Duration, out: &mut Vec<HardwareEvent>) -> Result<()>;

    /// Move the ids of devices that disappeared since the last call to `out`
    fn take_removed(&mut self, _out: &mut Vec<DeviceId>) {}

    /// Give the interception point back to the system
    fn release(&mut self) {}
}

/// Source fed through a channel
#[derive(Debug)]
pub struct ChannelSource {
    receiver: Receiver<HardwareEvent>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    pub fn new() -> (Sender<HardwareEvent>, Self) {
        let (sender, receiver) = unbounded();
        (sender, Self { receiver })
    }
}

impl EventSource for ChannelSource {
    fn poll(&mut self, timeout: Duration, out: &mut Vec<HardwareEvent>) -> Result<()> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => out.push(event),
            Err(RecvTimeoutError::Timeout) => return Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(PipelineError::Source("event feed disconnected".to_string()))
            }
        }
        out.extend(self.receiver.try_iter());
        Ok(())
    }
}

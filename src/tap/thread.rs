//! Event tap thread
//!
//! One dedicated OS thread owns the event source and the `Pipeline` for the
//! life of the process. Everything else talks to it through a bounded
//! control channel:
//!
//! ```text
//!  TickScheduler ──Tick──┐
//!  RemapDaemon ──Reload──┼──> control channel ──> event-tap thread
//!  TapHandle ──Shutdown──┘                           │
//!                                  EventSource.poll ─┤
//!                                                    ▼
//!                                                 Pipeline
//! ```
//!
//! Control messages are drained before every poll, so a tick or reload
//! never waits longer than the poll timeout. A panic while processing an
//! event is caught; the device's session is discarded and the event is
//! forwarded unmodified.

use crate::config::{Config, TapConfig};
use crate::device::DeviceId;
use crate::input::error::{recovery_action, PipelineError, RecoveryAction, Result};
use crate::input::event::HardwareEvent;
use crate::tap::pipeline::Pipeline;
use crate::tap::source::EventSource;
use crate::utils::metrics::PipelineMetrics;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TryRecvError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Backoff after a failed poll
const SOURCE_BACKOFF: Duration = Duration::from_millis(50);

/// Interval between repeated source-failure warnings
const SOURCE_WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Message posted to the tap thread
#[derive(Debug, Clone)]
pub enum TapMessage {
    /// Advance timeouts and momentum
    Tick,
    /// Adopt a validated configuration once sessions are idle
    Reload(Arc<Config>),
    /// Cancel sessions, release the source and exit
    Shutdown,
}

/// Spawns the tap thread
pub struct EventTapThread;

impl EventTapThread {
    /// Start the tap thread
    pub fn spawn<S>(source: S, pipeline: Pipeline, config: &TapConfig) -> Result<TapHandle>
    where
        S: EventSource + 'static,
    {
        let (sender, receiver) = bounded(config.channel_capacity.max(1));
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::clone(pipeline.metrics());
        let poll_timeout = Duration::from_millis(config.poll_timeout_ms.max(1));

        let running = Arc::clone(&is_running);
        let thread = thread::Builder::new()
            .name("event-tap".to_string())
            .spawn(move || {
                run_event_tap(source, pipeline, receiver, poll_timeout);
                running.store(false, Ordering::SeqCst);
            })?;

        info!("Event tap thread started");

        Ok(TapHandle {
            sender,
            is_running,
            metrics,
            thread: Some(thread),
        })
    }
}

/// Control handle for a running tap thread
pub struct TapHandle {
    sender: Sender<TapMessage>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<PipelineMetrics>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TapHandle {
    /// Sender for ticks and other control messages
    pub fn sender(&self) -> Sender<TapMessage> {
        self.sender.clone()
    }

    /// Counters shared with the pipeline
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Hand a validated configuration to the tap thread
    pub fn reload(&self, config: Arc<Config>) -> Result<()> {
        match self
            .sender
            .send_timeout(TapMessage::Reload(config), Duration::from_secs(1))
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(PipelineError::InvalidState(
                "tap thread did not accept the reload".to_string(),
            )),
            Err(SendTimeoutError::Disconnected(_)) => Err(PipelineError::ChannelClosed),
        }
    }

    /// Check if the tap thread is running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Stop the tap thread and wait for it
    pub fn shutdown(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        info!("Stopping event tap");
        if self.sender.send(TapMessage::Shutdown).is_err() {
            debug!("Tap thread already gone");
        }
        if handle.join().is_err() {
            error!("Event tap thread panicked");
        }
        self.is_running.store(false, Ordering::SeqCst);
    }
}

impl Drop for TapHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TapHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapHandle")
            .field("is_running", &self.is_running())
            .field("queued", &self.sender.len())
            .finish()
    }
}

fn run_event_tap<S: EventSource>(
    mut source: S,
    mut pipeline: Pipeline,
    control: Receiver<TapMessage>,
    poll_timeout: Duration,
) {
    let mut batch: Vec<HardwareEvent> = Vec::with_capacity(64);
    let mut removed: Vec<DeviceId> = Vec::new();
    let mut last_warning: Option<Instant> = None;

    'tap: loop {
        loop {
            match control.try_recv() {
                Ok(TapMessage::Tick) => guarded(&mut pipeline, |p| p.tick()),
                Ok(TapMessage::Reload(config)) => pipeline.request_reload(config),
                Ok(TapMessage::Shutdown) => break 'tap,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("Control channel closed");
                    break 'tap;
                }
            }
        }

        batch.clear();
        if let Err(e) = source.poll(poll_timeout, &mut batch) {
            match recovery_action(&e, 0) {
                RecoveryAction::Fail => {
                    error!("Event source failed permanently: {}", e);
                    break 'tap;
                }
                _ => {
                    let due = last_warning.map_or(true, |t| t.elapsed() >= SOURCE_WARN_INTERVAL);
                    if due {
                        warn!("Event source error: {}", e);
                        last_warning = Some(Instant::now());
                    }
                    thread::sleep(SOURCE_BACKOFF);
                }
            }
        }

        source.take_removed(&mut removed);
        for device in removed.drain(..) {
            pipeline.remove_device(device);
        }

        for event in batch.drain(..) {
            let outcome = catch_unwind(AssertUnwindSafe(|| pipeline.process(event)));
            if outcome.is_err() {
                error!("Fault while processing {:?}, passing it through", event.kind);
                pipeline.recover_fault(event);
            }
        }
    }

    pipeline.shutdown();
    source.release();
    info!("Event tap stopped");
}

/// Run `f`, discarding every session if it panics
fn guarded(pipeline: &mut Pipeline, f: impl FnOnce(&mut Pipeline)) {
    if catch_unwind(AssertUnwindSafe(|| f(pipeline))).is_err() {
        error!("Fault during tick, resetting sessions");
        pipeline.metrics().record_fault();
        pipeline.shutdown();
    }
}

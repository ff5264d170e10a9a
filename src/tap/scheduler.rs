//! Tick scheduler
//!
//! Drives idle timeouts and momentum. The scheduler never touches pipeline
//! state; it only posts `TapMessage::Tick` to the tap thread. A full control
//! channel means the tap thread is behind, and the tick is skipped rather
//! than queued.

use crate::tap::thread::TapMessage;
use crate::utils::metrics::PipelineMetrics;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Periodic tick source running on the tokio runtime
#[derive(Debug)]
pub struct TickScheduler {
    task: Option<JoinHandle<()>>,
}

impl TickScheduler {
    /// Start posting ticks every `interval`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        sender: Sender<TapMessage>,
        interval: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                match sender.try_send(TapMessage::Tick) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        trace!("Tap thread busy, tick skipped");
                        metrics.record_tick_skipped();
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        debug!("Tap thread gone, tick scheduler stopping");
                        break;
                    }
                }
            }
        });

        Self { task: Some(task) }
    }

    /// True while the tick task is alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop posting ticks
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

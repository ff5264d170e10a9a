//! Event tap
//!
//! The capture side of the daemon: the interception point (`EventSource`),
//! the single-threaded transformation `Pipeline`, the dedicated thread that
//! owns both, and the scheduler that feeds it ticks.

pub mod pipeline;
pub mod scheduler;
pub mod source;
pub mod thread;

pub use pipeline::Pipeline;
pub use scheduler::TickScheduler;
pub use source::{ChannelSource, EventSource};
pub use thread::{EventTapThread, TapHandle, TapMessage};

//! # lamco-pointerd
//!
//! Pointer remapping daemon for Linux.
//!
//! Intercepts raw pointing-device input, reshapes it, and re-injects the
//! result through a virtual device:
//! - acceleration curves fitted from a handful of `[speed, gain]` samples
//! - sub-pixel accumulation so fractional motion is never lost
//! - button/modifier mappings (clicks, key combos, drag gestures)
//! - smooth scrolling with phases and momentum
//!
//! # Architecture
//!
//! ```text
//! lamco-pointerd
//!   ├─> EvdevSource (grab /dev/input/eventN)
//!   ├─> EventTapThread
//!   │     └─> Pipeline (one session per device)
//!   │           ├─> ModifierResolver ──> MappingTable
//!   │           ├─> PointerAccelerator ──> AccelerationTable + SubPixelator
//!   │           ├─> ScrollSimulator ──> Momentum
//!   │           └─> ModifiedDrag
//!   ├─> OutputCoordinator ──> UinputSink (/dev/uinput)
//!   └─> TickScheduler (tokio interval, timeouts and momentum)
//! ```
//!
//! # Data Flow
//!
//! **Input Path:** Device → EvdevSource → tap thread → Pipeline
//!
//! **Output Path:** Pipeline → OutputCoordinator → EventSink → Compositor
//!
//! **Control Path:** TickScheduler / SIGHUP → control channel → tap thread

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Acceleration tables and pointer acceleration
pub mod accel;

/// Linux evdev/uinput substrate
pub mod backend;

/// Daemon configuration
pub mod config;

/// Process lifecycle and signal handling
pub mod daemon;

/// Device identity and table registry
pub mod device;

/// Input events, modifiers, clocks and sub-pixel accumulation
pub mod input;

/// Output coordination and event sinks
pub mod output;

/// Modifier mappings and modified drags
pub mod remap;

/// Scroll phases and momentum
pub mod scroll;

/// Event tap thread and pipeline
pub mod tap;

/// Utility functions
pub mod utils;

pub use config::Config;
pub use daemon::{DaemonOptions, RemapDaemon};
pub use input::error::{PipelineError, Result};

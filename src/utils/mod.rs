//! Utility Functions and Diagnostics
//!
//! Startup diagnostics, pipeline metrics, and user-friendly error formatting.
//!
//! # Overview
//!
//! 1. **Diagnostics** - System information and input device access checks
//! 2. **Metrics** - Counters and latency statistics for the event tap
//! 3. **Error Formatting** - User-friendly error messages with troubleshooting hints
//!
//! ## Metrics
//!
//! ```rust
//! use lamco_pointerd::utils::PipelineMetrics;
//!
//! let metrics = PipelineMetrics::new();
//! metrics.record_event();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.events_processed, 1);
//! ```
//!
//! The snapshot is also exported as JSON; the daemon
//! logs a summary periodically when `logging.metrics` is enabled.
//!
//! ## Error Formatting
//!
//! [`format_user_error`] renders an `anyhow::Error` chain with a boxed header,
//! the likely causes (device permissions, exclusive grab, uinput, config),
//! and the full technical details.

pub mod circular_buffer;
pub mod diagnostics;
pub mod errors;
pub mod metrics;

pub use circular_buffer::CircularBuffer;
pub use diagnostics::{log_startup_diagnostics, InputAccess, SystemInfo};
pub use errors::format_user_error;
pub use metrics::{HistogramStats, MetricsSnapshot, PipelineMetrics};

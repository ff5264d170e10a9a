//! Input Events and Shared Input State
//!
//! Types describing captured events as they move through the pipeline, the
//! modifier state the capture thread maintains, sub-pixel accumulators, the
//! monotonic clock used for stamping and the pipeline error types.
//!
//! # Event lifecycle
//!
//! ```text
//! EventSource ──> HardwareEvent ──(stamp)──> RawInputEvent ──> pipeline
//!                 no timestamp               immutable, owned by the
//!                                            stage processing it
//! ```

pub mod clock;
pub mod error;
pub mod event;
pub mod modifiers;
pub mod subpixel;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{classify_error, recovery_action, ErrorType, PipelineError, RecoveryAction, Result};
pub use event::{EventKind, HardwareEvent, MouseButton, RawInputEvent, ScrollPhase};
pub use modifiers::{Modifier, ModifierSet, ModifierState};
pub use subpixel::{SubPixelator, VectorSubPixelator};

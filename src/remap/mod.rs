//! Remapping
//!
//! Configured mappings, the per-device `ModifierResolver` that selects which
//! transformation applies to an event, and the `ModifiedDrag` state machine
//! that turns drags into gestures.
//!
//! # Flow
//!
//! ```text
//! button/scroll ──> ModifierResolver ──┬─> Fire(action)      ──> clicks, key combos
//!                                      ├─> BeginDrag/EndDrag ──> ModifiedDrag
//!                                      ├─> Scroll(modifier)  ──> ScrollSimulator
//!                                      └─> PassThrough       ──> unmodified
//! ```

pub mod action;
pub mod drag;
pub mod resolver;

pub use action::{Action, DragKind, KeyCombo, Mapping, ScrollModification, Trigger};
pub use drag::{DragConfig, DragMotion, DragSession, DragState, ModifiedDrag, SwipeConfig};
pub use resolver::{MappingTable, ModifierResolver, Resolution, ResolverInput, ResolverState};

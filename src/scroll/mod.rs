//! Scroll Synthesis
//!
//! Phase-tagged scroll output for wheel input (`ScrollSimulator`) and for
//! gestures produced by modified drags (`GestureScrollSimulator`), sharing
//! one momentum model.

pub mod gesture;
pub mod momentum;
pub mod simulator;

pub use gesture::{GestureInput, GestureScrollSimulator};
pub use momentum::{Momentum, MomentumConfig};
pub use simulator::{
    modify_delta, ScrollConfig, ScrollInput, ScrollSession, ScrollSimulator, ScrollStep,
    StepOutput,
};

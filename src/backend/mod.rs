//! Linux input substrate
//!
//! ```text
//! /dev/input/eventN ──grab──> EvdevSource ──HardwareEvent──> tap thread
//!                                                                │
//! compositor <── /dev/uinput <── UinputSink <──OutputEvent───────┘
//! ```
//!
//! Nothing outside this module sees evdev types.

pub mod evdev_source;
pub mod uinput_sink;

pub use evdev_source::{event_nodes, DeviceRole, DiscoveredDevice, EvdevSource, FrameDecoder, KeyboardTracker};
pub use uinput_sink::{UinputEncoder, UinputSink, VIRTUAL_DEVICE_NAME};

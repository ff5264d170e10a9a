//! Input Event Model
//!
//! `HardwareEvent` is what an event source delivers. The tap thread stamps it
//! with a monotonic timestamp, producing an immutable `RawInputEvent` that is
//! handed to exactly one pipeline stage at a time.

use crate::device::DeviceId;
use crate::input::modifiers::ModifierSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pointing-device buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    /// Primary button
    Left,
    /// Secondary button
    Right,
    /// Wheel button
    Middle,
    /// Side button (back on most mice)
    Button4,
    /// Extra button (forward on most mice)
    Button5,
    /// Forward button
    Button6,
    /// Back button
    Button7,
    /// Task button
    Button8,
}

impl MouseButton {
    /// Every button, in evdev code order
    pub const ALL: [MouseButton; 8] = [
        MouseButton::Left,
        MouseButton::Right,
        MouseButton::Middle,
        MouseButton::Button4,
        MouseButton::Button5,
        MouseButton::Button6,
        MouseButton::Button7,
        MouseButton::Button8,
    ];

    /// Linux evdev key code
    pub fn to_linux_button(self) -> u16 {
        match self {
            MouseButton::Left => 0x110,    // BTN_LEFT
            MouseButton::Right => 0x111,   // BTN_RIGHT
            MouseButton::Middle => 0x112,  // BTN_MIDDLE
            MouseButton::Button4 => 0x113, // BTN_SIDE
            MouseButton::Button5 => 0x114, // BTN_EXTRA
            MouseButton::Button6 => 0x115, // BTN_FORWARD
            MouseButton::Button7 => 0x116, // BTN_BACK
            MouseButton::Button8 => 0x117, // BTN_TASK
        }
    }

    /// Convert from a Linux evdev key code
    pub fn from_linux_button(code: u16) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|b| b.to_linux_button() == code)
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
            MouseButton::Button4 => "button4",
            MouseButton::Button5 => "button5",
            MouseButton::Button6 => "button6",
            MouseButton::Button7 => "button7",
            MouseButton::Button8 => "button8",
        };
        write!(f, "{}", name)
    }
}

/// Position of an event within a continuous gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollPhase {
    /// First event after idle
    Began,
    /// Subsequent events of the same gesture
    Changed,
    /// Gesture finished (idle timeout or release)
    Ended,
    /// Gesture aborted
    Cancelled,
    /// Synthetic inertial event after `Ended`
    Momentum,
    /// Inertial tail finished
    MomentumEnded,
}

impl ScrollPhase {
    /// Phase closes the current sequence
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScrollPhase::Ended | ScrollPhase::Cancelled | ScrollPhase::MomentumEnded
        )
    }
}

/// Raw event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Relative pointer motion
    Move,
    /// Wheel or trackpad scroll (delta in wheel ticks)
    Scroll,
    /// Button pressed
    ButtonDown(MouseButton),
    /// Button released
    ButtonUp(MouseButton),
    /// Relative motion while a button is held
    Drag(MouseButton),
    /// Keyboard modifier flags changed (carries the new keyboard flags)
    FlagsChanged(ModifierSet),
}

impl EventKind {
    /// Motion with or without a held button
    pub fn is_motion(&self) -> bool {
        matches!(self, EventKind::Move | EventKind::Drag(_))
    }
}

/// Event as delivered by an event source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardwareEvent {
    /// Originating device
    pub device_id: DeviceId,

    /// Event kind
    pub kind: EventKind,

    /// Raw delta `[x, y]` (pixels for motion, ticks for scroll)
    pub delta: [f64; 2],

    /// Phase reported by the hardware (trackpads only)
    pub phase: Option<ScrollPhase>,
}

impl HardwareEvent {
    /// Relative motion
    pub fn motion(device_id: DeviceId, dx: f64, dy: f64) -> Self {
        Self {
            device_id,
            kind: EventKind::Move,
            delta: [dx, dy],
            phase: None,
        }
    }

    /// Scroll delta
    pub fn scroll(device_id: DeviceId, dx: f64, dy: f64) -> Self {
        Self {
            device_id,
            kind: EventKind::Scroll,
            delta: [dx, dy],
            phase: None,
        }
    }

    /// Button transition
    pub fn button(device_id: DeviceId, button: MouseButton, pressed: bool) -> Self {
        Self {
            device_id,
            kind: if pressed {
                EventKind::ButtonDown(button)
            } else {
                EventKind::ButtonUp(button)
            },
            delta: [0.0, 0.0],
            phase: None,
        }
    }

    /// Keyboard modifier flags changed
    pub fn flags(device_id: DeviceId, flags: ModifierSet) -> Self {
        Self {
            device_id,
            kind: EventKind::FlagsChanged(flags),
            delta: [0.0, 0.0],
            phase: None,
        }
    }
}

/// Timestamped, immutable raw event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawInputEvent {
    /// Originating device
    pub device_id: DeviceId,

    /// Monotonic capture time
    pub timestamp_ns: u64,

    /// Event kind
    pub kind: EventKind,

    /// Raw delta `[x, y]`
    pub delta: [f64; 2],

    /// Hardware-reported phase
    pub phase: Option<ScrollPhase>,
}

impl RawInputEvent {
    /// Stamp a hardware event
    pub fn stamp(event: HardwareEvent, timestamp_ns: u64) -> Self {
        Self {
            device_id: event.device_id,
            timestamp_ns,
            kind: event.kind,
            delta: event.delta,
            phase: event.phase,
        }
    }

    /// Euclidean magnitude of the delta
    pub fn magnitude(&self) -> f64 {
        self.delta[0].hypot(self.delta[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_codes_round_trip() {
        for button in MouseButton::ALL {
            assert_eq!(
                MouseButton::from_linux_button(button.to_linux_button()),
                Some(button)
            );
        }
        assert_eq!(MouseButton::from_linux_button(0x1f0), None);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(ScrollPhase::Ended.is_terminal());
        assert!(ScrollPhase::Cancelled.is_terminal());
        assert!(ScrollPhase::MomentumEnded.is_terminal());
        assert!(!ScrollPhase::Began.is_terminal());
        assert!(!ScrollPhase::Momentum.is_terminal());
    }

    #[test]
    fn test_stamp_preserves_fields() {
        let hw = HardwareEvent::scroll(DeviceId(2), 0.0, -3.0);
        let raw = RawInputEvent::stamp(hw, 1234);

        assert_eq!(raw.device_id, DeviceId(2));
        assert_eq!(raw.timestamp_ns, 1234);
        assert_eq!(raw.kind, EventKind::Scroll);
        assert!((raw.magnitude() - 3.0).abs() < 1e-12);
    }
}

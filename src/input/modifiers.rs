//! Modifier State
//!
//! Held keyboard modifiers and held mouse buttons share one bitset so a
//! mapping such as "Control + Button4" is a single `ModifierSet`.

use crate::input::event::MouseButton;
use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize};

/// Individual modifier flag
#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    /// Either Shift key
    Shift = 1 << 0,
    /// Either Control key
    Control = 1 << 1,
    /// Either Alt key
    Alt = 1 << 2,
    /// Super/Windows/Command key
    Meta = 1 << 3,
    /// Left button held
    Left = 1 << 4,
    /// Right button held
    Right = 1 << 5,
    /// Middle button held
    Middle = 1 << 6,
    /// Side button held
    Button4 = 1 << 7,
    /// Extra button held
    Button5 = 1 << 8,
    /// Forward button held
    Button6 = 1 << 9,
    /// Back button held
    Button7 = 1 << 10,
    /// Task button held
    Button8 = 1 << 11,
}

/// Set of held modifiers
pub type ModifierSet = BitFlags<Modifier>;

/// Keyboard-only flags
pub fn keyboard_flags() -> ModifierSet {
    Modifier::Shift | Modifier::Control | Modifier::Alt | Modifier::Meta
}

impl Modifier {
    /// Flag representing a held mouse button
    pub fn from_button(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => Modifier::Left,
            MouseButton::Right => Modifier::Right,
            MouseButton::Middle => Modifier::Middle,
            MouseButton::Button4 => Modifier::Button4,
            MouseButton::Button5 => Modifier::Button5,
            MouseButton::Button6 => Modifier::Button6,
            MouseButton::Button7 => Modifier::Button7,
            MouseButton::Button8 => Modifier::Button8,
        }
    }

    /// Map a Linux evdev key code to a keyboard modifier
    pub fn from_linux_key(code: u16) -> Option<Self> {
        match code {
            42 | 54 => Some(Modifier::Shift),    // KEY_LEFTSHIFT, KEY_RIGHTSHIFT
            29 | 97 => Some(Modifier::Control),  // KEY_LEFTCTRL, KEY_RIGHTCTRL
            56 | 100 => Some(Modifier::Alt),     // KEY_LEFTALT, KEY_RIGHTALT
            125 | 126 => Some(Modifier::Meta),   // KEY_LEFTMETA, KEY_RIGHTMETA
            _ => None,
        }
    }
}

/// Currently held modifiers
///
/// Written only by the tap thread on key/button transitions; read by the
/// resolver on every event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    held: ModifierSet,
}

impl ModifierState {
    /// Nothing held
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the keyboard portion of the set
    pub fn set_keyboard(&mut self, flags: ModifierSet) {
        self.held = (self.held & !keyboard_flags()) | (flags & keyboard_flags());
    }

    /// Record a button press
    pub fn press(&mut self, button: MouseButton) {
        self.held |= Modifier::from_button(button);
    }

    /// Record a button release
    pub fn release(&mut self, button: MouseButton) {
        self.held &= !BitFlags::from(Modifier::from_button(button));
    }

    /// Complete held set
    pub fn held(&self) -> ModifierSet {
        self.held
    }

    /// True when `button` is held
    pub fn is_held(&self, button: MouseButton) -> bool {
        self.held.contains(Modifier::from_button(button))
    }

    /// Clear everything
    pub fn clear(&mut self) {
        self.held = ModifierSet::empty();
    }
}

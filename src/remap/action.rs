//! Mapping Actions
//!
//! The action set is closed: every resolution the remapper can produce is one
//! of the variants below and is matched exhaustively by the pipeline.

use crate::input::event::MouseButton;
use crate::input::modifiers::ModifierSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of keys in one combo
pub const MAX_COMBO_KEYS: usize = 6;

/// Fixed-capacity list of Linux key codes pressed together
///
/// Keys are pressed in order and released in reverse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u16>", into = "Vec<u16>")]
pub struct KeyCombo {
    keys: [u16; MAX_COMBO_KEYS],
    len: u8,
}

impl KeyCombo {
    /// Build from key codes
    pub fn new(keys: &[u16]) -> Result<Self, String> {
        if keys.is_empty() {
            return Err("key combo must contain at least one key".to_string());
        }
        if keys.len() > MAX_COMBO_KEYS {
            return Err(format!(
                "key combo has {} keys, maximum is {}",
                keys.len(),
                MAX_COMBO_KEYS
            ));
        }
        let mut buf = [0u16; MAX_COMBO_KEYS];
        buf[..keys.len()].copy_from_slice(keys);
        Ok(Self {
            keys: buf,
            len: keys.len() as u8,
        })
    }

    /// Build from a fixed list of codes (keys beyond the maximum are ignored)
    pub fn from_keys<const M: usize>(keys: [u16; M]) -> Self {
        let len = M.min(MAX_COMBO_KEYS);
        let mut buf = [0u16; MAX_COMBO_KEYS];
        buf[..len].copy_from_slice(&keys[..len]);
        Self {
            keys: buf,
            len: len as u8,
        }
    }

    /// Key codes in press order
    pub fn keys(&self) -> &[u16] {
        &self.keys[..self.len as usize]
    }
}

impl TryFrom<Vec<u16>> for KeyCombo {
    type Error = String;

    fn try_from(keys: Vec<u16>) -> Result<Self, Self::Error> {
        KeyCombo::new(&keys)
    }
}

impl From<KeyCombo> for Vec<u16> {
    fn from(combo: KeyCombo) -> Self {
        combo.keys().to_vec()
    }
}

/// Synthetic output produced by an active drag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragKind {
    /// Drag motion becomes continuous scrolling
    ScrollGesture,
    /// Drag motion becomes a swipe (workspace/app switching)
    SwipeGesture,
    /// Button press is replayed and the drag passes through
    PassThrough,
}

/// Transformation applied to scroll deltas while a mapping is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollModification {
    /// Slow, fine-grained scrolling
    Precise,
    /// Fast scrolling
    Quick,
    /// Exchange horizontal and vertical axes
    SwapAxes,
    /// Fold both axes into horizontal scrolling
    Horizontal,
}

/// Action a mapping triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Synthesize a click of `button`
    Click {
        /// Button to click
        button: MouseButton,
    },
    /// Press and release a key combination
    KeyCombo {
        /// Keys to press
        keys: KeyCombo,
    },
    /// Turn a held-button drag into a gesture
    Drag {
        /// Gesture produced while dragging
        kind: DragKind,
    },
    /// Modify scroll deltas
    ScrollModify {
        /// Modification to apply
        modification: ScrollModification,
    },
    /// Swallow the trigger
    None,
}

/// Input that activates a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Press and release of a button
    Click {
        /// Triggering button
        button: MouseButton,
    },
    /// Press of a button followed by motion
    Drag {
        /// Triggering button
        button: MouseButton,
    },
    /// Scroll input
    Scroll,
}

impl Trigger {
    /// Button this trigger is bound to
    pub fn button(&self) -> Option<MouseButton> {
        match self {
            Trigger::Click { button } | Trigger::Drag { button } => Some(*button),
            Trigger::Scroll => None,
        }
    }

    /// Whether `action` makes sense for this trigger
    pub fn accepts(&self, action: &Action) -> bool {
        match self {
            Trigger::Click { .. } => matches!(
                action,
                Action::Click { .. } | Action::KeyCombo { .. } | Action::None
            ),
            Trigger::Drag { .. } => matches!(action, Action::Drag { .. }),
            Trigger::Scroll => matches!(
                action,
                Action::ScrollModify { .. } | Action::KeyCombo { .. } | Action::None
            ),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Click { button } => write!(f, "click({})", button),
            Trigger::Drag { button } => write!(f, "drag({})", button),
            Trigger::Scroll => write!(f, "scroll"),
        }
    }
}

/// One configured mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Input that activates the mapping
    pub trigger: Trigger,
    /// Modifiers that must be held (subset match)
    pub modifiers: ModifierSet,
    /// Action to take
    pub action: Action,
}

impl Mapping {
    /// Number of modifiers required
    pub fn specificity(&self) -> u32 {
        self.modifiers.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_combo_limits() {
        assert!(KeyCombo::new(&[]).is_err());
        assert!(KeyCombo::new(&[1, 2, 3, 4, 5, 6, 7]).is_err());

        let combo = KeyCombo::new(&[29, 56, 105]).unwrap();
        assert_eq!(combo.keys(), &[29, 56, 105]);
    }

    #[test]
    fn test_action_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            action: Action,
        }

        let w: Wrapper =
            toml::from_str(r#"action = { type = "scroll_modify", modification = "precise" }"#)
                .unwrap();
        assert_eq!(
            w.action,
            Action::ScrollModify {
                modification: ScrollModification::Precise
            }
        );

        let w: Wrapper = toml::from_str(r#"action = { type = "key_combo", keys = [29, 46] }"#)
            .unwrap();
        assert!(matches!(w.action, Action::KeyCombo { keys } if keys.keys() == [29, 46]));

        let w: Wrapper = toml::from_str(r#"action = { type = "none" }"#).unwrap();
        assert_eq!(w.action, Action::None);
    }

    #[test]
    fn test_trigger_accepts() {
        let drag = Action::Drag {
            kind: DragKind::ScrollGesture,
        };
        assert!(Trigger::Drag {
            button: MouseButton::Middle
        }
        .accepts(&drag));
        assert!(!Trigger::Click {
            button: MouseButton::Middle
        }
        .accepts(&drag));
        assert!(!Trigger::Scroll.accepts(&Action::Click {
            button: MouseButton::Left
        }));
    }
}

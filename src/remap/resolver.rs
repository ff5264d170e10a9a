//! Modifier Resolution
//!
//! Decides, per incoming event, which transformation applies given the
//! currently held modifiers.
//!
//! # Mapping selection
//!
//! A mapping matches when its trigger equals the event and its modifier set
//! is a subset of the held set. Among matches the most specific (most
//! modifiers) wins. Two mappings for the same trigger with equally many
//! modifiers could both match whenever their union is held, so such a pair
//! is only accepted if a mapping for exactly the union exists; otherwise the
//! table is rejected at load time.
//!
//! # State machine
//!
//! ```text
//!            press(mapped)              press(drag trigger)
//!   Idle ───────────────────> ButtonHeld ──────────────────> DragCandidate
//!    ▲  <─────────────────── (last release)                      │
//!    │                                                            │ release
//!    │        scroll(modify mapping)                              ▼
//!    └──── ScrollModifierActive <──────────────────────────── ButtonHeld/Idle
//! ```
//!
//! Buttons that appear in any mapping are suppressed on press. On release the
//! click mapping for that button fires; if there is none the original click
//! is replayed, unless the button was used as a modifier in the meantime.

use crate::input::event::MouseButton;
use crate::input::modifiers::{Modifier, ModifierSet};
use crate::input::error::{PipelineError, Result};
use crate::remap::action::{Action, DragKind, Mapping, ScrollModification, Trigger};
use std::sync::Arc;
use tracing::{debug, trace};

/// Validated set of mappings
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    mappings: Vec<Mapping>,
    /// Buttons used as triggers or modifiers by any mapping
    involved: ModifierSet,
}

impl MappingTable {
    /// Validate and build a table
    pub fn new(mappings: Vec<Mapping>) -> Result<Self> {
        for (i, m) in mappings.iter().enumerate() {
            if !m.trigger.accepts(&m.action) {
                return Err(PipelineError::ConfigurationInvalid(format!(
                    "mapping {}: action {:?} is not valid for trigger {}",
                    i, m.action, m.trigger
                )));
            }
            if let Some(button) = m.trigger.button() {
                if m.modifiers.contains(Modifier::from_button(button)) {
                    return Err(PipelineError::ConfigurationInvalid(format!(
                        "mapping {}: trigger {} lists its own button as a modifier",
                        i, m.trigger
                    )));
                }
            }
        }

        for (i, a) in mappings.iter().enumerate() {
            for (j, b) in mappings.iter().enumerate().skip(i + 1) {
                if a.trigger != b.trigger {
                    continue;
                }
                if a.modifiers == b.modifiers {
                    return Err(PipelineError::ConfigurationInvalid(format!(
                        "mappings {} and {} both bind {} with modifiers {:?}",
                        i, j, a.trigger, a.modifiers
                    )));
                }
                if a.specificity() == b.specificity() {
                    let union = a.modifiers | b.modifiers;
                    let covered = mappings
                        .iter()
                        .any(|m| m.trigger == a.trigger && m.modifiers == union);
                    if !covered {
                        return Err(PipelineError::ConfigurationInvalid(format!(
                            "mappings {} and {} for {} are equally specific ({:?} vs {:?}); \
                             add a mapping for {:?} to disambiguate",
                            i, j, a.trigger, a.modifiers, b.modifiers, union
                        )));
                    }
                }
            }
        }

        let mut involved = ModifierSet::empty();
        for m in &mappings {
            if let Some(button) = m.trigger.button() {
                involved |= Modifier::from_button(button);
            }
            involved |= m.modifiers & button_flags();
        }

        Ok(Self { mappings, involved })
    }

    /// Most specific mapping for `trigger` whose modifiers are all held
    pub fn best_match(&self, trigger: Trigger, held: ModifierSet) -> Option<&Mapping> {
        self.mappings
            .iter()
            .filter(|m| m.trigger == trigger && held.contains(m.modifiers))
            .max_by_key(|m| m.specificity())
    }

    /// True when any mapping references `button`
    pub fn involves(&self, button: MouseButton) -> bool {
        self.involved.contains(Modifier::from_button(button))
    }

    /// Number of mappings
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// True when there are no mappings
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

fn button_flags() -> ModifierSet {
    MouseButton::ALL
        .iter()
        .fold(ModifierSet::empty(), |acc, b| acc | Modifier::from_button(*b))
}

/// Resolver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    /// No mapped button held
    Idle,
    /// Mapped buttons held and suppressed
    ButtonHeld(ModifierSet),
    /// Drag trigger held, drag not necessarily active yet
    DragCandidate {
        /// Drag trigger
        button: MouseButton,
        /// Other suppressed buttons
        held: ModifierSet,
    },
    /// A scroll modification mapping is in effect
    ScrollModifierActive {
        /// Active modification
        modification: ScrollModification,
        /// Suppressed buttons
        held: ModifierSet,
    },
}

impl ResolverState {
    /// Suppressed buttons, including a drag trigger
    pub fn suppressed(&self) -> ModifierSet {
        match *self {
            ResolverState::Idle => ModifierSet::empty(),
            ResolverState::ButtonHeld(held) => held,
            ResolverState::DragCandidate { button, held } => held | Modifier::from_button(button),
            ResolverState::ScrollModifierActive { held, .. } => held,
        }
    }

    fn from_held(held: ModifierSet) -> Self {
        if held.is_empty() {
            ResolverState::Idle
        } else {
            ResolverState::ButtonHeld(held)
        }
    }
}

/// Input to the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverInput {
    /// Button pressed
    ButtonDown(MouseButton),
    /// Button released
    ButtonUp(MouseButton),
    /// Scroll event
    Scroll,
    /// Keyboard modifiers changed
    FlagsChanged,
    /// Abandon every pending mapping
    Cancel,
}

/// What the pipeline should do with the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No mapping applies; process normally
    PassThrough,
    /// Consume the event
    Suppress,
    /// Run an action
    Fire(Action),
    /// Emit the press/release the resolver swallowed
    ReplayClick(MouseButton),
    /// Open a drag session
    BeginDrag {
        /// Triggering button
        button: MouseButton,
        /// Gesture produced once active
        kind: DragKind,
    },
    /// Close the drag session
    EndDrag {
        /// Triggering button
        button: MouseButton,
        /// Action for a release that never left the deadzone (None = replay)
        tap: Option<Action>,
    },
    /// Scroll with the given modification
    Scroll(Option<ScrollModification>),
}

/// Per-device modifier resolver
#[derive(Debug, Clone)]
pub struct ModifierResolver {
    table: Arc<MappingTable>,
    state: ResolverState,
    /// Suppressed buttons that served as a modifier since being pressed
    used: ModifierSet,
}

impl ModifierResolver {
    /// Create an idle resolver
    pub fn new(table: Arc<MappingTable>) -> Self {
        Self {
            table,
            state: ResolverState::Idle,
            used: ModifierSet::empty(),
        }
    }

    /// Current state
    pub fn state(&self) -> ResolverState {
        self.state
    }

    /// True when nothing is held or active
    pub fn is_idle(&self) -> bool {
        self.state == ResolverState::Idle
    }

    /// Install a new mapping table (only while idle)
    pub fn set_table(&mut self, table: Arc<MappingTable>) -> Result<()> {
        if !self.is_idle() {
            return Err(PipelineError::InvalidState(
                "cannot replace mappings while a mapping is held".to_string(),
            ));
        }
        self.table = table;
        Ok(())
    }

    /// Advance the state machine
    ///
    /// `held` is the modifier state after the input was applied.
    pub fn transition(&mut self, input: ResolverInput, held: ModifierSet) -> Resolution {
        let (next, resolution) = match (self.state, input) {
            (state, ResolverInput::ButtonDown(button)) => self.on_press(state, button, held),

            (ResolverState::DragCandidate { button, held: others }, ResolverInput::ButtonUp(b))
                if b == button =>
            {
                let tap = self.click_action(button, held);
                (
                    ResolverState::from_held(others),
                    Resolution::EndDrag { button, tap },
                )
            }

            (state, ResolverInput::ButtonUp(button))
                if state.suppressed().contains(Modifier::from_button(button)) =>
            {
                let flag = Modifier::from_button(button);
                let next = match state {
                    ResolverState::DragCandidate { button: trigger, held: others } => {
                        ResolverState::DragCandidate {
                            button: trigger,
                            held: others & !ModifierSet::from(flag),
                        }
                    }
                    other => ResolverState::from_held(other.suppressed() & !ModifierSet::from(flag)),
                };
                (next, self.click_resolution(button, held))
            }

            (_, ResolverInput::ButtonUp(_)) => (self.state, Resolution::PassThrough),

            (state, ResolverInput::Scroll) => self.on_scroll(state, held),

            (ResolverState::ScrollModifierActive { modification, held: others }, ResolverInput::FlagsChanged) => {
                let still_active = matches!(
                    self.table.best_match(Trigger::Scroll, held).map(|m| m.action),
                    Some(Action::ScrollModify { modification: m }) if m == modification
                );
                let next = if still_active {
                    self.state
                } else {
                    ResolverState::from_held(others)
                };
                (next, Resolution::Suppress)
            }

            (state, ResolverInput::FlagsChanged) => (state, Resolution::Suppress),

            (_, ResolverInput::Cancel) => {
                self.used = ModifierSet::empty();
                (ResolverState::Idle, Resolution::Suppress)
            }
        };

        if next != self.state {
            trace!("Resolver {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        resolution
    }

    fn on_press(
        &mut self,
        state: ResolverState,
        button: MouseButton,
        held: ModifierSet,
    ) -> (ResolverState, Resolution) {
        let flag = Modifier::from_button(button);
        let others = held & !ModifierSet::from(flag);

        let drag = match state {
            ResolverState::DragCandidate { .. } => None,
            _ => self
                .table
                .best_match(Trigger::Drag { button }, others)
                .copied(),
        };

        if let Some(mapping) = drag {
            if let Action::Drag { kind } = mapping.action {
                self.used &= !ModifierSet::from(flag);
                self.used |= mapping.modifiers & button_flags();
                debug!("Drag candidate on {} ({:?})", button, kind);
                return (
                    ResolverState::DragCandidate {
                        button,
                        held: state.suppressed(),
                    },
                    Resolution::BeginDrag { button, kind },
                );
            }
        }

        if !self.table.involves(button) {
            return (state, Resolution::PassThrough);
        }

        self.used &= !ModifierSet::from(flag);
        let next = match state {
            ResolverState::Idle => ResolverState::ButtonHeld(flag.into()),
            ResolverState::ButtonHeld(set) => ResolverState::ButtonHeld(set | flag),
            ResolverState::DragCandidate { button: trigger, held } => ResolverState::DragCandidate {
                button: trigger,
                held: held | flag,
            },
            ResolverState::ScrollModifierActive { modification, held } => {
                ResolverState::ScrollModifierActive {
                    modification,
                    held: held | flag,
                }
            }
        };
        (next, Resolution::Suppress)
    }

    fn on_scroll(&mut self, state: ResolverState, held: ModifierSet) -> (ResolverState, Resolution) {
        let mapping = self.table.best_match(Trigger::Scroll, held).copied();

        let Some(mapping) = mapping else {
            let next = match state {
                ResolverState::ScrollModifierActive { held, .. } => ResolverState::from_held(held),
                other => other,
            };
            return (next, Resolution::Scroll(None));
        };

        self.used |= mapping.modifiers & button_flags();

        match mapping.action {
            Action::ScrollModify { modification } => {
                let next = match state {
                    ResolverState::DragCandidate { .. } => state,
                    other => ResolverState::ScrollModifierActive {
                        modification,
                        held: other.suppressed(),
                    },
                };
                (next, Resolution::Scroll(Some(modification)))
            }
            Action::None => (state, Resolution::Suppress),
            action @ (Action::KeyCombo { .. } | Action::Click { .. } | Action::Drag { .. }) => {
                (state, Resolution::Fire(action))
            }
        }
    }

    /// Click mapping for `button`, marking its modifiers used
    fn click_action(&mut self, button: MouseButton, held: ModifierSet) -> Option<Action> {
        let flag = Modifier::from_button(button);
        let others = held & !ModifierSet::from(flag);
        let mapping = self
            .table
            .best_match(Trigger::Click { button }, others)
            .copied()?;
        self.used |= mapping.modifiers & button_flags();
        Some(mapping.action)
    }

    fn click_resolution(&mut self, button: MouseButton, held: ModifierSet) -> Resolution {
        let flag = Modifier::from_button(button);
        let resolution = match self.click_action(button, held) {
            Some(Action::None) => Resolution::Suppress,
            Some(action) => Resolution::Fire(action),
            None if self.used.contains(flag) => Resolution::Suppress,
            None => Resolution::ReplayClick(button),
        };
        self.used &= !ModifierSet::from(flag);
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remap::action::KeyCombo;

    fn mapping(trigger: Trigger, modifiers: ModifierSet, action: Action) -> Mapping {
        Mapping {
            trigger,
            modifiers,
            action,
        }
    }

    fn precise() -> Action {
        Action::ScrollModify {
            modification: ScrollModification::Precise,
        }
    }

    #[test]
    fn test_identical_mappings_rejected() {
        let result = MappingTable::new(vec![
            mapping(Trigger::Scroll, Modifier::Shift.into(), precise()),
            mapping(Trigger::Scroll, Modifier::Shift.into(), Action::None),
        ]);
        assert!(matches!(result, Err(PipelineError::ConfigurationInvalid(_))));
    }

    #[test]
    fn test_equal_specificity_rejected() {
        let result = MappingTable::new(vec![
            mapping(Trigger::Scroll, Modifier::Shift.into(), precise()),
            mapping(Trigger::Scroll, Modifier::Control.into(), Action::None),
        ]);
        assert!(matches!(result, Err(PipelineError::ConfigurationInvalid(_))));
    }

    #[test]
    fn test_equal_specificity_with_union_accepted() {
        let table = MappingTable::new(vec![
            mapping(Trigger::Scroll, Modifier::Shift.into(), precise()),
            mapping(Trigger::Scroll, Modifier::Control.into(), Action::None),
            mapping(
                Trigger::Scroll,
                Modifier::Shift | Modifier::Control,
                Action::ScrollModify {
                    modification: ScrollModification::Quick,
                },
            ),
        ])
        .unwrap();

        let best = table
            .best_match(Trigger::Scroll, Modifier::Shift | Modifier::Control | Modifier::Alt)
            .unwrap();
        assert_eq!(best.specificity(), 2);
    }

    #[test]
    fn test_invalid_action_for_trigger() {
        let result = MappingTable::new(vec![mapping(
            Trigger::Click {
                button: MouseButton::Button4,
            },
            ModifierSet::empty(),
            Action::Drag {
                kind: DragKind::ScrollGesture,
            },
        )]);
        assert!(result.is_err());
    }

    #[test]
    fn test_most_specific_wins() {
        let table = MappingTable::new(vec![
            mapping(Trigger::Scroll, Modifier::Shift.into(), precise()),
            mapping(
                Trigger::Scroll,
                Modifier::Shift | Modifier::Button4,
                Action::ScrollModify {
                    modification: ScrollModification::Horizontal,
                },
            ),
        ])
        .unwrap();

        let m = table
            .best_match(Trigger::Scroll, Modifier::Shift | Modifier::Button4)
            .unwrap();
        assert_eq!(
            m.action,
            Action::ScrollModify {
                modification: ScrollModification::Horizontal
            }
        );
        assert!(table.best_match(Trigger::Scroll, Modifier::Alt.into()).is_none());
    }

    #[test]
    fn test_unmapped_button_passes_through() {
        let mut resolver = ModifierResolver::new(Arc::new(MappingTable::default()));
        assert_eq!(
            resolver.transition(
                ResolverInput::ButtonDown(MouseButton::Left),
                Modifier::Left.into()
            ),
            Resolution::PassThrough
        );
        assert!(resolver.is_idle());
    }

    #[test]
    fn test_click_mapping_fires_on_release() {
        let combo = Action::KeyCombo {
            keys: KeyCombo::new(&[29, 46]).unwrap(),
        };
        let table = MappingTable::new(vec![mapping(
            Trigger::Click {
                button: MouseButton::Button4,
            },
            ModifierSet::empty(),
            combo,
        )])
        .unwrap();
        let mut resolver = ModifierResolver::new(Arc::new(table));

        let down = resolver.transition(
            ResolverInput::ButtonDown(MouseButton::Button4),
            Modifier::Button4.into(),
        );
        assert_eq!(down, Resolution::Suppress);
        assert_eq!(
            resolver.state(),
            ResolverState::ButtonHeld(Modifier::Button4.into())
        );

        let up = resolver.transition(
            ResolverInput::ButtonUp(MouseButton::Button4),
            ModifierSet::empty(),
        );
        assert_eq!(up, Resolution::Fire(combo));
        assert!(resolver.is_idle());
    }

    #[test]
    fn test_button_as_scroll_modifier() {
        let table = MappingTable::new(vec![mapping(
            Trigger::Scroll,
            Modifier::Button5.into(),
            precise(),
        )])
        .unwrap();
        let mut resolver = ModifierResolver::new(Arc::new(table));
        let held: ModifierSet = Modifier::Button5.into();

        assert_eq!(
            resolver.transition(ResolverInput::ButtonDown(MouseButton::Button5), held),
            Resolution::Suppress
        );
        assert_eq!(
            resolver.transition(ResolverInput::Scroll, held),
            Resolution::Scroll(Some(ScrollModification::Precise))
        );
        assert!(matches!(
            resolver.state(),
            ResolverState::ScrollModifierActive { .. }
        ));

        // Used as a modifier: the release is swallowed, not replayed
        assert_eq!(
            resolver.transition(
                ResolverInput::ButtonUp(MouseButton::Button5),
                ModifierSet::empty()
            ),
            Resolution::Suppress
        );
        assert!(resolver.is_idle());
        assert_eq!(
            resolver.transition(ResolverInput::Scroll, ModifierSet::empty()),
            Resolution::Scroll(None)
        );
    }

    #[test]
    fn test_unused_modifier_button_replays_click() {
        let table = MappingTable::new(vec![mapping(
            Trigger::Scroll,
            Modifier::Button5.into(),
            precise(),
        )])
        .unwrap();
        let mut resolver = ModifierResolver::new(Arc::new(table));

        resolver.transition(
            ResolverInput::ButtonDown(MouseButton::Button5),
            Modifier::Button5.into(),
        );
        assert_eq!(
            resolver.transition(
                ResolverInput::ButtonUp(MouseButton::Button5),
                ModifierSet::empty()
            ),
            Resolution::ReplayClick(MouseButton::Button5)
        );
    }

    #[test]
    fn test_drag_trigger() {
        let table = MappingTable::new(vec![mapping(
            Trigger::Drag {
                button: MouseButton::Middle,
            },
            ModifierSet::empty(),
            Action::Drag {
                kind: DragKind::ScrollGesture,
            },
        )])
        .unwrap();
        let mut resolver = ModifierResolver::new(Arc::new(table));

        assert_eq!(
            resolver.transition(
                ResolverInput::ButtonDown(MouseButton::Middle),
                Modifier::Middle.into()
            ),
            Resolution::BeginDrag {
                button: MouseButton::Middle,
                kind: DragKind::ScrollGesture
            }
        );
        assert!(matches!(
            resolver.state(),
            ResolverState::DragCandidate { .. }
        ));

        assert_eq!(
            resolver.transition(
                ResolverInput::ButtonUp(MouseButton::Middle),
                ModifierSet::empty()
            ),
            Resolution::EndDrag {
                button: MouseButton::Middle,
                tap: None
            }
        );
        assert!(resolver.is_idle());
    }

    #[test]
    fn test_keyboard_release_ends_scroll_modifier() {
        let table = MappingTable::new(vec![mapping(
            Trigger::Scroll,
            Modifier::Shift.into(),
            precise(),
        )])
        .unwrap();
        let mut resolver = ModifierResolver::new(Arc::new(table));

        resolver.transition(ResolverInput::Scroll, Modifier::Shift.into());
        assert!(matches!(
            resolver.state(),
            ResolverState::ScrollModifierActive { .. }
        ));

        resolver.transition(ResolverInput::FlagsChanged, ModifierSet::empty());
        assert!(resolver.is_idle());
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let table = MappingTable::new(vec![mapping(
            Trigger::Click {
                button: MouseButton::Button4,
            },
            ModifierSet::empty(),
            Action::None,
        )])
        .unwrap();
        let mut resolver = ModifierResolver::new(Arc::new(table));
        resolver.transition(
            ResolverInput::ButtonDown(MouseButton::Button4),
            Modifier::Button4.into(),
        );
        assert!(resolver
            .set_table(Arc::new(MappingTable::default()))
            .is_err());

        resolver.transition(ResolverInput::Cancel, ModifierSet::empty());
        assert!(resolver.is_idle());
        assert!(resolver.set_table(Arc::new(MappingTable::default())).is_ok());
    }
}

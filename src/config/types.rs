//! Configuration section types

use crate::accel::PointerConfig;
use crate::device::DeviceClass;
use crate::input::error::{PipelineError, Result};
use crate::input::modifiers::{Modifier, ModifierSet};
use crate::remap::action::{Action, DragKind, Mapping, ScrollModification, Trigger};
use crate::remap::drag::DragConfig;
use crate::remap::resolver::MappingTable;
use crate::input::event::MouseButton;
use crate::scroll::simulator::ScrollConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files (None = console only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Log a metrics summary periodically
    #[serde(default)]
    pub metrics: bool,

    /// Interval between metrics summaries (seconds)
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_interval_secs() -> u64 {
    60
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
            metrics: false,
            metrics_interval_secs: default_metrics_interval_secs(),
        }
    }
}

/// Event tap thread configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapConfig {
    /// Control channel capacity (ticks and reloads)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Scheduler tick interval (ms); drives idle timeouts and momentum
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Attempts to take a contended per-device emission lock
    #[serde(default = "default_emission_spin_limit")]
    pub emission_spin_limit: u32,

    /// Maximum time the tap thread waits for hardware events (ms)
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_channel_capacity() -> usize {
    64
}

fn default_tick_interval_ms() -> u64 {
    16
}

fn default_emission_spin_limit() -> u32 {
    64
}

fn default_poll_timeout_ms() -> u64 {
    5
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            tick_interval_ms: default_tick_interval_ms(),
            emission_spin_limit: default_emission_spin_limit(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

/// Static device registry seed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// USB/Bluetooth vendor id
    pub vendor_id: u16,

    /// USB/Bluetooth product id
    pub product_id: u16,

    /// Profile used for this device
    pub class: DeviceClass,

    /// Human-readable label
    #[serde(default)]
    pub name: Option<String>,
}

/// One mapping as written in the configuration file
///
/// ```toml
/// [[profiles.mouse.mappings]]
/// trigger = { type = "scroll" }
/// modifiers = ["button4"]
/// action = { type = "scroll_modify", modification = "precise" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Input that activates the mapping
    pub trigger: Trigger,

    /// Modifiers that must be held
    #[serde(default)]
    pub modifiers: Vec<Modifier>,

    /// Action to take
    pub action: Action,
}

impl MappingConfig {
    /// Convert to a resolver mapping
    pub fn to_mapping(&self) -> Mapping {
        Mapping {
            trigger: self.trigger,
            modifiers: self
                .modifiers
                .iter()
                .fold(ModifierSet::empty(), |acc, m| acc | *m),
            action: self.action,
        }
    }
}

/// Per-class profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Pointer acceleration
    #[serde(default)]
    pub pointer: PointerConfig,

    /// Scroll synthesis
    #[serde(default)]
    pub scroll: ScrollConfig,

    /// Drag gestures
    #[serde(default)]
    pub drag: DragConfig,

    /// Button and scroll mappings
    #[serde(default)]
    pub mappings: Vec<MappingConfig>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            pointer: PointerConfig::default(),
            scroll: ScrollConfig::default(),
            drag: DragConfig::default(),
            mappings: Vec::new(),
        }
    }
}

impl ProfileConfig {
    /// Build the validated mapping table
    pub fn mapping_table(&self) -> Result<MappingTable> {
        MappingTable::new(self.mappings.iter().map(MappingConfig::to_mapping).collect())
    }

    /// Validate every section of the profile
    pub fn validate(&self, class: DeviceClass) -> Result<()> {
        let invalid = |e: String| PipelineError::ConfigurationInvalid(format!("{}: {}", class, e));

        self.pointer.validate().map_err(invalid)?;
        self.scroll.validate().map_err(invalid)?;
        self.drag.validate().map_err(invalid)?;

        for (name, samples) in [
            ("pointer", self.pointer.acceleration_samples()),
            ("scroll", self.scroll.acceleration_samples()),
        ] {
            crate::accel::table::validate_samples(&samples)
                .map_err(|e| invalid(format!("{} acceleration: {}", name, e)))?;
        }

        self.mapping_table()
            .map_err(|e| invalid(format!("mappings: {}", e)))?;
        Ok(())
    }
}

/// Profiles by device class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesConfig {
    /// Wheel mice
    #[serde(default = "default_mouse_profile")]
    pub mouse: ProfileConfig,

    /// Trackpads
    #[serde(default)]
    pub trackpad: ProfileConfig,
}

/// Middle-button drag scrolls, Button4 + wheel scrolls precisely
fn default_mouse_profile() -> ProfileConfig {
    ProfileConfig {
        mappings: vec![
            MappingConfig {
                trigger: Trigger::Drag {
                    button: MouseButton::Middle,
                },
                modifiers: Vec::new(),
                action: Action::Drag {
                    kind: DragKind::ScrollGesture,
                },
            },
            MappingConfig {
                trigger: Trigger::Scroll,
                modifiers: vec![Modifier::Button4],
                action: Action::ScrollModify {
                    modification: ScrollModification::Precise,
                },
            },
        ],
        ..ProfileConfig::default()
    }
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            mouse: default_mouse_profile(),
            trackpad: ProfileConfig::default(),
        }
    }
}

impl ProfilesConfig {
    /// Profile for `class`
    pub fn get(&self, class: DeviceClass) -> &ProfileConfig {
        match class {
            DeviceClass::Mouse => &self.mouse,
            DeviceClass::Trackpad => &self.trackpad,
        }
    }
}

//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - CLI arguments
//!
//! A configuration is an immutable snapshot. The daemon validates a new
//! snapshot completely before anything adopts it; a rejected file leaves the
//! previous snapshot in effect.

use crate::device::DeviceClass;
use crate::input::error::PipelineError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub mod types;

pub use types::{
    DeviceConfig, LoggingConfig, MappingConfig, ProfileConfig, ProfilesConfig, TapConfig,
};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Event tap configuration
    #[serde(default)]
    pub tap: TapConfig,
    /// Known devices
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Per-class profiles
    #[serde(default)]
    pub profiles: ProfilesConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&content)?;
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config.validate().context("Configuration rejected")?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            logging: LoggingConfig::default(),
            tap: TapConfig::default(),
            devices: Vec::new(),
            profiles: ProfilesConfig::default(),
        }
    }

    /// Validate configuration
    ///
    /// Builds every mapping table and checks every acceleration table so
    /// that adoption can never fail halfway.
    pub fn validate(&self) -> crate::input::error::Result<()> {
        let invalid = |msg: String| Err(PipelineError::ConfigurationInvalid(msg));

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return invalid(format!("Invalid log level: {}", other)),
        }

        if self.tap.channel_capacity == 0 {
            return invalid("tap channel_capacity must be at least 1".to_string());
        }
        if self.tap.tick_interval_ms == 0 {
            return invalid("tap tick_interval_ms must be at least 1".to_string());
        }
        if self.tap.emission_spin_limit == 0 {
            return invalid("tap emission_spin_limit must be at least 1".to_string());
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert((device.vendor_id, device.product_id)) {
                return invalid(format!(
                    "Device {:04x}:{:04x} listed more than once",
                    device.vendor_id, device.product_id
                ));
            }
        }

        for class in DeviceClass::ALL {
            self.profiles.get(class).validate(class)?;
        }

        Ok(())
    }

    /// Configured class for a device, if listed
    pub fn class_for(&self, vendor_id: u16, product_id: u16) -> Option<DeviceClass> {
        self.devices
            .iter()
            .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
            .map(|d| d.class)
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, log_level: Option<String>, tick_interval_ms: Option<u64>) -> Self {
        if let Some(level) = log_level {
            self.logging.level = level;
        }
        if let Some(interval) = tick_interval_ms {
            self.tap.tick_interval_ms = interval;
        }

        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

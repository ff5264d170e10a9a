//! Device Identity and Acceleration Table Arena
//!
//! The registry resolves the device an event came from to a `DeviceIdentity`
//! and hands out the acceleration tables for that device's class.
//!
//! # Ownership
//!
//! ```text
//! StaticDeviceRegistry
//!   ├── devices: DeviceId → (vendor, product, class)
//!   └── arena:   [TableSlot; classes × 2]
//!                  slot = ArcSwap<AccelerationTable>
//!
//! DeviceIdentity { pointer_table: TableId, scroll_table: TableId }
//! ```
//!
//! Identities carry only `TableId` indices into the arena, never references
//! to tables. A rebuild constructs every table first and only then swaps the
//! slots, so a lookup observes either the previous table or the new one.
//! Lookups never wait on a rebuild: a slot load is a lock-free pointer read.

use crate::accel::table::AccelerationTable;
use crate::config::types::{ProfileConfig, ProfilesConfig};
use crate::input::error::{PipelineError, Result};
use arc_swap::ArcSwap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Opaque per-device identifier assigned by the event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Index into the registry's table arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub usize);

/// Device class selecting the configuration profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Wheel mouse
    Mouse,
    /// Trackpad or touchpad
    Trackpad,
}

impl DeviceClass {
    /// Every class, in arena order
    pub const ALL: [DeviceClass; 2] = [DeviceClass::Mouse, DeviceClass::Trackpad];

    fn index(self) -> usize {
        match self {
            DeviceClass::Mouse => 0,
            DeviceClass::Trackpad => 1,
        }
    }

    /// Arena slot of this class's pointer table
    pub fn pointer_table(self) -> TableId {
        TableId(self.index() * 2)
    }

    /// Arena slot of this class's scroll table
    pub fn scroll_table(self) -> TableId {
        TableId(self.index() * 2 + 1)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Mouse => write!(f, "mouse"),
            DeviceClass::Trackpad => write!(f, "trackpad"),
        }
    }
}

/// Resolved device identity
///
/// Long-lived and owned by the registry; the pipeline reads a copy and never
/// mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Device identifier
    pub device_id: DeviceId,
    /// USB/Bluetooth vendor id
    pub vendor_id: u16,
    /// USB/Bluetooth product id
    pub product_id: u16,
    /// Profile class
    pub class: DeviceClass,
    /// Pointer acceleration table
    pub pointer_table: TableId,
    /// Scroll acceleration table
    pub scroll_table: TableId,
}

/// Identity lookup consumed by the pipeline
pub trait DeviceRegistry: Send + Sync {
    /// Resolve a device to its identity
    fn resolve(&self, id: DeviceId) -> Result<DeviceIdentity>;

    /// Fetch the current table in an arena slot
    fn table(&self, id: TableId) -> Option<Arc<AccelerationTable>>;
}

#[derive(Debug, Clone, Copy)]
struct DeviceEntry {
    vendor_id: u16,
    product_id: u16,
    class: DeviceClass,
}

/// Registry populated by the daemon from discovered devices
pub struct StaticDeviceRegistry {
    devices: RwLock<HashMap<DeviceId, DeviceEntry>>,
    arena: Vec<ArcSwap<AccelerationTable>>,
}

impl StaticDeviceRegistry {
    /// Build the table arena from the configured profiles
    pub fn new(profiles: &ProfilesConfig) -> Result<Self> {
        let tables = build_tables(profiles)?;
        Ok(Self {
            devices: RwLock::new(HashMap::new()),
            arena: tables
                .into_iter()
                .map(ArcSwap::from_pointee)
                .collect(),
        })
    }

    /// Register a device
    pub fn register(&self, id: DeviceId, vendor_id: u16, product_id: u16, class: DeviceClass) {
        info!(
            "Registered {} ({:04x}:{:04x}) as {}",
            id, vendor_id, product_id, class
        );
        self.devices.write().insert(
            id,
            DeviceEntry {
                vendor_id,
                product_id,
                class,
            },
        );
    }

    /// Forget a device
    pub fn unregister(&self, id: DeviceId) -> bool {
        let removed = self.devices.write().remove(&id).is_some();
        if removed {
            debug!("Unregistered {}", id);
        }
        removed
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// True when no device is registered
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Rebuild every acceleration table and swap them in
    ///
    /// All tables are constructed before any slot changes; a failure leaves
    /// every previous table in place. Returns only after every swap.
    pub fn rebuild_tables(&self, profiles: &ProfilesConfig) -> Result<()> {
        let tables = build_tables(profiles)?;

        for (slot, table) in self.arena.iter().zip(tables) {
            slot.store(Arc::new(table));
        }

        info!("Acceleration tables rebuilt ({} slots)", self.arena.len());
        Ok(())
    }
}

impl DeviceRegistry for StaticDeviceRegistry {
    fn resolve(&self, id: DeviceId) -> Result<DeviceIdentity> {
        let devices = self.devices.read();
        let entry = devices.get(&id).ok_or(PipelineError::DeviceNotFound(id))?;

        Ok(DeviceIdentity {
            device_id: id,
            vendor_id: entry.vendor_id,
            product_id: entry.product_id,
            class: entry.class,
            pointer_table: entry.class.pointer_table(),
            scroll_table: entry.class.scroll_table(),
        })
    }

    fn table(&self, id: TableId) -> Option<Arc<AccelerationTable>> {
        self.arena.get(id.0).map(|slot| slot.load_full())
    }
}

/// Build tables in arena order
fn build_tables(profiles: &ProfilesConfig) -> Result<Vec<AccelerationTable>> {
    let mut tables = Vec::with_capacity(DeviceClass::ALL.len() * 2);
    for class in DeviceClass::ALL {
        let profile: &ProfileConfig = profiles.get(class);
        let pointer = AccelerationTable::build(
            &profile.pointer.acceleration_samples(),
            profile.pointer.degree,
        )
        .map_err(|e| {
            PipelineError::ConfigurationInvalid(format!("{} pointer table: {}", class, e))
        })?;
        let scroll = AccelerationTable::build(
            &profile.scroll.acceleration_samples(),
            profile.scroll.degree,
        )
        .map_err(|e| {
            PipelineError::ConfigurationInvalid(format!("{} scroll table: {}", class, e))
        })?;

        debug_assert_eq!(tables.len(), class.pointer_table().0);
        tables.push(pointer);
        tables.push(scroll);
    }
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn registry() -> StaticDeviceRegistry {
        let config = Config::default_config();
        StaticDeviceRegistry::new(&config.profiles).unwrap()
    }

    #[test]
    fn test_device_id_display() {
        assert_eq!(DeviceId(9).to_string(), "device#9");
    }

    #[test]
    fn test_resolve_registered_device() {
        let reg = registry();
        reg.register(DeviceId(1), 0x046d, 0xc52b, DeviceClass::Mouse);

        let identity = reg.resolve(DeviceId(1)).unwrap();
        assert_eq!(identity.class, DeviceClass::Mouse);
        assert_eq!(identity.pointer_table, TableId(0));
        assert_eq!(identity.scroll_table, TableId(1));
        assert!(reg.table(identity.pointer_table).is_some());
    }

    #[test]
    fn test_unknown_device_not_found() {
        let reg = registry();
        assert!(matches!(
            reg.resolve(DeviceId(99)),
            Err(PipelineError::DeviceNotFound(DeviceId(99)))
        ));
        assert!(reg.table(TableId(42)).is_none());
    }

    #[test]
    fn test_unregister() {
        let reg = registry();
        reg.register(DeviceId(3), 1, 2, DeviceClass::Trackpad);
        assert_eq!(reg.len(), 1);
        assert!(reg.unregister(DeviceId(3)));
        assert!(!reg.unregister(DeviceId(3)));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_rebuild_swaps_tables() {
        let reg = registry();
        let before = reg.table(DeviceClass::Mouse.pointer_table()).unwrap();

        let mut config = Config::default_config();
        config.profiles.mouse.pointer.acceleration = vec![[0.0, 2.0], [100.0, 2.0]];
        config.profiles.mouse.pointer.degree = 1;
        reg.rebuild_tables(&config.profiles).unwrap();

        let after = reg.table(DeviceClass::Mouse.pointer_table()).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.lookup(50.0), 2.0);
        // The old handle stays fully usable
        assert!(before.lookup(50.0).is_finite());
    }

    #[test]
    fn test_lookups_during_rebuild_see_whole_tables() {
        let reg = Arc::new(registry());
        let mut flat = Config::default_config();
        flat.profiles.mouse.pointer.acceleration = vec![[0.0, 2.0], [100.0, 2.0]];
        flat.profiles.mouse.pointer.degree = 1;
        let default = Config::default_config();

        let reader = {
            let reg = Arc::clone(&reg);
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    let table = reg.table(DeviceClass::Mouse.pointer_table()).unwrap();
                    let gain = table.lookup(50.0);
                    assert!(gain.is_finite() && gain >= table.min_gain() && gain <= table.max_gain());
                }
            })
        };
        for i in 0..200 {
            let profiles = if i % 2 == 0 { &flat.profiles } else { &default.profiles };
            reg.rebuild_tables(profiles).unwrap();
        }
        reader.join().unwrap();
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_tables() {
        let reg = registry();
        let before = reg.table(DeviceClass::Trackpad.scroll_table()).unwrap();

        let mut config = Config::default_config();
        config.profiles.trackpad.scroll.acceleration = vec![[0.0, 1.0]];
        assert!(reg.rebuild_tables(&config.profiles).is_err());

        let after = reg.table(DeviceClass::Trackpad.scroll_table()).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }
}

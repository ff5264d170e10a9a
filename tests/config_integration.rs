use lamco_pointerd::config::Config;
use lamco_pointerd::device::{DeviceClass, DeviceRegistry, StaticDeviceRegistry};
use lamco_pointerd::device::DeviceId;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const FULL_CONFIG: &str = r#"
[logging]
level = "debug"
metrics = true
metrics_interval_secs = 30

[tap]
tick_interval_ms = 8

[[devices]]
vendor_id = 0x05ac
product_id = 0x0265
class = "trackpad"
name = "Magic Trackpad"

[profiles.mouse.pointer]
acceleration = [[0.0, 0.5], [400.0, 1.0], [1600.0, 2.5]]
degree = 2

[profiles.mouse.scroll]
idle_timeout_ticks = 4

[profiles.mouse.scroll.momentum]
enabled = false

[[profiles.mouse.mappings]]
trigger = { type = "drag", button = "middle" }
action = { type = "drag", kind = "scroll_gesture" }

[[profiles.mouse.mappings]]
trigger = { type = "click", button = "button5" }
modifiers = ["control"]
action = { type = "key_combo", keys = [29, 46] }
"#;

#[test]
fn test_load_full_config() {
    let file = write_config(FULL_CONFIG);
    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.metrics);
    assert_eq!(config.tap.tick_interval_ms, 8);
    assert_eq!(config.class_for(0x05ac, 0x0265), Some(DeviceClass::Trackpad));
    assert_eq!(config.profiles.mouse.mappings.len(), 2);
    assert_eq!(config.profiles.mouse.scroll.idle_timeout_ticks, 4);
    assert!(!config.profiles.mouse.scroll.momentum.enabled);
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read config file"));
}

#[test]
fn test_syntax_error_is_reported() {
    let file = write_config("[tap\ntick_interval_ms = 8");
    let err = Config::load(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_ambiguous_mappings_rejected() {
    let file = write_config(
        r#"
[[profiles.mouse.mappings]]
trigger = { type = "scroll" }
modifiers = ["shift"]
action = { type = "scroll_modify", modification = "quick" }

[[profiles.mouse.mappings]]
trigger = { type = "scroll" }
modifiers = ["button4"]
action = { type = "scroll_modify", modification = "precise" }
"#,
    );
    let err = Config::load(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Configuration rejected"));
}

#[test]
fn test_union_mapping_resolves_tie() {
    let file = write_config(
        r#"
[[profiles.mouse.mappings]]
trigger = { type = "scroll" }
modifiers = ["shift"]
action = { type = "scroll_modify", modification = "quick" }

[[profiles.mouse.mappings]]
trigger = { type = "scroll" }
modifiers = ["button4"]
action = { type = "scroll_modify", modification = "precise" }

[[profiles.mouse.mappings]]
trigger = { type = "scroll" }
modifiers = ["shift", "button4"]
action = { type = "scroll_modify", modification = "horizontal" }
"#,
    );
    assert!(Config::load(file.path()).is_ok());
}

#[test]
fn test_decreasing_gain_rejected() {
    let file = write_config(
        r#"
[profiles.trackpad.pointer]
acceleration = [[0.0, 2.0], [100.0, 1.0]]
degree = 1
"#,
    );
    assert!(Config::load(file.path()).is_err());
}

#[test]
fn test_registry_rebuild_from_reloaded_file() {
    let config = Config::default_config();
    let registry = StaticDeviceRegistry::new(&config.profiles).unwrap();
    registry.register(DeviceId(1), 0x046d, 0xc52b, DeviceClass::Mouse);

    let identity = registry.resolve(DeviceId(1)).unwrap();
    let before = registry.table(identity.pointer_table).unwrap();

    let file = write_config(FULL_CONFIG);
    let reloaded = Config::load(file.path()).unwrap();
    registry.rebuild_tables(&reloaded.profiles).unwrap();

    let after = registry.table(identity.pointer_table).unwrap();
    assert_ne!(before.samples(), after.samples());
    assert_eq!(after.samples().len(), 3);
}

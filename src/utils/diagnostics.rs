//! System Diagnostics and Status Reporting
//!
//! Provides runtime diagnostics and system information for debugging the
//! input setup.

use crate::backend::evdev_source::event_nodes;
use nix::unistd::{getgroups, geteuid, Group};
use std::fs::OpenOptions;
use std::path::Path;
use sysinfo::System;
use tracing::{info, warn};

/// System information for diagnostics
#[derive(Debug, Clone)]
pub struct SystemInfo {
    /// Operating system name (e.g., "Linux", "Ubuntu")
    pub os_name: String,
    /// Operating system version string
    pub os_version: String,

    /// Kernel version string
    pub kernel_version: String,

    /// Number of logical CPU cores
    pub cpu_count: usize,

    /// Total system memory in megabytes
    pub total_memory_mb: u64,

    /// System hostname
    pub hostname: String,
}

impl SystemInfo {
    /// Gather system information
    pub fn gather() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        Self {
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "Unknown".to_string()),
            kernel_version: System::kernel_version().unwrap_or_else(|| "Unknown".to_string()),
            cpu_count: sys.cpus().len(),
            total_memory_mb: sys.total_memory() / 1024 / 1024,
            hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Log system information
    pub fn log(&self) {
        info!("=== System Information ===");
        info!("  OS: {} {}", self.os_name, self.os_version);
        info!("  Kernel: {}", self.kernel_version);
        info!("  Hostname: {}", self.hostname);
        info!("  CPUs: {}", self.cpu_count);
        info!("  Memory: {} MB", self.total_memory_mb);
    }
}

/// Access to the device nodes the daemon needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputAccess {
    /// `/dev/uinput` can be opened for writing
    pub uinput_writable: bool,
    /// Number of `/dev/input/event*` nodes
    pub event_nodes: usize,
    /// Number of those nodes that can be opened for reading
    pub readable_nodes: usize,
    /// Process runs as root or belongs to the `input` group
    pub input_group: bool,
}

impl InputAccess {
    /// Probe `/dev/uinput` and `/dev/input`
    pub fn probe() -> Self {
        Self::probe_at(Path::new("/dev/uinput"), Path::new("/dev/input"))
    }

    /// Probe custom locations
    pub fn probe_at(uinput: &Path, input_dir: &Path) -> Self {
        let nodes = event_nodes(input_dir);
        let readable = nodes
            .iter()
            .filter(|p| OpenOptions::new().read(true).open(p).is_ok())
            .count();

        Self {
            uinput_writable: OpenOptions::new().write(true).open(uinput).is_ok(),
            event_nodes: nodes.len(),
            readable_nodes: readable,
            input_group: in_input_group(),
        }
    }

    /// True when the daemon can both read and inject
    pub fn is_sufficient(&self) -> bool {
        self.uinput_writable && self.readable_nodes > 0
    }

    /// Log the probe result
    pub fn log(&self) {
        info!("=== Input Access ===");
        info!(
            "  /dev/uinput: {}",
            if self.uinput_writable { "writable" } else { "NOT writable" }
        );
        info!(
            "  /dev/input: {} of {} event nodes readable",
            self.readable_nodes, self.event_nodes
        );
        info!(
            "  input group: {}",
            if self.input_group { "member" } else { "not a member" }
        );
        if !self.is_sufficient() {
            warn!("Insufficient device access; only --dry-run will work");
        }
    }
}

fn in_input_group() -> bool {
    if geteuid().is_root() {
        return true;
    }
    let Ok(Some(group)) = Group::from_name("input") else {
        return false;
    };
    getgroups()
        .map(|groups| groups.contains(&group.gid))
        .unwrap_or(false)
}

/// Log complete diagnostics on startup
pub fn log_startup_diagnostics() {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║          Startup Diagnostics                              ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let sys_info = SystemInfo::gather();
    sys_info.log();

    InputAccess::probe().log();

    if let Ok(session) = std::env::var("XDG_SESSION_TYPE") {
        info!("  Session type: {}", session);
    }

    info!("=== Daemon ===");
    info!("  Version: {}", env!("CARGO_PKG_VERSION"));
    #[cfg(debug_assertions)]
    info!("  Build: debug");
    #[cfg(not(debug_assertions))]
    info!("  Build: release");

    info!("╚════════════════════════════════════════════════════════════╝");
}

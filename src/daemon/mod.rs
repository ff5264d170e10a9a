//! Remapping daemon
//!
//! Wires the substrate to the pipeline and owns the process lifecycle.
//!
//! # Architecture
//!
//! ```text
//! RemapDaemon
//!   ├─> EvdevSource (grabbed pointers, keyboards for modifier flags)
//!   ├─> StaticDeviceRegistry (class + acceleration tables per device)
//!   ├─> OutputCoordinator ──> UinputSink | LogSink (--dry-run)
//!   ├─> EventTapThread (owns source + Pipeline)
//!   └─> TickScheduler (tokio interval -> Tick messages)
//! ```
//!
//! # Signals
//!
//! - `SIGHUP` reloads the configuration file. A file that fails to parse or
//!   validate is logged and the running configuration stays in effect.
//! - `SIGINT` / `SIGTERM` stop the daemon. Active sessions are cancelled
//!   and every grabbed device is released.

use crate::backend::{DeviceRole, EvdevSource, UinputSink};
use crate::config::Config;
use crate::device::{DeviceClass, DeviceId, DeviceRegistry, StaticDeviceRegistry};
use crate::input::clock::MonotonicClock;
use crate::output::{EventSink, LogSink, OutputCoordinator};
use crate::remap::action::Action;
use crate::tap::{EventTapThread, Pipeline, TapHandle, TickScheduler};
use crate::utils::metrics::PipelineMetrics;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};

/// How often the daemon checks that the tap thread is alive
const HEALTH_INTERVAL: Duration = Duration::from_secs(1);

/// Options from the command line
#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    /// Configuration file, re-read on SIGHUP
    pub config_path: Option<PathBuf>,
    /// Restrict interception to these event nodes
    pub devices: Vec<PathBuf>,
    /// Log output instead of injecting it; devices are not grabbed
    pub dry_run: bool,
}

/// Pointer as discovered at startup
#[derive(Debug, Clone, Copy)]
struct Pointer {
    id: DeviceId,
    vendor_id: u16,
    product_id: u16,
    hint: DeviceClass,
}

/// Running daemon
pub struct RemapDaemon {
    config: Arc<Config>,
    options: DaemonOptions,
    registry: Arc<StaticDeviceRegistry>,
    pointers: Vec<Pointer>,
    handle: TapHandle,
    scheduler: TickScheduler,
}

impl RemapDaemon {
    /// Open devices and start the tap thread
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: Config, options: DaemonOptions) -> Result<Self> {
        let config = Arc::new(config);

        let registry = Arc::new(
            StaticDeviceRegistry::new(&config.profiles)
                .context("Failed to build acceleration tables")?,
        );

        let source = EvdevSource::open(&options.devices, !options.dry_run)
            .context("Failed to open input devices")?;

        let pointers: Vec<Pointer> = source
            .devices()
            .filter(|d| d.role == DeviceRole::Pointer)
            .map(|d| Pointer {
                id: d.id,
                vendor_id: d.vendor_id,
                product_id: d.product_id,
                hint: d.class_hint(),
            })
            .collect();
        register_pointers(&registry, &config, &pointers);

        let sink: Arc<dyn EventSink> = if options.dry_run {
            info!("Dry run: output is logged, devices are not grabbed");
            Arc::new(LogSink)
        } else {
            Arc::new(UinputSink::new(combo_keys(&config)).context("Failed to create uinput device")?)
        };

        let coordinator = Arc::new(OutputCoordinator::new(sink, config.tap.emission_spin_limit));
        let metrics = Arc::new(PipelineMetrics::new());
        let pipeline = Pipeline::new(
            Arc::clone(&config),
            Arc::clone(&registry) as Arc<dyn DeviceRegistry>,
            coordinator,
            Box::new(MonotonicClock::new()),
            Arc::clone(&metrics),
        )
        .context("Configuration rejected by pipeline")?;

        let handle = EventTapThread::spawn(source, pipeline, &config.tap)
            .context("Failed to start event tap thread")?;
        let scheduler = TickScheduler::start(
            handle.sender(),
            Duration::from_millis(config.tap.tick_interval_ms),
            metrics,
        );

        Ok(Self {
            config,
            options,
            registry,
            pointers,
            handle,
            scheduler,
        })
    }

    /// Run until SIGINT/SIGTERM or until the tap thread exits
    pub async fn run(mut self) -> Result<()> {
        info!("╔════════════════════════════════════════════════════════════╗");
        info!("║          lamco-pointerd is Running                         ║");
        info!("╚════════════════════════════════════════════════════════════╝");
        info!("  Pointers: {}", self.pointers.len());
        info!("  Tick interval: {} ms", self.config.tap.tick_interval_ms);
        info!("  Output: {}", if self.options.dry_run { "log (dry run)" } else { "uinput" });
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        let mut interrupt =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        let mut health = tokio::time::interval(HEALTH_INTERVAL);
        let mut summary = tokio::time::interval(Duration::from_secs(
            self.config.logging.metrics_interval_secs.max(1),
        ));
        // The first tick of an interval fires immediately
        summary.tick().await;

        let result = loop {
            tokio::select! {
                _ = hangup.recv() => {
                    if let Err(e) = self.reload() {
                        error!("Reload failed, keeping previous configuration: {:#}", e);
                    }
                }
                _ = interrupt.recv() => {
                    info!("SIGINT received");
                    break Ok(());
                }
                _ = terminate.recv() => {
                    info!("SIGTERM received");
                    break Ok(());
                }
                _ = health.tick() => {
                    if !self.handle.is_running() {
                        break Err(anyhow::anyhow!("Event tap thread stopped unexpectedly"));
                    }
                }
                _ = summary.tick(), if self.config.logging.metrics => {
                    log_metrics_summary(self.handle.metrics());
                }
            }
        };

        self.shutdown();
        result
    }

    /// Re-read the configuration file and hand it to the tap thread
    ///
    /// The new snapshot is adopted by the pipeline once every session is
    /// idle.
    pub fn reload(&mut self) -> Result<()> {
        let Some(path) = self.options.config_path.clone() else {
            warn!("No configuration file to reload");
            return Ok(());
        };

        info!("Reloading configuration from {}", path.display());
        let config = Arc::new(Config::load(&path)?);

        if combo_keys(&config) != combo_keys(&self.config) && !self.options.dry_run {
            warn!("Key combos use keys the virtual device did not register; restart to apply them");
        }

        self.registry
            .rebuild_tables(&config.profiles)
            .context("Failed to rebuild acceleration tables")?;
        register_pointers(&self.registry, &config, &self.pointers);
        self.handle
            .reload(Arc::clone(&config))
            .context("Tap thread rejected the reload")?;

        self.config = config;
        Ok(())
    }

    /// Stop the scheduler and the tap thread
    pub fn shutdown(&mut self) {
        info!("Initiating graceful shutdown");
        self.scheduler.stop();
        self.handle.shutdown();
        log_metrics_summary(self.handle.metrics());
        info!("lamco-pointerd shutdown complete");
    }

    /// Configuration currently handed to the tap thread
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }
}

impl std::fmt::Debug for RemapDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemapDaemon")
            .field("pointers", &self.pointers.len())
            .field("dry_run", &self.options.dry_run)
            .field("handle", &self.handle)
            .finish()
    }
}

fn register_pointers(registry: &StaticDeviceRegistry, config: &Config, pointers: &[Pointer]) {
    for p in pointers {
        let class = config.class_for(p.vendor_id, p.product_id).unwrap_or(p.hint);
        registry.register(p.id, p.vendor_id, p.product_id, class);
    }
}

/// Every key code used by a configured key combo
fn combo_keys(config: &Config) -> BTreeSet<u16> {
    DeviceClass::ALL
        .into_iter()
        .flat_map(|class| config.profiles.get(class).mappings.iter())
        .filter_map(|m| match m.action {
            Action::KeyCombo { keys } => Some(keys),
            _ => None,
        })
        .flat_map(|keys| keys.keys().to_vec())
        .collect()
}

fn log_metrics_summary(metrics: &PipelineMetrics) {
    let s = metrics.snapshot();
    info!(
        events = s.events_processed,
        passthrough = s.events_passthrough,
        suppressed = s.events_suppressed,
        emissions = s.emissions,
        refused = s.emissions_refused,
        dropped = s.emissions_dropped,
        ticks_skipped = s.ticks_skipped,
        faults = s.faults_recovered,
        "Pipeline metrics: p50 {:.0}us, p99 {:.0}us",
        s.latency_us.p50,
        s.latency_us.p99
    );
    if let Ok(json) = metrics.export_json() {
        debug!("Metrics snapshot: {}", json);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remap::action::{KeyCombo, Trigger};
    use crate::config::MappingConfig;
    use crate::input::event::MouseButton;

    #[test]
    fn test_combo_keys_collects_all_profiles() {
        let mut config = Config::default_config();
        config.profiles.mouse.mappings.push(MappingConfig {
            trigger: Trigger::Click {
                button: MouseButton::Button5,
            },
            modifiers: Vec::new(),
            action: Action::KeyCombo {
                keys: KeyCombo::from_keys([29, 46]),
            },
        });
        config.profiles.trackpad.mappings.push(MappingConfig {
            trigger: Trigger::Click {
                button: MouseButton::Button4,
            },
            modifiers: Vec::new(),
            action: Action::KeyCombo {
                keys: KeyCombo::from_keys([56, 15]),
            },
        });

        let keys: Vec<u16> = combo_keys(&config).into_iter().collect();
        assert_eq!(keys, vec![15, 29, 46, 56]);
    }

    #[test]
    fn test_listed_device_class_overrides_hint() {
        let mut config = Config::default_config();
        config.devices.push(crate::config::DeviceConfig {
            vendor_id: 0x046d,
            product_id: 0xc52b,
            class: DeviceClass::Trackpad,
            name: None,
        });
        let registry = StaticDeviceRegistry::new(&config.profiles).unwrap();
        let pointers = [
            Pointer {
                id: DeviceId(1),
                vendor_id: 0x046d,
                product_id: 0xc52b,
                hint: DeviceClass::Mouse,
            },
            Pointer {
                id: DeviceId(2),
                vendor_id: 0x1234,
                product_id: 0x0001,
                hint: DeviceClass::Mouse,
            },
        ];

        register_pointers(&registry, &config, &pointers);
        assert_eq!(registry.resolve(DeviceId(1)).unwrap().class, DeviceClass::Trackpad);
        assert_eq!(registry.resolve(DeviceId(2)).unwrap().class, DeviceClass::Mouse);
    }
}

//! lamco-pointerd - Pointer Remapping Daemon
//!
//! Entry point for the daemon binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lamco_pointerd::config::Config;
use lamco_pointerd::daemon::{DaemonOptions, RemapDaemon};
use lamco_pointerd::utils::{format_user_error, log_startup_diagnostics, InputAccess};

/// System-wide configuration file
const SYSTEM_CONFIG: &str = "/etc/lamco-pointerd/config.toml";

/// Command-line arguments for lamco-pointerd
#[derive(Parser, Debug)]
#[command(name = "lamco-pointerd")]
#[command(version, about = "Pointer remapping daemon", long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// Defaults to ~/.config/lamco-pointerd/config.toml, then
    /// /etc/lamco-pointerd/config.toml, then built-in defaults.
    #[arg(short, long, env = "LAMCO_POINTERD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only intercept these event nodes (repeatable)
    #[arg(short, long = "device", env = "LAMCO_POINTERD_DEVICES", value_delimiter = ',')]
    pub devices: Vec<PathBuf>,

    /// Log synthesized output instead of injecting it; devices are not grabbed
    #[arg(long)]
    pub dry_run: bool,

    /// Override the scheduler tick interval (milliseconds)
    #[arg(long, env = "LAMCO_POINTERD_TICK_MS")]
    pub tick_interval: Option<u64>,

    /// Validate the configuration and exit
    #[arg(long)]
    pub check_config: bool,

    /// Print system and device access diagnostics and exit
    #[arg(long)]
    pub diagnose: bool,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let loaded = match &config_path {
        Some(path) => Config::load(path),
        None => Ok(Config::default_config()),
    };

    let level_hint = loaded.as_ref().ok().map(|c| c.logging.level.clone());
    let log_dir = loaded.as_ref().ok().and_then(|c| c.logging.log_dir.clone());
    let _guard = init_logging(&args, level_hint.as_deref(), log_dir.as_deref())?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-pointerd v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {} {}", env!("BUILD_DATE"), env!("BUILD_TIME"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    if args.diagnose {
        log_startup_diagnostics();
        return Ok(());
    }

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", format_user_error(&e));
            return Err(e);
        }
    };
    let config = config.with_overrides(None, args.tick_interval);
    if let Err(e) = config.validate() {
        let e = anyhow::Error::new(e).context("Invalid command-line override");
        eprintln!("{}", format_user_error(&e));
        return Err(e);
    }

    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }
    tracing::debug!("Config: {:?}", config);

    if args.check_config {
        println!("Configuration OK");
        return Ok(());
    }

    if !args.dry_run {
        let access = InputAccess::probe();
        if !access.is_sufficient() {
            access.log();
        }
    }

    let options = DaemonOptions {
        config_path,
        devices: args.devices.clone(),
        dry_run: args.dry_run,
    };

    info!("Initializing remapping daemon");
    let daemon = match RemapDaemon::start(config, options) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{}", format_user_error(&e));
            return Err(e);
        }
    };

    if let Err(e) = daemon.run().await {
        eprintln!("{}", format_user_error(&e));
        return Err(e);
    }

    info!("lamco-pointerd shut down");
    Ok(())
}

/// Explicit path, else the first existing default location
fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let user = dirs::config_dir().map(|d| d.join("lamco-pointerd").join("config.toml"));
    user.into_iter()
        .chain(std::iter::once(PathBuf::from(SYSTEM_CONFIG)))
        .find(|p| p.exists())
}

fn init_logging(
    args: &Args,
    config_level: Option<&str>,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let log_level = match args.verbose {
        0 => config_level.unwrap_or("info"),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "lamco_pointerd={level},warn",
            level = log_level
        ))
    });

    let file: Option<(NonBlocking, WorkerGuard)> = match (&args.log_file, log_dir) {
        (Some(path), _) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(tracing_appender::non_blocking(file))
        }
        (None, Some(dir)) => Some(tracing_appender::non_blocking(
            tracing_appender::rolling::daily(dir, "lamco-pointerd.log"),
        )),
        (None, None) => None,
    };

    // If a log file is configured, write to both stdout and file
    let guard = if let Some((writer, guard)) = file {
        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stdout))
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(writer)
                            .with_ansi(false),
                    )
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stdout))
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(writer)
                            .with_ansi(false),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stdout))
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(writer)
                            .with_ansi(false),
                    )
                    .init();
            }
        }
        Some(guard)
    } else {
        // Stdout only
        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().compact())
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
        }
        None
    };

    match (&args.log_file, log_dir) {
        (Some(path), _) => info!("Logging to file: {}", path.display()),
        (None, Some(dir)) => info!("Logging to directory: {}", dir.display()),
        (None, None) => {}
    }

    Ok(guard)
}

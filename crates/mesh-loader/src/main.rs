//! Mesh Loader - runs one built-in plugin against the mesh coordinator.
//!
//! The loader resolves the plugin by name, applies its settings file (if a
//! settings directory is given), connects to the coordinator and runs until
//! the plugin finishes, the coordinator goes away or Ctrl-C is pressed.

mod logging;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use mesh_core::{
    LifecycleConfig, PluginRuntime, PluginSettings, PluginSettingsLoader, RetryPolicy,
    RuntimeConfig, TransportConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "mesh-loader")]
#[command(about = "Run a built-in plugin against the mesh coordinator")]
struct Args {
    /// Plugin to run
    plugin: String,

    /// Directory of per-plugin settings files (`<plugin>.json`)
    #[arg(long)]
    plugin_dir: Option<PathBuf>,

    /// Coordinator host
    #[arg(long, default_value = TransportConfig::DEFAULT_HOST)]
    host: String,

    /// Coordinator port
    #[arg(short, long, default_value_t = TransportConfig::DEFAULT_PORT)]
    port: u16,

    /// Directory for the per-plugin log file
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Connection attempts before giving up
    #[arg(long, default_value_t = LifecycleConfig::MAX_RETRIES)]
    max_retries: u32,

    /// Seconds between connection attempts
    #[arg(long, default_value_t = LifecycleConfig::RETRY_DELAY.as_secs())]
    retry_delay: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match logging::init(&args.plugin, args.log_dir.as_deref(), args.debug) {
        Ok(Some(path)) => info!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("mesh-loader: {e:#}");
            return ExitCode::FAILURE;
        }
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_settings(args: &Args) -> Result<PluginSettings> {
    match &args.plugin_dir {
        Some(dir) => {
            let loader = PluginSettingsLoader::new(dir)
                .with_context(|| format!("loading plugin settings from {}", dir.display()))?;
            Ok(loader.get(&args.plugin))
        }
        None => Ok(PluginSettings::defaults_for(&args.plugin)),
    }
}

fn runtime_config(args: &Args, settings: &PluginSettings) -> Result<RuntimeConfig> {
    let retry = RetryPolicy::new()
        .with_max_retries(args.max_retries)
        .with_retry_delay(Duration::from_secs(args.retry_delay));

    let mut config = RuntimeConfig::for_host(&args.host, args.port)?.with_retry(retry);
    if let Some(interval) = settings.tick_interval() {
        config = config.with_tick_interval(interval);
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let settings = load_settings(&args)?;
    if !settings.enabled {
        info!("Plugin {} is disabled in its settings, not starting", args.plugin);
        return Ok(());
    }

    let factory = mesh_plugins::create(&args.plugin, &settings).ok_or_else(|| {
        anyhow!(
            "unknown plugin `{}` (available: {})",
            args.plugin,
            mesh_plugins::available().join(", ")
        )
    })?;

    let config = runtime_config(&args, &settings)?;
    info!("Starting {} against {}", factory.name(), config.addr);

    let runtime = factory.install(PluginRuntime::builder(config)).build()?;

    let signal = runtime.shutdown_signal();
    ctrlc::set_handler(move || {
        info!("Interrupt received, shutting down");
        signal.raise();
    })
    .context("installing the Ctrl-C handler")?;

    let report = runtime.run()?;
    info!(
        "{} stopped ({:?}) after {} tick(s)",
        runtime.name(),
        report.reason,
        report.ticks
    );
    if report.abandoned_threads > 0 {
        warn!("{} transport thread(s) did not exit in time", report.abandoned_threads);
    }

    Ok(())
}

//! Logging setup for the loader process.
//!
//! Everything goes to stderr; with `--log-dir` a plain-text copy is also
//! appended to `<log-dir>/<plugin>.log`.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Per-plugin log file inside `log_dir`.
pub fn log_file_path(log_dir: &Path, plugin: &str) -> PathBuf {
    log_dir.join(format!("{plugin}.log"))
}

/// `RUST_LOG` wins unless `--debug` was given.
fn filter(debug: bool) -> EnvFilter {
    if debug {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn open_log_file(log_dir: &Path, plugin: &str) -> Result<(File, PathBuf)> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let path = log_file_path(log_dir, plugin);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    Ok((file, path))
}

/// Install the global subscriber. Returns the log file path, if any.
pub fn init(plugin: &str, log_dir: Option<&Path>, debug: bool) -> Result<Option<PathBuf>> {
    let (file_layer, path) = match log_dir {
        Some(dir) => {
            let (file, path) = open_log_file(dir, plugin)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter(debug))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("installing the log subscriber")?;

    Ok(path)
}

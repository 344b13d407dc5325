//! Shared logging setup for catcrawl binaries.
//!
//! Events go to stderr and to a size-capped file under `$CATCRAWL_HOME/logs`.
//! `RUST_LOG` overrides the default filter for both.

mod rotate;

use anyhow::{Context, Result};
use rotate::{LogSink, RotatingLog};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const CRATES: [&str; 3] = ["catcrawl", "catcrawl_catalog", "catcrawl_store"];
const LOG_SEGMENTS: usize = 5;
const LOG_SEGMENT_BYTES: u64 = 10 * 1024 * 1024;

/// How a binary wants its logs set up.
pub struct LogConfig<'a> {
    /// Names the log file (`{app_name}.log`)
    pub app_name: &'a str,
    /// Debug-level console output for the catcrawl crates
    pub verbose: bool,
    /// Overrides [`logs_dir`]
    pub log_dir: Option<PathBuf>,
}

/// Install the global subscriber: a plain-text file layer and a stderr layer.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = match config.log_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            dir
        }
        None => ensure_logs_dir()?,
    };
    let log = RotatingLog::open(&dir, config.app_name, LOG_SEGMENTS, LOG_SEGMENT_BYTES)
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;

    let console_filter = if config.verbose {
        EnvFilter::new(crate_directives("debug"))
    } else {
        env_or_default_filter()
    };

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(LogSink::new(log))
        .with_ansi(false)
        .with_filter(env_or_default_filter());
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}

fn env_or_default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(crate_directives("info")))
}

/// `catcrawl=<level>,catcrawl_catalog=<level>,...`
fn crate_directives(level: &str) -> String {
    CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// State directory: `$CATCRAWL_HOME`, or `~/.catcrawl`.
pub fn catcrawl_home() -> PathBuf {
    match std::env::var_os("CATCRAWL_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".catcrawl"),
    }
}

pub fn logs_dir() -> PathBuf {
    catcrawl_home().join("logs")
}

/// Create [`logs_dir`] if needed and return it.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let dir = logs_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    Ok(dir)
}

//! Log sink wiring.
//!
//! Two independent sinks, mirroring the split the app has always had: the
//! shell's own lifecycle messages go to `winery-manager.log`, the raw
//! backend output (everything under the [`crate::winery_manager::WINERY_LOG_TARGET`]
//! target) goes to `winery.log`. Everything is also echoed to the console,
//! filtered by `RUST_LOG` (default `info`).

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::winery_manager::WINERY_LOG_TARGET;

pub const MANAGER_LOG_FILE: &str = "winery-manager.log";
pub const WINERY_LOG_FILE: &str = "winery.log";

/// Install the global subscriber with the console and file sinks under
/// `data_dir`. Call once at startup.
pub fn init(data_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("could not create data directory {}", data_dir.display()))?;

    let manager_log = open_log_file(data_dir, MANAGER_LOG_FILE)?;
    let winery_log = open_log_file(data_dir, WINERY_LOG_FILE)?;

    let console = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );

    let manager_file = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(manager_log))
        .with_filter(
            Targets::new().with_target(env!("CARGO_CRATE_NAME"), LevelFilter::DEBUG),
        );

    let winery_file = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(winery_log))
        .with_filter(Targets::new().with_target(WINERY_LOG_TARGET, LevelFilter::TRACE));

    tracing_subscriber::registry()
        .with(console)
        .with(manager_file)
        .with(winery_file)
        .try_init()
        .context("could not install the tracing subscriber")?;

    Ok(())
}

fn open_log_file(data_dir: &Path, name: &str) -> anyhow::Result<std::fs::File> {
    let path = data_dir.join(name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("could not open log file {}", path.display()))
}

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures of the backend process lifecycle.
///
/// An exit of the backend *after* it became ready is not an error return
/// anywhere; it surfaces as [`SupervisorEvent::UnexpectedExit`]
/// (see [`crate::events`]).
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Winery backend already running")]
    AlreadyRunning,

    #[error("no free TCP port found starting from {start_port} ({attempts} ports tried)")]
    NoPortAvailable { start_port: u16, attempts: u16 },

    #[error("could not prepare winery.yml")]
    Config(#[from] ConfigError),

    #[error("could not spawn the Winery backend process")]
    Spawn(#[source] io::Error),

    #[error("Winery exited while waiting for it to start: {message}")]
    StartupCrash { message: String },

    #[error("Winery backend not running")]
    NotRunning,

    #[error("Winery process did not exit within {timeout:?}")]
    StopTimeout { timeout: Duration },
}

/// Failures while regenerating the backend configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config template at {path}")]
    ReadTemplate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse config template at {path}")]
    ParseTemplate {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("could not serialize the winery configuration")]
    Serialize(#[source] serde_yaml::Error),

    #[error("could not write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures of the window coordination layer.
#[derive(Debug, Error)]
pub enum WindowError {
    /// The main window must be opened through
    /// [`crate::WindowManager::open_main_window`], never navigated to.
    #[error("will not open a new window for the main window URL")]
    MainWindowUrl,

    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

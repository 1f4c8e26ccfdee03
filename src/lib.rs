//! Desktop shell for the Eclipse Winery TOSCA modeling environment.
//!
//! The shell launches and supervises the bundled Winery backend (a Java
//! web application, opaque besides its HTTP surface and config file) and
//! coordinates the desktop windows that attach to its web UI:
//!
//!  - [`WineryManager`] owns the backend process lifecycle: port
//!    allocation, `winery.yml` generation, spawning, readiness polling,
//!    output redirection and the bounded shutdown protocol.
//!  - [`WindowManager`] owns the main (workspace selection) window and any
//!    number of Winery content windows, sequencing their lifecycle against
//!    the backend state.
//!  - [`DesktopShell`] ties the two together the way the desktop app wires
//!    them: open a workspace, swap the main window for a TOSCA Manager
//!    window, and bring the main window back when the last Winery window
//!    closes or the backend dies.
//!
//! Window rendering itself lives behind the [`WindowHost`] capability; the
//! shell only decides *which* windows exist and what they load.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod port_manager;
pub mod resources;
pub mod shell;
pub mod window_manager;
pub mod winery_manager;

pub use error::{ConfigError, SupervisorError, WindowError};
pub use events::SupervisorEvent;
pub use resources::{BundledWineryPaths, WineryPaths};
pub use shell::{url_classifier, DesktopShell};
pub use window_manager::{
    CloseDisposition, UrlClassifier, UrlKind, WindowEvent, WindowHost, WindowId, WindowKind,
    WindowManager,
};
pub use winery_manager::{WineryManager, DEFAULT_STOP_TIMEOUT};

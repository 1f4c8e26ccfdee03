//! Orchestration of the backend supervisor and the window manager.
//!
//! The shell owns the flow the desktop app is built around: a workspace is
//! opened from the main window, the backend comes up, a TOSCA Manager
//! window replaces the main window, and when the last Winery window closes
//! (or the backend dies) the main window comes back.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use reqwest::Url;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};

use crate::events::SupervisorEvent;
use crate::window_manager::{UrlClassifier, UrlKind, WindowEvent, WindowId, WindowManager};
use crate::winery_manager::{WineryManager, DEFAULT_STOP_TIMEOUT};

/// Build the URL classifier the window manager is constructed with.
///
/// URLs matching the main window URL prefix belong to the main window;
/// URLs on the running backend map to the window kind serving them; every
/// other URL (including anything while the backend is down) is external.
pub fn url_classifier(main_window_url: Url, winery: Arc<WineryManager>) -> Box<UrlClassifier> {
    Box::new(move |url: &Url| {
        if url.as_str().starts_with(main_window_url.as_str()) {
            return UrlKind::MainWindow;
        }

        if let (Ok(tosca_manager), Ok(topology_modeler)) =
            (winery.tosca_manager_url(), winery.topology_modeler_url())
        {
            if url.origin() == tosca_manager.origin() && url.path() == tosca_manager.path() {
                return UrlKind::ToscaManager;
            }
            if url.origin() == topology_modeler.origin()
                && url.path().starts_with(topology_modeler.path())
            {
                return UrlKind::TopologyModeler;
            }
        }

        UrlKind::External
    })
}

/// Ties [`WineryManager`] and [`WindowManager`] together.
pub struct DesktopShell {
    winery: Arc<WineryManager>,
    windows: Arc<WindowManager>,
}

impl DesktopShell {
    pub fn new(winery: Arc<WineryManager>, windows: Arc<WindowManager>) -> Self {
        Self { winery, windows }
    }

    pub fn winery(&self) -> &Arc<WineryManager> {
        &self.winery
    }

    pub fn windows(&self) -> &Arc<WindowManager> {
        &self.windows
    }

    /// Start the backend for the given repository and swap the main window
    /// for a TOSCA Manager window. On failure the main window stays up and
    /// the error is propagated for the UI to report.
    pub async fn open_workspace(&self, repository_path: &Path) -> anyhow::Result<()> {
        self.winery
            .start(repository_path)
            .await
            .context("could not start the Winery")?;

        let tosca_manager_url = self.winery.tosca_manager_url()?;
        self.windows
            .open_window_for(&tosca_manager_url)
            .await
            .context("could not open the TOSCA Manager window")?;
        self.windows.close_main_window();
        Ok(())
    }

    /// Dispatch supervisor and window notifications until either channel
    /// closes.
    pub async fn run(&self) {
        let mut winery_events = self.winery.subscribe();
        let mut window_events = self.windows.subscribe();

        loop {
            tokio::select! {
                event = winery_events.recv() => match event {
                    Ok(SupervisorEvent::UnexpectedExit { message }) => {
                        self.handle_unexpected_exit(message).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                event = window_events.recv() => match event {
                    Ok(WindowEvent::LastWineryWindowClosed { window }) => {
                        self.handle_last_winery_window_closed(window).await;
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    /// The last Winery window is closing: bring the main window back, stop
    /// the backend, then let the deferred close finish.
    pub async fn handle_last_winery_window_closed(&self, window: WindowId) {
        if let Err(window_error) = self.windows.open_main_window().await {
            error!("Could not reopen the main window: {}", window_error);
        }

        if let Err(stop_error) = self.winery.stop(DEFAULT_STOP_TIMEOUT).await {
            error!("Could not stop the Winery: {}", stop_error);
        }

        self.windows.complete_deferred_close(window);
    }

    /// The backend died without a stop request: tear down every Winery
    /// window and bring the main window back.
    pub async fn handle_unexpected_exit(&self, message: Option<String>) {
        match message {
            Some(message) => error!("The Winery has exited unexpectedly: {}", message),
            None => error!("The Winery has exited unexpectedly."),
        }

        self.windows.close_all_winery_windows();

        if self.windows.main_window().is_none() {
            if let Err(window_error) = self.windows.open_main_window().await {
                error!("Could not reopen the main window: {}", window_error);
            }
        }

        info!("Main window restored after backend exit");
    }
}

//! Creation and lifecycle coordination of the app windows.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::WindowError;

/// Opaque handle for a window owned by the windowing system.
///
/// The registry keeps a non-owning association from handle to role; the
/// [`WindowHost`] (and ultimately the OS) owns window lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

/// The kinds of windows the shell creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// The main (workspace selection) window.
    Main,
    /// A window displaying the TOSCA Manager web UI.
    ToscaManager,
    /// A window displaying the Topology Modeler web app.
    TopologyModeler,
}

/// Classification of a URL the app is asked to navigate to or open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    MainWindow,
    ToscaManager,
    TopologyModeler,
    External,
}

/// What the embedder should do with a window whose close was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Let the window close.
    Proceed,
    /// Keep the window alive; the shell will finish the close via
    /// [`WindowManager::complete_deferred_close`] after its own
    /// orchestration ran.
    Deferred,
}

/// Notifications emitted by [`WindowManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    /// The last Winery content window is about to close while no main
    /// window exists. Its close is deferred until
    /// [`WindowManager::complete_deferred_close`] is called.
    LastWineryWindowClosed { window: WindowId },
}

/// Capability for actually creating, loading and destroying windows.
///
/// Implemented by the embedding windowing layer; the manager only decides
/// which windows exist and what they load.
#[async_trait]
pub trait WindowHost: Send + Sync {
    fn create_window(&self, kind: WindowKind) -> anyhow::Result<WindowId>;

    /// Load a URL into a window. Resolves when the navigation has been
    /// accepted, not when the page finished rendering.
    async fn load_url(&self, window: WindowId, url: &Url) -> anyhow::Result<()>;

    fn destroy_window(&self, window: WindowId);

    /// Open a URL in the user's default web browser.
    fn open_external(&self, url: &Url) -> anyhow::Result<()>;
}

/// Classifier deciding how a URL maps to a window kind. Injected so the
/// manager stays independent of the backend's current endpoint URLs.
pub type UrlClassifier = dyn Fn(&Url) -> UrlKind + Send + Sync;

#[derive(Default)]
struct WindowRegistry {
    main_window: Option<WindowId>,
    tosca_manager_windows: Vec<WindowId>,
    topology_modeler_windows: Vec<WindowId>,
}

impl WindowRegistry {
    fn track(&mut self, kind: WindowKind, window: WindowId) {
        match kind {
            WindowKind::Main => self.main_window = Some(window),
            WindowKind::ToscaManager => self.tosca_manager_windows.push(window),
            WindowKind::TopologyModeler => self.topology_modeler_windows.push(window),
        }
    }

    fn remove_winery_window(&mut self, window: WindowId) {
        self.tosca_manager_windows.retain(|&id| id != window);
        self.topology_modeler_windows.retain(|&id| id != window);
    }

    fn contains_winery_window(&self, window: WindowId) -> bool {
        self.tosca_manager_windows.contains(&window)
            || self.topology_modeler_windows.contains(&window)
    }

    fn winery_windows(&self) -> Vec<WindowId> {
        self.tosca_manager_windows
            .iter()
            .chain(self.topology_modeler_windows.iter())
            .copied()
            .collect()
    }
}

/// Create and manage the lifecycle of app windows.
///
/// Guarantees at most one main window, tracks any number of Winery content
/// windows of the two kinds, and intercepts the close of the last content
/// window so the shell can stop the backend and bring the main window back
/// before the window actually goes away.
pub struct WindowManager {
    host: Arc<dyn WindowHost>,
    classify_url: Box<UrlClassifier>,
    main_window_url: Url,
    registry: Mutex<WindowRegistry>,
    events: broadcast::Sender<WindowEvent>,
}

impl WindowManager {
    pub fn new(
        host: Arc<dyn WindowHost>,
        classify_url: Box<UrlClassifier>,
        main_window_url: Url,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            host,
            classify_url,
            main_window_url,
            registry: Mutex::new(WindowRegistry::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WindowEvent> {
        self.events.subscribe()
    }

    pub fn main_window(&self) -> Option<WindowId> {
        self.registry.lock().main_window
    }

    pub fn tosca_manager_windows(&self) -> Vec<WindowId> {
        self.registry.lock().tosca_manager_windows.clone()
    }

    pub fn topology_modeler_windows(&self) -> Vec<WindowId> {
        self.registry.lock().topology_modeler_windows.clone()
    }

    /// All Winery content windows, both kinds.
    pub fn winery_windows(&self) -> Vec<WindowId> {
        self.registry.lock().winery_windows()
    }

    /// Opens the main "workspace selection" window. Makes sure there is
    /// only one main window created at all times.
    pub async fn open_main_window(&self) -> Result<(), WindowError> {
        let window = {
            let mut registry = self.registry.lock();
            if registry.main_window.is_some() {
                return Ok(());
            }
            let window = self.host.create_window(WindowKind::Main)?;
            registry.track(WindowKind::Main, window);
            window
        };

        if let Err(error) = self.host.load_url(window, &self.main_window_url).await {
            self.registry.lock().main_window = None;
            self.host.destroy_window(window);
            return Err(error.into());
        }
        Ok(())
    }

    /// Programmatically close the main window (after a content window took
    /// over). No-op when none exists.
    pub fn close_main_window(&self) {
        let window = self.registry.lock().main_window.take();
        if let Some(window) = window {
            self.host.destroy_window(window);
        }
    }

    /// Opens a Winery window for the specified URL, creating the window
    /// type matching the link. External (web) links are opened in the
    /// user's web browser and return no window.
    ///
    /// Asking for the main window URL is a programming error: the main
    /// window is opened via [`Self::open_main_window`], never navigated to.
    pub async fn open_window_for(&self, url: &Url) -> Result<Option<WindowId>, WindowError> {
        let kind = match (self.classify_url)(url) {
            UrlKind::MainWindow => return Err(WindowError::MainWindowUrl),
            UrlKind::External => {
                self.host.open_external(url)?;
                return Ok(None);
            }
            UrlKind::ToscaManager => WindowKind::ToscaManager,
            UrlKind::TopologyModeler => WindowKind::TopologyModeler,
        };

        let window = self.host.create_window(kind)?;
        self.registry.lock().track(kind, window);

        if let Err(error) = self.host.load_url(window, url).await {
            self.registry.lock().remove_winery_window(window);
            self.host.destroy_window(window);
            return Err(error.into());
        }
        Ok(Some(window))
    }

    /// Called when a page inside a Winery window asks to open a new
    /// window. The embedder must always deny the native new-window
    /// behavior and call this instead; the manager, not the browser
    /// chrome, decides the window strategy.
    pub async fn handle_window_open_request(&self, url: &Url) {
        match self.open_window_for(url).await {
            Ok(_) => {}
            Err(WindowError::MainWindowUrl) => {
                warn!("Denied in-page request to open the main window URL: {}", url);
            }
            Err(error) => {
                warn!("Could not open a window for {}: {}", url, error);
            }
        }
    }

    /// Decide what happens to a window whose close was requested.
    ///
    /// The close of the *last* Winery window while no main window exists
    /// is deferred: a [`WindowEvent::LastWineryWindowClosed`] notification
    /// fires instead, and the window stays tracked until
    /// [`Self::complete_deferred_close`] finishes the job.
    pub fn handle_close_requested(&self, window: WindowId) -> CloseDisposition {
        let mut registry = self.registry.lock();

        if registry.main_window == Some(window) {
            registry.main_window = None;
            return CloseDisposition::Proceed;
        }

        if !registry.contains_winery_window(window) {
            return CloseDisposition::Proceed;
        }

        if registry.main_window.is_none() && registry.winery_windows().len() == 1 {
            drop(registry);
            let _ = self
                .events
                .send(WindowEvent::LastWineryWindowClosed { window });
            return CloseDisposition::Deferred;
        }

        registry.remove_winery_window(window);
        CloseDisposition::Proceed
    }

    /// Finish a close that [`Self::handle_close_requested`] deferred.
    pub fn complete_deferred_close(&self, window: WindowId) {
        self.registry.lock().remove_winery_window(window);
        self.host.destroy_window(window);
    }

    /// Forcibly destroy every Winery content window, bypassing the
    /// deferred-close protocol. Used on unexpected-exit recovery.
    pub fn close_all_winery_windows(&self) {
        let windows = {
            let mut registry = self.registry.lock();
            let windows = registry.winery_windows();
            registry.tosca_manager_windows.clear();
            registry.topology_modeler_windows.clear();
            windows
        };

        for window in windows {
            self.host.destroy_window(window);
        }
    }
}

//! Supervision of the Winery backend process.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config;
use crate::error::{ConfigError, SupervisorError};
use crate::events::SupervisorEvent;
use crate::port_manager;
use crate::resources::{
    WineryPaths, TOPOLOGY_MODELER_PATH, TOSCA_MANAGER_PATH, WINERY_API_PATH,
};

/// Tracing target carrying the backend's raw stdout/stderr lines. Routed
/// to its own log file by [`crate::logging::init`].
pub const WINERY_LOG_TARGET: &str = "winery";

/// Default deadline for [`WineryManager::stop`].
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(180_000);

const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const SHUTDOWN_TOKEN: &str = "winery";

/// State held exactly while a backend process is running.
struct WineryState {
    child: Child,
    port: u16,
    #[allow(dead_code)]
    repository_path: PathBuf,
    /// Distinguishes an intentional shutdown of the backend from an
    /// unexpected exit. Cleared only by `stop()`.
    should_be_running: bool,
}

/// Manages the Winery backend process.
///
/// At most one backend runs per manager. Callers serialize `start` and
/// `stop`; the manager does not queue concurrent requests.
pub struct WineryManager {
    paths: Arc<dyn WineryPaths>,
    state: Arc<Mutex<Option<WineryState>>>,
    last_stderr_line: Arc<Mutex<Option<String>>>,
    events: broadcast::Sender<SupervisorEvent>,
    http: reqwest::Client,
}

impl WineryManager {
    pub fn new(paths: Arc<dyn WineryPaths>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            paths,
            state: Arc::new(Mutex::new(None)),
            last_stderr_line: Arc::new(Mutex::new(None)),
            events,
            // Same bounded-probe client the health monitor uses; readiness
            // retries on any failure, so a short timeout is safe.
            http: reqwest::Client::builder()
                .timeout(PROBE_TIMEOUT)
                .build()
                .expect("default reqwest client"),
        }
    }

    /// Subscribe to lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.events.subscribe()
    }

    /// Whether the backend process is currently running.
    pub fn is_running(&self) -> bool {
        match self.state.lock().as_mut() {
            Some(state) => child_is_alive(&mut state.child),
            None => false,
        }
    }

    /// The port the backend currently listens on.
    pub fn port(&self) -> Result<u16, SupervisorError> {
        let mut guard = self.state.lock();
        if let Some(state) = guard.as_mut() {
            if child_is_alive(&mut state.child) {
                return Ok(state.port);
            }
        }
        Err(SupervisorError::NotRunning)
    }

    /// Base URL of the running backend.
    pub fn backend_url(&self) -> Result<Url, SupervisorError> {
        Ok(backend_base_url(self.port()?))
    }

    /// URL of the TOSCA Manager web UI on the running backend.
    pub fn tosca_manager_url(&self) -> Result<Url, SupervisorError> {
        Ok(endpoint_url(self.port()?, TOSCA_MANAGER_PATH))
    }

    /// URL of the Topology Modeler web app on the running backend.
    pub fn topology_modeler_url(&self) -> Result<Url, SupervisorError> {
        Ok(endpoint_url(self.port()?, TOPOLOGY_MODELER_PATH))
    }

    /// Path of the config file the backend reads. The `.winery` location
    /// under `user.home` is hardcoded in the Winery's Environment class.
    pub fn config_file_path(&self) -> PathBuf {
        self.paths.data_dir().join(".winery").join("winery.yml")
    }

    /// Starts the backend with the specified repository path.
    ///
    /// Resolves once the backend answers its readiness probe. The
    /// repository path may point at an empty directory, which the Winery
    /// will then initialize.
    pub async fn start(&self, repository_path: impl AsRef<Path>) -> Result<(), SupervisorError> {
        let repository_path = repository_path.as_ref();

        if self.is_running() {
            return Err(SupervisorError::AlreadyRunning);
        }

        let port = port_manager::find_available_port(port_manager::BASE_PORT)?;
        self.prepare_config_file(port, repository_path)?;

        self.emit(SupervisorEvent::Starting);
        info!("Starting the Winery...");

        let mut child = self.spawn_backend(port).map_err(SupervisorError::Spawn)?;
        let pid = child.id();
        self.attach_output_loggers(&mut child);

        // While starting, this call exclusively owns the child: the
        // readiness loop itself detects an early exit, so a crash during
        // startup is reported exactly once, and never as an unexpected
        // exit of a running backend.
        self.wait_for_ready(port, &mut child).await?;

        info!("Winery started on port {}!", port);
        *self.state.lock() = Some(WineryState {
            child,
            port,
            repository_path: repository_path.to_path_buf(),
            should_be_running: true,
        });
        if let Some(pid) = pid {
            self.spawn_exit_watcher(pid);
        }
        self.emit(SupervisorEvent::Ready { port });
        Ok(())
    }

    /// Stops the backend if it is running.
    ///
    /// Sends a shutdown request to the backend, then polls until the
    /// process is observed gone. The request is fire-and-forget: only the
    /// timeout fails this call. On timeout the process may still be alive;
    /// escalation (force-kill, user notification) is the caller's call.
    pub async fn stop(&self, timeout: Duration) -> Result<(), SupervisorError> {
        let port = {
            let mut guard = self.state.lock();
            let alive = match guard.as_mut() {
                Some(state) => child_is_alive(&mut state.child),
                None => false,
            };
            match guard.as_mut() {
                Some(state) if alive => {
                    // Mark the shutdown as intentional before anything can
                    // observe the exit, so the watcher does not report a
                    // crash.
                    state.should_be_running = false;
                    state.port
                }
                _ => {
                    info!("Winery not running, nothing to stop");
                    return Ok(());
                }
            }
        };

        info!("Stopping the Winery...");
        self.emit(SupervisorEvent::Stopping);
        self.send_shutdown_request(port);

        self.wait_for_stopped(timeout).await?;

        info!("Winery stopped");
        self.emit(SupervisorEvent::Stopped);
        Ok(())
    }

    fn emit(&self, event: SupervisorEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Regenerate `winery.yml` from the bundled template with the
    /// repository root and the port-dependent endpoint URLs.
    fn prepare_config_file(
        &self,
        port: u16,
        repository_path: &Path,
    ) -> Result<(), ConfigError> {
        info!("Creating the winery.yml config file");

        let mut config = config::load_template(&self.paths.config_template())?;
        config.repository.repository_root = repository_path.display().to_string();
        config.ui.endpoints.topologymodeler =
            endpoint_url(port, TOPOLOGY_MODELER_PATH).to_string();
        config.ui.endpoints.repository_api_url = endpoint_url(port, WINERY_API_PATH).to_string();
        config.ui.endpoints.repository_ui_url = endpoint_url(port, TOSCA_MANAGER_PATH).to_string();

        config::write_config(&config, &self.config_file_path())
    }

    fn spawn_backend(&self, port: u16) -> io::Result<Child> {
        let mut command = Command::new(self.paths.java_cmd());
        command
            .arg(format!("-Duser.home={}", self.paths.data_dir().display()))
            .arg("-Dorg.eclipse.jetty.LEVEL=INFO")
            .arg(format!("-Dwinerylauncher.port={}", port))
            .arg(format!(
                "-Dlogback.configurationFile={}",
                self.paths.logback_config().display()
            ))
            .arg("-jar")
            .arg("-XX:TieredStopAtLevel=1")
            .arg("-noverify")
            .arg(self.paths.launcher_jar())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Winery command: {:?}", command.as_std());
        command.spawn()
    }

    /// Redirect the backend's stdout and stderr into the backend log sink,
    /// retaining the most recent stderr line for crash diagnostics.
    fn attach_output_loggers(&self, child: &mut Child) {
        *self.last_stderr_line.lock() = None;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(target: WINERY_LOG_TARGET, "{}", line);
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let last_line = Arc::clone(&self.last_stderr_line);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    *last_line.lock() = Some(line.clone());
                    error!(target: WINERY_LOG_TARGET, "{}", line);
                }
            });
        }
    }

    /// Poll the backend until it accepts connections. Fails as soon as the
    /// process exits instead of becoming ready.
    async fn wait_for_ready(
        &self,
        port: u16,
        child: &mut Child,
    ) -> Result<(), SupervisorError> {
        let probe_url = endpoint_url(port, WINERY_API_PATH);

        loop {
            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    error!("Winery exited while waiting for it to start ({})", status);
                    let message = self.last_stderr_line.lock().clone().unwrap_or_else(|| {
                        format!("Winery exited while waiting for it to start ({status})")
                    });
                    return Err(SupervisorError::StartupCrash { message });
                }
                Err(error) => return Err(SupervisorError::Spawn(error)),
            }

            match self.http.get(probe_url.clone()).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(_) | Err(_) => {
                    info!("Waiting for the Winery to start on port {}...", port);
                    tokio::time::sleep(READY_POLL_INTERVAL).await;
                }
            }
        }
    }

    /// Watch a running backend for its exit. Emits `UnexpectedExit` when
    /// the process goes away without a stop request, and always clears the
    /// state. Keyed to the pid so a watcher left over from an earlier run
    /// steps aside once a newer backend owns the state.
    fn spawn_exit_watcher(&self, pid: u32) {
        let state = Arc::clone(&self.state);
        let last_stderr_line = Arc::clone(&self.last_stderr_line);
        let events = self.events.clone();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(STOP_POLL_INTERVAL).await;

                let exited = {
                    let mut guard = state.lock();
                    let Some(current) = guard.as_mut() else {
                        break;
                    };
                    // id() is None once the exit status has been collected
                    // elsewhere; only a *different* live pid means a newer
                    // backend took over.
                    if current.child.id().is_some_and(|current_pid| current_pid != pid) {
                        break;
                    }

                    match current.child.try_wait() {
                        Ok(None) => None,
                        Ok(Some(status)) => {
                            let should_be_running = current.should_be_running;
                            *guard = None;
                            Some((status, should_be_running))
                        }
                        Err(error) => {
                            warn!("Could not poll the Winery process status: {}", error);
                            None
                        }
                    }
                };

                if let Some((status, should_be_running)) = exited {
                    if should_be_running {
                        error!("Winery exited unexpectedly ({})", status);
                        let message = last_stderr_line.lock().clone();
                        let _ = events.send(SupervisorEvent::UnexpectedExit { message });
                    } else {
                        info!("Winery exited ({})", status);
                    }
                    break;
                }
            }
        });
    }

    fn send_shutdown_request(&self, port: u16) {
        let mut shutdown_url = endpoint_url(port, "/shutdown");
        shutdown_url.set_query(Some(&format!("token={SHUTDOWN_TOKEN}")));

        let http = self.http.clone();
        tokio::spawn(async move {
            if let Err(error) = http.post(shutdown_url).send().await {
                warn!("Could not send shutdown request to the Winery: {}", error);
            }
        });
    }

    /// Poll until the backend is observed gone, bounded by `timeout`.
    async fn wait_for_stopped(&self, timeout: Duration) -> Result<(), SupervisorError> {
        info!("Waiting for the Winery to stop...");

        let mut waited = Duration::ZERO;
        while self.is_running() {
            if waited >= timeout {
                return Err(SupervisorError::StopTimeout { timeout });
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
            waited += STOP_POLL_INTERVAL;
        }
        Ok(())
    }
}

/// `http://localhost:{port}`, the root all backend URLs derive from.
pub fn backend_base_url(port: u16) -> Url {
    Url::parse(&format!("http://localhost:{port}")).expect("base URL is valid")
}

/// A fixed sub-path on the backend server for the given port.
pub fn endpoint_url(port: u16, path: &str) -> Url {
    backend_base_url(port)
        .join(path)
        .expect("endpoint path is valid")
}

fn child_is_alive(child: &mut Child) -> bool {
    child.id().is_some() && matches!(child.try_wait(), Ok(None))
}

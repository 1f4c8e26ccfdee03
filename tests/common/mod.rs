//! Shared test harness: a stub backend executable standing in for `java`,
//! a minimal HTTP responder playing the Winery's readiness/shutdown
//! endpoints, and a recording window host.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use winery_desktop::{WindowHost, WindowId, WindowKind, WineryPaths};

/// Every backend test allocates ports from the same base; holding this
/// guard keeps parallel tests from racing each other to the same port.
pub fn backend_port_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Paths pointing the supervisor at a scratch directory and the stub
/// backend script.
pub struct TestWineryPaths {
    root: PathBuf,
}

impl WineryPaths for TestWineryPaths {
    fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    fn java_cmd(&self) -> PathBuf {
        self.root.join("bin").join("java")
    }

    fn launcher_jar(&self) -> PathBuf {
        self.root.join("launcher.jar")
    }

    fn logback_config(&self) -> PathBuf {
        self.root.join("logback.xml")
    }

    fn config_template(&self) -> PathBuf {
        self.root.join("winery.yaml")
    }
}

#[derive(Default)]
pub struct StubBackendOptions {
    /// Lines the stub writes to stderr right after launch.
    pub stderr_lines: Vec<String>,
    /// Exit right away instead of waiting for the exit marker file.
    pub exit_immediately: bool,
    pub exit_code: i32,
}

/// Install the stub backend under `root`: the config template, placeholder
/// launcher artifacts, and a shell script in place of `java`. The script
/// records its argv to `argv.txt` and then waits for `exit-now` to appear
/// (self-limited so an orphan can never outlive the test run by much).
pub fn install_stub_backend(
    root: &Path,
    options: &StubBackendOptions,
) -> std::sync::Arc<TestWineryPaths> {
    use std::fs;

    fs::create_dir_all(root.join("data")).unwrap();
    fs::create_dir_all(root.join("bin")).unwrap();
    fs::write(
        root.join("winery.yaml"),
        include_str!("../../resources/winery.yaml"),
    )
    .unwrap();
    fs::write(root.join("logback.xml"), "<configuration/>\n").unwrap();
    fs::write(root.join("launcher.jar"), "").unwrap();

    let mut stderr_block = String::new();
    for line in &options.stderr_lines {
        stderr_block.push_str(&format!("echo '{line}' >&2\n"));
    }

    let tail = if options.exit_immediately {
        format!("exit {}\n", options.exit_code)
    } else {
        format!(
            "i=0\n\
             while [ ! -f '{exit_file}' ] && [ \"$i\" -lt 1200 ]; do\n\
             \tsleep 0.05\n\
             \ti=$((i+1))\n\
             done\n\
             exit {code}\n",
            exit_file = root.join("exit-now").display(),
            code = options.exit_code,
        )
    };

    let script = format!(
        "#!/bin/sh\n\
         printf '%s\\n' \"$@\" > '{argv_tmp}' && mv '{argv_tmp}' '{argv}'\n\
         {stderr_block}\
         {tail}",
        argv_tmp = root.join("argv.tmp").display(),
        argv = root.join("argv.txt").display(),
    );

    let script_path = root.join("bin").join("java");
    fs::write(&script_path, script).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    std::sync::Arc::new(TestWineryPaths {
        root: root.to_path_buf(),
    })
}

/// Wait for the stub backend to be spawned and return the argv it was
/// invoked with.
pub async fn wait_for_spawn_args(root: &Path) -> Vec<String> {
    let path = root.join("argv.txt");
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(raw) = std::fs::read_to_string(&path) {
            if !raw.is_empty() {
                return raw.lines().map(str::to_string).collect();
            }
        }
        assert!(Instant::now() < deadline, "stub backend was not spawned");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn clear_spawn_args(root: &Path) {
    let _ = std::fs::remove_file(root.join("argv.txt"));
}

pub fn port_from_args(args: &[String]) -> u16 {
    args.iter()
        .find_map(|arg| arg.strip_prefix("-Dwinerylauncher.port="))
        .expect("port argument missing")
        .parse()
        .expect("port argument not a number")
}

/// Tell the stub backend to exit, bypassing the shutdown endpoint.
pub fn trigger_backend_exit(root: &Path) {
    std::fs::write(root.join("exit-now"), "").unwrap();
}

#[derive(Clone, Copy)]
pub struct BackendBehavior {
    /// Respond 503 to this many readiness probes before turning healthy.
    pub ready_after_probes: usize,
    /// Create the stub's exit marker when the shutdown endpoint is hit.
    pub exit_on_shutdown: bool,
}

impl Default for BackendBehavior {
    fn default() -> Self {
        Self {
            ready_after_probes: 0,
            exit_on_shutdown: true,
        }
    }
}

/// Request counters of the stub HTTP surface.
#[derive(Default)]
pub struct BackendHttpStats {
    pub readiness_probes: AtomicU64,
    pub shutdown_requests: AtomicU64,
}

/// Serve the Winery's HTTP surface for the stub backend: the readiness
/// endpoint and the shutdown endpoint. Runs until the test ends.
pub async fn serve_backend_http(
    root: &Path,
    port: u16,
    behavior: BackendBehavior,
) -> std::sync::Arc<BackendHttpStats> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("stub backend port should be free");
    let exit_file = root.join("exit-now");
    let stats = std::sync::Arc::new(BackendHttpStats::default());
    let task_stats = std::sync::Arc::clone(&stats);

    tokio::spawn(async move {
        let mut probes_seen = 0usize;
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };

            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            // read until end of the request head; all requests here are bodyless
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        raw.extend_from_slice(&buf[..n]);
                        if raw.windows(4).any(|window| window == b"\r\n\r\n") {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }

            let head = String::from_utf8_lossy(&raw);
            let request_line = head.lines().next().unwrap_or_default().to_string();

            let status = if request_line.starts_with("POST /shutdown") {
                task_stats.shutdown_requests.fetch_add(1, Ordering::SeqCst);
                if behavior.exit_on_shutdown {
                    let _ = std::fs::write(&exit_file, "");
                }
                "200 OK"
            } else if request_line.starts_with("GET /winery") {
                task_stats.readiness_probes.fetch_add(1, Ordering::SeqCst);
                probes_seen += 1;
                if probes_seen <= behavior.ready_after_probes {
                    "503 Service Unavailable"
                } else {
                    "200 OK"
                }
            } else {
                "200 OK"
            };

            let response =
                format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    stats
}

/// A recording window host for coordinator and shell tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    Created(WindowKind, WindowId),
    Loaded(WindowId, String),
    Destroyed(WindowId),
    OpenedExternal(String),
}

#[derive(Default)]
pub struct MockWindowHost {
    next_id: AtomicU64,
    actions: Mutex<Vec<HostAction>>,
}

impl MockWindowHost {
    pub fn actions(&self) -> Vec<HostAction> {
        self.actions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn destroyed(&self) -> Vec<WindowId> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                HostAction::Destroyed(window) => Some(window),
                _ => None,
            })
            .collect()
    }

    pub fn opened_external(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                HostAction::OpenedExternal(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    fn record(&self, action: HostAction) {
        self.actions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(action);
    }
}

#[async_trait]
impl WindowHost for MockWindowHost {
    fn create_window(&self, kind: WindowKind) -> anyhow::Result<WindowId> {
        let window = WindowId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.record(HostAction::Created(kind, window));
        Ok(window)
    }

    async fn load_url(&self, window: WindowId, url: &Url) -> anyhow::Result<()> {
        self.record(HostAction::Loaded(window, url.to_string()));
        Ok(())
    }

    fn destroy_window(&self, window: WindowId) {
        self.record(HostAction::Destroyed(window));
    }

    fn open_external(&self, url: &Url) -> anyhow::Result<()> {
        self.record(HostAction::OpenedExternal(url.to_string()));
        Ok(())
    }
}

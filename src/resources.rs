//! Resolution of the bundled runtime artifacts (JRE, launcher jar, config
//! template) and the application data directory.

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Sub-path of the TOSCA Manager web UI on the backend server.
pub const TOSCA_MANAGER_PATH: &str = "/";
/// Sub-path of the Topology Modeler web app on the backend server.
pub const TOPOLOGY_MODELER_PATH: &str = "/winery-topologymodeler";
/// Sub-path of the Winery REST API (also serves as the readiness probe).
pub const WINERY_API_PATH: &str = "/winery";

/// Paths the supervisor needs to launch the backend.
///
/// Injected rather than resolved inline so tests can point the supervisor
/// at a scratch directory and a stand-in executable.
pub trait WineryPaths: Send + Sync {
    /// Directory used as the backend's `user.home` override. The backend
    /// reads its config from `.winery/winery.yml` below this directory,
    /// and the shell's log files land here as well.
    fn data_dir(&self) -> PathBuf;

    /// The `java` executable used to run the launcher.
    fn java_cmd(&self) -> PathBuf;

    /// The launcher jar embedding the Winery web applications.
    fn launcher_jar(&self) -> PathBuf;

    /// Logback configuration passed to the backend JVM.
    fn logback_config(&self) -> PathBuf;

    /// The `winery.yaml` template patched before every launch.
    fn config_template(&self) -> PathBuf;
}

/// Production paths: a resource directory next to the executable (or the
/// checked-out `resources/` directory in dev builds) plus the platform
/// data directory.
pub struct BundledWineryPaths {
    resource_dir: PathBuf,
    data_dir: PathBuf,
}

impl BundledWineryPaths {
    pub fn new(resource_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: resource_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Resolve the standard locations for this installation.
    pub fn discover() -> anyhow::Result<Self> {
        let resource_dir = if cfg!(debug_assertions) {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources")
        } else {
            std::env::current_exe()
                .context("could not determine the executable path")?
                .parent()
                .context("executable has no parent directory")?
                .join("resources")
        };

        let data_dir = dirs::data_dir()
            .context("no platform data directory available")?
            .join("winery-desktop");

        Ok(Self::new(resource_dir, data_dir))
    }

    pub fn resource_dir(&self) -> &Path {
        &self.resource_dir
    }
}

impl WineryPaths for BundledWineryPaths {
    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    fn java_cmd(&self) -> PathBuf {
        let bundled = self
            .resource_dir
            .join("java")
            .join("bin")
            .join(java_executable_name());
        if bundled.exists() {
            return bundled;
        }

        // No bundled JRE (typical for dev checkouts): fall back to a java
        // found on the PATH.
        which::which("java").unwrap_or_else(|_| PathBuf::from("java"))
    }

    fn launcher_jar(&self) -> PathBuf {
        self.resource_dir.join("winery").join("launcher.jar")
    }

    fn logback_config(&self) -> PathBuf {
        self.resource_dir.join("logback.xml")
    }

    fn config_template(&self) -> PathBuf {
        self.resource_dir.join("winery.yaml")
    }
}

fn java_executable_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "java.exe"
    } else {
        "java"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_paths_derive_from_the_resource_dir() {
        let paths = BundledWineryPaths::new("/opt/app/resources", "/home/user/.local/share/wd");
        assert_eq!(
            paths.launcher_jar(),
            PathBuf::from("/opt/app/resources/winery/launcher.jar")
        );
        assert_eq!(
            paths.logback_config(),
            PathBuf::from("/opt/app/resources/logback.xml")
        );
        assert_eq!(
            paths.config_template(),
            PathBuf::from("/opt/app/resources/winery.yaml")
        );
        assert_eq!(paths.data_dir(), PathBuf::from("/home/user/.local/share/wd"));
    }
}

//! The backend configuration file.
//!
//! Some values, like the repository path and the URLs of the bundled web
//! apps (which depend on the dynamically chosen port), can only be set in
//! the Winery config file; they cannot be passed as JVM parameters or
//! environment variables. The shell therefore rewrites the whole file from
//! a bundled template before every launch.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::ConfigError;

/// The `winery.yml` document. Only the fields the shell patches are typed;
/// every other key in the template is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WineryConfig {
    pub repository: RepositorySection,
    pub ui: UiSection,
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySection {
    #[serde(rename = "repositoryRoot")]
    pub repository_root: String,
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiSection {
    pub endpoints: EndpointsSection,
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsSection {
    pub topologymodeler: String,
    #[serde(rename = "repositoryApiUrl")]
    pub repository_api_url: String,
    #[serde(rename = "repositoryUiUrl")]
    pub repository_ui_url: String,
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

/// Load the bundled configuration template.
pub fn load_template(path: &Path) -> Result<WineryConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadTemplate {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::ParseTemplate {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the patched configuration, creating parent directories as needed.
/// The file handle is scoped and flushed so the backend never observes a
/// partially written document.
pub fn write_config(config: &WineryConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let rendered = serde_yaml::to_string(config).map_err(ConfigError::Serialize)?;

    {
        let mut file = File::create(path).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        file.write_all(rendered.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
    }

    Ok(())
}

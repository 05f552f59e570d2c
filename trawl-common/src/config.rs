//! Configuration file location, TOML loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the root folder
pub const ROOT_ENV_VAR: &str = "TRAWL_ROOT";

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "TRAWL_CONFIG";

/// Default config file name under `<config_dir>/trawl/`
pub const CONFIG_FILE_NAME: &str = "trawl.toml";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "trawl.db";

/// Logging section shared by every binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// Resolve the configuration file path
///
/// **Priority:**
/// 1. `TRAWL_CONFIG` environment variable
/// 2. `<config_dir>/trawl/trawl.toml`
///
/// The returned path may not exist; callers fall back to defaults.
pub fn config_file_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("trawl").join(CONFIG_FILE_NAME))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Parse a TOML file into `T`, or `T::default()` when the file is missing
///
/// A file that exists but does not parse is an error: silently running with
/// defaults would hide a typo in a budget ceiling.
pub fn load_toml_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    debug!(path = %path.display(), "Loaded config file");
    Ok(value)
}

/// Write a config value as TOML, creating parent directories
pub fn write_toml_config<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    info!(path = %path.display(), "Wrote config file");
    Ok(())
}

/// Root folder resolution
///
/// **Priority:**
/// 1. `TRAWL_ROOT` environment variable
/// 2. `root_folder` from the TOML config
/// 3. OS-dependent default
pub struct RootFolderResolver {
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(toml_root: Option<PathBuf>) -> Self {
        Self { toml_root }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Ok(path) = std::env::var(ROOT_ENV_VAR) {
            if !path.trim().is_empty() {
                debug!(root = %path, "Root folder from environment");
                return PathBuf::from(path);
            }
            warn!("{} is set but empty, ignoring", ROOT_ENV_VAR);
        }

        if let Some(path) = &self.toml_root {
            debug!(root = %path.display(), "Root folder from config file");
            return path.clone();
        }

        default_root_folder()
    }
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("trawl"))
        .unwrap_or_else(|| PathBuf::from("./trawl_data"))
}

/// Create the root folder if needed and return the database path inside it
pub fn prepare_root_folder(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    Ok(root.join(DATABASE_FILE_NAME))
}

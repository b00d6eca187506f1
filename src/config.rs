use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::crawler::ScanConfig;
use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::navigation::NavigationConfig;
use crate::render_tree::LayoutConfig;

/// Config file override.
pub const CONFIG_ENV: &str = "SPACEMAP_CONFIG";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Everything tunable, read from one TOML file. Missing tables and keys fall back
/// to their defaults, so an empty file is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub layout: LayoutConfig,
    pub navigation: NavigationConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `<config dir>/spacemap/config.toml` for the current platform.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "spacemap", "spacemap").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// The file `load` would read: the explicit path, else `SPACEMAP_CONFIG`, else
/// the platform default if it exists.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }
    default_config_path().filter(|path| path.is_file())
}

/// Load the config. A file that was asked for (argument or env) must exist; a
/// missing default file just means defaults.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    match resolve_config_path(explicit) {
        Some(path) => Config::from_file(&path),
        None => Ok(Config::default()),
    }
}

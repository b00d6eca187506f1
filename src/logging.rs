//! Logging setup
//!
//! Structured logging through `tracing`. The library only emits events; the
//! binary calls [`init_logging`] once at startup. Since the terminal front end
//! owns the screen, logs go to a file by default.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::ConfigError;

/// Full filter override, in `EnvFilter` syntax.
pub const LOG_ENV: &str = "SPACEMAP_LOG";
/// Log file override.
pub const LOG_FILE_ENV: &str = "SPACEMAP_LOG_FILE";

const LOG_FILE_NAME: &str = "spacemap.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stderr,
    #[default]
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// trace, debug, info, warn, error or off
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log file when `output` is `file`; `None` uses the platform state directory.
    pub file: Option<PathBuf>,
    /// Per-target levels, e.g. `spacemap::crawler = "debug"`.
    pub modules: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file: None,
            modules: HashMap::new(),
        }
    }
}

/// Log file with precedence: `SPACEMAP_LOG_FILE`, config, platform default.
pub fn resolve_log_file_path(config_file: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    if let Ok(env_path) = std::env::var(LOG_FILE_ENV) {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }
    if let Some(path) = config_file {
        if !path.as_os_str().is_empty() {
            return Ok(path);
        }
    }
    default_log_file_path()
}

fn default_log_file_path() -> Result<PathBuf, ConfigError> {
    let dirs = directories::ProjectDirs::from("", "spacemap", "spacemap").ok_or_else(|| {
        ConfigError::Logging("Could not determine platform directories for log file".to_string())
    })?;
    let dir = dirs.state_dir().unwrap_or_else(|| dirs.cache_dir());
    Ok(dir.join(LOG_FILE_NAME))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Registry::default()
            .with(EnvFilter::new("off"))
            .try_init()
            .map_err(|e| ConfigError::Logging(e.to_string()));
    }

    let filter = build_env_filter(config)?;
    let (writer, ansi) = match config.output {
        LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        LogOutput::File => (BoxMakeWriter::new(Arc::new(open_log_file(config)?)), false),
    };

    let registry = Registry::default().with(filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init(),
    };
    result.map_err(|e| ConfigError::Logging(e.to_string()))
}

fn open_log_file(config: &LoggingConfig) -> Result<std::fs::File, ConfigError> {
    let path = resolve_log_file_path(config.file.clone())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Logging(format!("Failed to create log directory: {}", e)))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| ConfigError::Logging(format!("Failed to open log file {}: {}", path.display(), e)))
}

/// `SPACEMAP_LOG` when set, otherwise the configured level plus module overrides.
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    filter_from_config(config)
}

fn filter_from_config(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(&config.level);
    for (module, level) in &config.modules {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| ConfigError::Logging(format!("Invalid log directive {}: {}", directive, e)))?,
        );
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::default();
        assert!(config.enabled);
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.file, None);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LoggingConfig = toml::from_str(
            r#"
            format = "json"
            output = "stderr"
            [modules]
            "spacemap::crawler" = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.level, "info");
        assert_eq!(config.modules.get("spacemap::crawler").map(String::as_str), Some("debug"));
    }

    #[test]
    fn test_module_directives() {
        let mut config = LoggingConfig::default();
        config.modules.insert("spacemap::crawler".to_string(), "trace".to_string());
        assert!(filter_from_config(&config).is_ok());

        config.modules.insert("spacemap::hue".to_string(), "loud".to_string());
        assert!(matches!(filter_from_config(&config), Err(ConfigError::Logging(_))));
    }

    #[test]
    fn test_log_file_from_config() {
        let path = resolve_log_file_path(Some(PathBuf::from("/tmp/spacemap-test.log"))).unwrap();
        if std::env::var(LOG_FILE_ENV).is_err() {
            assert_eq!(path, PathBuf::from("/tmp/spacemap-test.log"));
        }
    }

    #[test]
    fn test_default_log_file_name() {
        let path = default_log_file_path().unwrap();
        assert!(path.ends_with(LOG_FILE_NAME));
    }
}

use std::{env, fmt, fs, path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::Cadence;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file {}: {source}", path.display())]
    ReadFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to write config file {}: {source}", path.display())]
    WriteFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to parse config file {}: {source}", path.display())]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available: neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file shared with the web front end
    pub path: path::PathBuf,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Pause between sweeps
    pub interval_seconds: u64,
    /// Upper bound on a single probe
    pub timeout_seconds: u64,
    /// Maximum number of simultaneous outbound probes
    pub max_concurrency: usize,
    pub cadence: Cadence,
    /// How long an in-flight sweep may keep running after a stop request
    pub shutdown_grace_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

const MIN_INTERVAL: u64 = 1;
const MAX_INTERVAL: u64 = 86400;
const MIN_TIMEOUT: u64 = 1;
const MAX_TIMEOUT: u64 = 300;

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/allyouruptime/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("allyouruptime/config.toml"))
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "allyouruptime.sqlite3".into(), max_connections: 16 }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            timeout_seconds: 5,
            max_concurrency: 32,
            cadence: Cadence::FixedDelay,
            shutdown_grace_seconds: 10,
            user_agent: concat!("allyouruptime/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

impl MonitoringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Monitoring")?;
        write_1(f, "Interval (s)", &self.monitoring.interval_seconds)?;
        write_1(f, "Probe Timeout (s)", &self.monitoring.timeout_seconds)?;
        write_1(f, "Max Concurrency", &self.monitoring.max_concurrency)?;
        write_1(f, "Cadence", &self.monitoring.cadence)?;
        write_1(f, "Shutdown Grace (s)", &self.monitoring.shutdown_grace_seconds)?;
        write_1(f, "User Agent", &self.monitoring.user_agent)?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.logging.level)?;
        write_1(f, "Format", &self.logging.format)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/allyouruptime/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| Error::ParseFailed { path: config_path, source })
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        let monitoring = &self.monitoring;

        if !(MIN_INTERVAL..=MAX_INTERVAL).contains(&monitoring.interval_seconds) {
            return Err(Error::Invalid(format!(
                "monitoring.interval_seconds must be between {MIN_INTERVAL} and {MAX_INTERVAL}, got {}",
                monitoring.interval_seconds
            )));
        }

        if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&monitoring.timeout_seconds) {
            return Err(Error::Invalid(format!(
                "monitoring.timeout_seconds must be between {MIN_TIMEOUT} and {MAX_TIMEOUT}, got {}",
                monitoring.timeout_seconds
            )));
        }

        if monitoring.max_concurrency == 0 {
            return Err(Error::Invalid("monitoring.max_concurrency must be at least 1".into()));
        }

        if self.database.max_connections == 0 {
            return Err(Error::Invalid("database.max_connections must be at least 1".into()));
        }

        if self.logging.format.parse::<logger::LogFormat>().is_err() {
            return Err(Error::Invalid(format!(
                "logging.format must be `compact` or `json`, got `{}`",
                self.logging.format
            )));
        }

        if self.logging.level.parse::<logger::LevelFilter>().is_err() {
            return Err(Error::Invalid(format!("logging.level `{}` is not a level", self.logging.level)));
        }

        Ok(())
    }
}

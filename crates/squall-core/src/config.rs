//! Configuration loading and typed config structures for the replay engine.
//!
//! The canonical configuration lives in `squall-config.yaml` at the
//! project root. This module defines strongly-typed structs that mirror
//! the YAML structure and provides a loader that reads the file.
//!
//! The scheduler timing policy (sleep floor/ceiling, control-API poll
//! interval, retry backoff) is deliberately a first-class config value
//! rather than scattered literals, so the dispatch loop's timing behavior
//! is testable.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level replay engine configuration.
///
/// Mirrors the structure of `squall-config.yaml`. All fields have
/// defaults, so a missing file yields a usable local setup.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplayConfig {
    /// Output and deployment directory layout.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Replay log database location.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Timing policy for the warning replay loop.
    #[serde(default)]
    pub warning_scheduler: SchedulerConfig,

    /// Timing policy for the radar replay loop.
    #[serde(default = "SchedulerConfig::radar_default")]
    pub radar_scheduler: SchedulerConfig,

    /// Consumed control-plane API endpoint.
    #[serde(default)]
    pub control_api: ControlApiConfig,

    /// External radar munging utility.
    #[serde(default)]
    pub munger: MungerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ReplayConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `DATABASE_URL` overrides `database.url`
    /// - `CONTROL_API_URL` overrides `control_api.base_url`
    /// - `CONTROL_API_PASSCODE` overrides `control_api.passcode`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override connection settings with environment variables when set.
    ///
    /// This lets a deployment set endpoints without editing the YAML file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup. Split out from
    /// [`Self::apply_env_overrides`] so tests can drive it without
    /// mutating the process environment.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = lookup("CONTROL_API_URL") {
            self.control_api.base_url = val;
        }
        if let Some(val) = lookup("CONTROL_API_PASSCODE") {
            self.control_api.passcode = val;
        }
    }
}

/// Output and deployment directory layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathsConfig {
    /// Directory receiving hour-bucketed warning text files.
    #[serde(default = "default_warning_output_dir")]
    pub warning_output_dir: PathBuf,

    /// Root of the per-site radar deployment tree.
    #[serde(default = "default_radar_deploy_root")]
    pub radar_deploy_root: PathBuf,

    /// Scratch directory for munger output before deployment.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Root against which relative radar source locators are resolved.
    #[serde(default = "default_scan_archive_root")]
    pub scan_archive_root: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            warning_output_dir: default_warning_output_dir(),
            radar_deploy_root: default_radar_deploy_root(),
            staging_dir: default_staging_dir(),
            scan_archive_root: default_scan_archive_root(),
        }
    }
}

/// Replay log database location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL for the replay log and control state.
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// Timing policy for one replay loop.
///
/// The loop sleeps `clamp(next_arrival - now, min_sleep, max_sleep)`
/// between polling cycles. The floor prevents tight-loop thrashing when
/// events cluster; the optional ceiling bounds wall-clock scheduling
/// drift (used by the radar loop).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Minimum sleep between polling cycles, in seconds.
    #[serde(default = "default_min_sleep_secs")]
    pub min_sleep_secs: u64,

    /// Optional maximum sleep between polling cycles, in seconds.
    #[serde(default)]
    pub max_sleep_secs: Option<u64>,

    /// Wall-clock interval between control-API liveness polls, in seconds.
    #[serde(default = "default_api_check_interval_secs")]
    pub api_check_interval_secs: u64,

    /// First retry delay after a dispatch failure, in seconds.
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,

    /// Ceiling on the per-event retry delay, in seconds.
    #[serde(default = "default_retry_cap_secs")]
    pub retry_cap_secs: u64,
}

impl SchedulerConfig {
    /// Default policy for the radar loop, which carries a sleep ceiling.
    fn radar_default() -> Self {
        Self {
            max_sleep_secs: Some(default_radar_max_sleep_secs()),
            ..Self::default()
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_sleep_secs: default_min_sleep_secs(),
            max_sleep_secs: None,
            api_check_interval_secs: default_api_check_interval_secs(),
            retry_base_secs: default_retry_base_secs(),
            retry_cap_secs: default_retry_cap_secs(),
        }
    }
}

/// Consumed control-plane API endpoint.
///
/// An empty base URL disables remote liveness polling and completion
/// notification; the engine then relies on local control state alone.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlApiConfig {
    /// Base URL of the control API (empty = disabled).
    #[serde(default)]
    pub base_url: String,

    /// Shared admin passcode forwarded as an opaque credential.
    #[serde(default)]
    pub passcode: String,

    /// Request timeout in seconds.
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
}

impl ControlApiConfig {
    /// Whether a control API endpoint is configured at all.
    pub fn enabled(&self) -> bool {
        !self.base_url.is_empty()
    }
}

impl Default for ControlApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            passcode: String::new(),
            timeout_secs: default_api_timeout_secs(),
        }
    }
}

/// External radar munging utility.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MungerConfig {
    /// Path to the munger binary.
    #[serde(default = "default_munger_binary")]
    pub binary: PathBuf,

    /// Seconds before a munge invocation is killed and reported failed.
    #[serde(default = "default_munger_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MungerConfig {
    fn default() -> Self {
        Self {
            binary: default_munger_binary(),
            timeout_secs: default_munger_timeout_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_warning_output_dir() -> PathBuf {
    PathBuf::from("out/warnings")
}

fn default_radar_deploy_root() -> PathBuf {
    PathBuf::from("out/radar")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("out/staging")
}

fn default_scan_archive_root() -> PathBuf {
    PathBuf::from("archive")
}

fn default_database_url() -> String {
    "sqlite://squall.db".to_owned()
}

const fn default_min_sleep_secs() -> u64 {
    2
}

const fn default_radar_max_sleep_secs() -> u64 {
    20
}

const fn default_api_check_interval_secs() -> u64 {
    60
}

const fn default_retry_base_secs() -> u64 {
    5
}

const fn default_retry_cap_secs() -> u64 {
    300
}

const fn default_api_timeout_secs() -> u64 {
    10
}

fn default_munger_binary() -> PathBuf {
    PathBuf::from("munge")
}

const fn default_munger_timeout_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_owned()
}

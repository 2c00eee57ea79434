//! Virtual clock and configuration for the Squall weather replay system.
//!
//! The clock module is the heart of the replay scheduler: it maps archive
//! timestamps to simulated "current" timestamps under a speed factor, and
//! back. The config module defines the typed YAML configuration shared by
//! the engine binary and its subsystems.
//!
//! # Modules
//!
//! - [`clock`] -- `TimingContext`, `SpeedFactor`, and the `STD_FMT` codec
//! - [`config`] -- typed configuration loaded from `squall-config.yaml`

pub mod clock;
pub mod config;

pub use clock::{ClockError, SpeedFactor, TimingContext, format_std, parse_std, STD_FMT};
pub use config::{
    ConfigError, ControlApiConfig, DatabaseConfig, LoggingConfig, MungerConfig, PathsConfig,
    ReplayConfig, SchedulerConfig,
};

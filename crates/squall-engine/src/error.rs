//! Error types for the replay engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and replay execution.

/// Top-level error for the replay engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: squall_core::config::ConfigError,
    },

    /// Clock construction or timestamp parsing failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: squall_core::ClockError,
    },

    /// The replay log database failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying database error.
        #[from]
        source: squall_db::DbError,
    },

    /// A dispatcher could not be constructed.
    #[error("dispatch error: {source}")]
    Dispatch {
        /// The underlying dispatch error.
        #[from]
        source: squall_dispatch::DispatchError,
    },

    /// A replay loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: crate::runner::RunnerError,
    },

    /// The control-plane API client failed.
    #[error("control API error: {source}")]
    Api {
        /// The underlying API error.
        #[from]
        source: crate::control_api::ApiError,
    },

    /// Reading an acquisition file failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An acquisition file did not hold valid event rows.
    #[error("load error: {message}")]
    Load {
        /// Description of the failure.
        message: String,
    },

    /// The command line was malformed.
    #[error("usage: {message}")]
    Usage {
        /// What was expected instead.
        message: String,
    },
}

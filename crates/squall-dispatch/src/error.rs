//! Error types for the release adapters.
//!
//! A [`DispatchError`] is never fatal to the dispatch loop: the event
//! stays pending and is retried on a later cycle. Only the persistence
//! layer can stop a loop.

use squall_core::ClockError;

/// Errors that can occur while releasing an event.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Mapping the event's archive time to current time failed.
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// The timestamp-rewrite pattern failed to compile.
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// The source locator could not be resolved to scan bytes.
    #[error("fetch failed for {locator:?}: {message}")]
    Fetch {
        /// The locator that failed to resolve.
        locator: String,
        /// Description of the failure.
        message: String,
    },

    /// The external munging utility failed or produced unusable output.
    #[error("munge failed: {message}")]
    Munge {
        /// Description of the failure.
        message: String,
    },

    /// The external munging utility exceeded its time bound.
    #[error("munge timed out after {secs}s")]
    MungeTimeout {
        /// The configured bound, in seconds.
        secs: u64,
    },
}

//! Error types for the persistence layer.
//!
//! All errors are propagated via [`DbError`]. A [`DbError`] reaching the
//! dispatch loop is fatal to that loop: a store that cannot answer "what
//! is due" must stop the replay rather than silently desynchronize the
//! delivered-state from reality.

/// Errors that can occur in the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// A `SQLite` migration failed.
    #[error("SQLite migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored row holds a value the schedule cannot be derived from
    /// (unparseable timestamp on the earliest pending event, invalid
    /// control-row contents).
    #[error("stored state invalid: {0}")]
    Corrupt(String),
}

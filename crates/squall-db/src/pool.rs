//! `SQLite` connection pool and embedded migrations.
//!
//! Uses [`sqlx`] with runtime query construction (not compile-time
//! checked) so no database is required at build time. All queries are
//! parameterized.

use std::str::FromStr as _;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::DbError;

/// Default maximum number of connections in the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Default connection acquire timeout in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Configuration for the `SQLite` connection pool.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `SQLite` connection URL, e.g. `sqlite://case.db`.
    pub url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Connection acquire timeout.
    pub connect_timeout: Duration,
}

impl StoreConfig {
    /// Create a new configuration from a database URL.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub const fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Connection pool handle to the replay log database.
///
/// Wraps a [`SqlitePool`] and provides access to the event stores and the
/// control store.
#[derive(Clone)]
pub struct StorePool {
    pool: SqlitePool,
}

impl StorePool {
    /// Connect to `SQLite` using the provided configuration.
    ///
    /// The database file is created if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed and
    /// [`DbError::Sqlite`] if the connection fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self, DbError> {
        let connect_options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::Config(format!("Invalid database URL: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(connect_options)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "Connected to SQLite"
        );

        Ok(Self { pool })
    }

    /// Connect using a database URL string with default pool settings.
    ///
    /// Convenience wrapper around [`StorePool::connect`] with
    /// [`StoreConfig::new`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection fails.
    pub async fn connect_url(url: &str) -> Result<Self, DbError> {
        let config = StoreConfig::new(url);
        Self::connect(&config).await
    }

    /// Connect to a fresh in-memory database.
    ///
    /// The pool is pinned to a single never-expiring connection; an
    /// in-memory `SQLite` database lives and dies with its connection.
    /// Used by the test suites and for dry runs.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the connection fails.
    pub async fn connect_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations from the `migrations/` directory.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if any migration fails.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations completed");
        Ok(())
    }

    /// Return a reference to the underlying [`SqlitePool`].
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections in the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("SQLite pool closed");
    }
}

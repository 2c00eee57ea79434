//! Persisted queue of severe-weather text warnings.
//!
//! The legacy schema keyed warnings by raw text alone; here every row
//! gets an integer surrogate key, and a uniqueness constraint on the raw
//! text keeps bulk loads idempotent. Rows are never deleted -- they are
//! the replay log, reusable across restarts and resets.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use squall_core::clock::{format_std, parse_std};
use squall_types::{EventId, EventKind, NewWarning, WarningEvent};

use crate::error::DbError;
use crate::queue::EventQueue;

/// Operations on the `warnings` table.
pub struct WarningStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> WarningStore<'a> {
    /// Create a warning store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Bulk-insert acquisition output with `delivered = false`.
    ///
    /// Rows whose raw text is already present are ignored, so re-running
    /// acquisition for the same case is harmless. Returns the number of
    /// rows actually inserted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the insert fails.
    pub async fn bulk_insert(&self, rows: &[NewWarning]) -> Result<u64, DbError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted: u64 = 0;
        for row in rows {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO warnings (archive_valid_time, raw_text, delivered)
                 VALUES (?, ?, 0)",
            )
            .bind(format_std(row.archive_valid_time))
            .bind(&row.raw_text)
            .execute(&mut *tx)
            .await?;
            inserted = inserted.saturating_add(result.rows_affected());
        }
        tx.commit().await?;

        tracing::debug!(count = inserted, total = rows.len(), "Inserted warnings");
        Ok(inserted)
    }

    /// Number of non-delivered warnings.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn pending_count(&self) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM warnings WHERE delivered = 0")
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// Number of delivered warnings.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn delivered_count(&self) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM warnings WHERE delivered = 1")
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// Flip every warning back to non-delivered.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the update fails.
    pub async fn reset_delivered(&self) -> Result<(), DbError> {
        sqlx::query("UPDATE warnings SET delivered = 0")
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

/// A raw row from the `warnings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct WarningRow {
    id: i64,
    archive_valid_time: String,
    raw_text: String,
    delivered: bool,
}

impl WarningRow {
    /// Parse the stored timestamp into a typed event.
    fn into_event(self) -> Result<WarningEvent, DbError> {
        let archive_valid_time = parse_std(&self.archive_valid_time).map_err(|e| {
            DbError::Corrupt(format!("warning {} archive time: {e}", self.id))
        })?;
        Ok(WarningEvent {
            id: EventId::from(self.id),
            archive_valid_time,
            raw_text: self.raw_text,
            delivered: self.delivered,
        })
    }
}

impl EventQueue for WarningStore<'_> {
    type Item = WarningEvent;

    fn kind(&self) -> EventKind {
        EventKind::Warning
    }

    async fn due(&self, archive_now: DateTime<Utc>) -> Result<Vec<WarningEvent>, DbError> {
        let rows = sqlx::query_as::<_, WarningRow>(
            "SELECT id, archive_valid_time, raw_text, delivered
             FROM warnings
             WHERE delivered = 0 AND archive_valid_time <= ?
             ORDER BY archive_valid_time, id",
        )
        .bind(format_std(archive_now))
        .fetch_all(self.pool)
        .await?;

        // A single malformed archived item must not abort the batch.
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_event() {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(error = %e, "Skipping undispatchable warning row"),
            }
        }
        Ok(events)
    }

    async fn next_pending(&self) -> Result<Option<WarningEvent>, DbError> {
        let row = sqlx::query_as::<_, WarningRow>(
            "SELECT id, archive_valid_time, raw_text, delivered
             FROM warnings
             WHERE delivered = 0
             ORDER BY archive_valid_time, id
             LIMIT 1",
        )
        .fetch_optional(self.pool)
        .await?;

        // A corrupt earliest-pending row corrupts the sleep computation,
        // which is fatal rather than skippable.
        row.map(WarningRow::into_event).transpose()
    }

    async fn mark_delivered(&self, id: EventId) -> Result<(), DbError> {
        sqlx::query("UPDATE warnings SET delivered = 1 WHERE id = ?")
            .bind(id.into_inner())
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

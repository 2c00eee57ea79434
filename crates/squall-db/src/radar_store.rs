//! Persisted queue of radar volume scan references.
//!
//! Scan bytes live wherever the acquisition collaborator staged them;
//! the store only tracks `(archive_time, site, locator)` plus the
//! delivered flag. Uniqueness over that triple keeps bulk loads
//! idempotent.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use squall_core::clock::{format_std, parse_std};
use squall_types::{EventId, EventKind, NewRadarScan, RadarScanEvent, SiteId};

use crate::error::DbError;
use crate::queue::EventQueue;

/// Operations on the `radar_scans` table.
pub struct RadarStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RadarStore<'a> {
    /// Create a radar store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Bulk-insert acquisition output with `delivered = false`.
    ///
    /// Duplicate `(site, archive_time, locator)` rows are ignored.
    /// Returns the number of rows actually inserted.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the insert fails.
    pub async fn bulk_insert(&self, rows: &[NewRadarScan]) -> Result<u64, DbError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted: u64 = 0;
        for row in rows {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO radar_scans
                     (archive_time, site_id, source_locator, delivered)
                 VALUES (?, ?, ?, 0)",
            )
            .bind(format_std(row.archive_time))
            .bind(row.site_id.as_str())
            .bind(&row.source_locator)
            .execute(&mut *tx)
            .await?;
            inserted = inserted.saturating_add(result.rows_affected());
        }
        tx.commit().await?;

        tracing::debug!(count = inserted, total = rows.len(), "Inserted radar scans");
        Ok(inserted)
    }

    /// Number of non-delivered scans.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn pending_count(&self) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM radar_scans WHERE delivered = 0")
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// Number of delivered scans.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn delivered_count(&self) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM radar_scans WHERE delivered = 1")
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// Flip every scan back to non-delivered.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the update fails.
    pub async fn reset_delivered(&self) -> Result<(), DbError> {
        sqlx::query("UPDATE radar_scans SET delivered = 0")
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

/// A raw row from the `radar_scans` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct RadarRow {
    id: i64,
    archive_time: String,
    site_id: String,
    source_locator: String,
    delivered: bool,
}

impl RadarRow {
    /// Parse the stored timestamp and site into a typed event.
    fn into_event(self) -> Result<RadarScanEvent, DbError> {
        let archive_time = parse_std(&self.archive_time)
            .map_err(|e| DbError::Corrupt(format!("radar scan {} archive time: {e}", self.id)))?;
        let site_id = SiteId::new(&self.site_id)
            .map_err(|e| DbError::Corrupt(format!("radar scan {} site: {e}", self.id)))?;
        Ok(RadarScanEvent {
            id: EventId::from(self.id),
            archive_time,
            site_id,
            source_locator: self.source_locator,
            delivered: self.delivered,
        })
    }
}

impl EventQueue for RadarStore<'_> {
    type Item = RadarScanEvent;

    fn kind(&self) -> EventKind {
        EventKind::RadarScan
    }

    async fn due(&self, archive_now: DateTime<Utc>) -> Result<Vec<RadarScanEvent>, DbError> {
        let rows = sqlx::query_as::<_, RadarRow>(
            "SELECT id, archive_time, site_id, source_locator, delivered
             FROM radar_scans
             WHERE delivered = 0 AND archive_time <= ?
             ORDER BY archive_time, id",
        )
        .bind(format_std(archive_now))
        .fetch_all(self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_event() {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(error = %e, "Skipping undispatchable radar row"),
            }
        }
        Ok(events)
    }

    async fn next_pending(&self) -> Result<Option<RadarScanEvent>, DbError> {
        let row = sqlx::query_as::<_, RadarRow>(
            "SELECT id, archive_time, site_id, source_locator, delivered
             FROM radar_scans
             WHERE delivered = 0
             ORDER BY archive_time, id
             LIMIT 1",
        )
        .fetch_optional(self.pool)
        .await?;

        row.map(RadarRow::into_event).transpose()
    }

    async fn mark_delivered(&self, id: EventId) -> Result<(), DbError> {
        sqlx::query("UPDATE radar_scans SET delivered = 1 WHERE id = ?")
            .bind(id.into_inner())
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use chrono::{Duration, TimeZone as _};

    use super::*;
    use crate::pool::StorePool;

    async fn setup() -> StorePool {
        let pool = StorePool::connect_memory().await.expect("in-memory pool");
        pool.run_migrations().await.expect("migrations");
        pool
    }

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap()
    }

    fn scan_at(site: &str, offset_secs: i64) -> NewRadarScan {
        NewRadarScan {
            archive_time: epoch() + Duration::seconds(offset_secs),
            site_id: SiteId::new(site).unwrap(),
            source_locator: format!("archive/{site}/{offset_secs}"),
        }
    }

    #[tokio::test]
    async fn due_orders_by_archive_time_then_insertion() {
        let pool = setup().await;
        let store = RadarStore::new(pool.pool());
        // Two sites at the same archive instant: insertion order breaks the tie.
        store
            .bulk_insert(&[scan_at("KTLX", 60), scan_at("KFWS", 60), scan_at("KTLX", 30)])
            .await
            .unwrap();

        let due = store.due(epoch() + Duration::seconds(120)).await.unwrap();
        let sites: Vec<&str> = due.iter().map(|s| s.site_id.as_str()).collect();
        assert_eq!(sites, vec!["KTLX", "KTLX", "KFWS"]);
    }

    #[tokio::test]
    async fn due_excludes_future_scans() {
        let pool = setup().await;
        let store = RadarStore::new(pool.pool());
        store
            .bulk_insert(&[scan_at("KTLX", 10), scan_at("KTLX", 600)])
            .await
            .unwrap();

        let due = store.due(epoch() + Duration::seconds(60)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!((due[0].archive_time - epoch()).num_seconds(), 10);
    }

    #[tokio::test]
    async fn bulk_insert_ignores_duplicate_triples() {
        let pool = setup().await;
        let store = RadarStore::new(pool.pool());
        let rows = vec![scan_at("KTLX", 10)];
        assert_eq!(store.bulk_insert(&rows).await.unwrap(), 1);
        assert_eq!(store.bulk_insert(&rows).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn due_skips_rows_with_invalid_stored_values() {
        let pool = setup().await;
        let store = RadarStore::new(pool.pool());
        store.bulk_insert(&[scan_at("KTLX", 10)]).await.unwrap();
        // Due by time, but the stored site identifier does not validate.
        sqlx::query(
            "INSERT INTO radar_scans (archive_time, site_id, source_locator, delivered)
             VALUES ('2020-06-01 00:00:05', '../etc', 'archive/bad/5', 0)",
        )
        .execute(pool.pool())
        .await
        .unwrap();

        let due = store.due(epoch() + Duration::seconds(60)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due.first().unwrap().site_id.as_str(), "KTLX");
    }

    #[tokio::test]
    async fn delivered_scans_stay_in_the_log() {
        let pool = setup().await;
        let store = RadarStore::new(pool.pool());
        store.bulk_insert(&[scan_at("KTLX", 10)]).await.unwrap();
        let id = store.next_pending().await.unwrap().unwrap().id;
        store.mark_delivered(id).await.unwrap();

        // Row is not deleted, only flipped.
        assert_eq!(store.pending_count().await.unwrap(), 0);
        assert_eq!(store.delivered_count().await.unwrap(), 1);

        store.reset_delivered().await.unwrap();
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }
}

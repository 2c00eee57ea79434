//! Persisted simulation lifecycle state.
//!
//! A single `control` row holds the running flag and the timing
//! parameters of the active simulation. The dispatch loop re-reads this
//! row at the top of every polling cycle (a fresh query, never a captured
//! snapshot), so an external stop is observed within one interval.
//!
//! Timing columns are written once by the start action and are read-only
//! to the loop; `reset` clears them and flips every event in both stores
//! back to non-delivered so a case can be re-run from scratch.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use squall_core::clock::{SpeedFactor, TimingContext, format_std, parse_std};

use crate::error::DbError;

/// Parameters written by the external start action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartParams {
    /// Archive instant the case starts at.
    pub archive_epoch: DateTime<Utc>,
    /// Wall-clock instant the simulation starts at.
    pub current_epoch: DateTime<Utc>,
    /// Replay speed factor.
    pub speed: SpeedFactor,
    /// Optional archive instant past which the case is complete.
    pub archive_end: Option<DateTime<Utc>>,
}

/// The decoded control row of a configured simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    /// Whether the simulation is currently running.
    pub running: bool,
    /// The timing context shared by both replay loops.
    pub timings: TimingContext,
    /// Optional archive end bound; when the archive clock passes it the
    /// replay is complete regardless of remaining pending events.
    pub archive_end: Option<DateTime<Utc>>,
}

/// Operations on the singleton `control` row.
pub struct ControlStore<'a> {
    pool: &'a SqlitePool,
}

/// A raw control row.
#[derive(Debug, sqlx::FromRow)]
struct ControlRow {
    running: bool,
    archive_epoch: Option<String>,
    current_epoch: Option<String>,
    speed_factor: Option<f64>,
    archive_end: Option<String>,
}

impl ControlRow {
    /// Decode the timing columns, if present.
    fn into_state(self) -> Result<Option<ControlState>, DbError> {
        let (Some(arc), Some(cur), Some(speed)) =
            (self.archive_epoch, self.current_epoch, self.speed_factor)
        else {
            return Ok(None);
        };

        let archive_epoch = parse_std(&arc)
            .map_err(|e| DbError::Corrupt(format!("control archive epoch: {e}")))?;
        let current_epoch = parse_std(&cur)
            .map_err(|e| DbError::Corrupt(format!("control current epoch: {e}")))?;
        let speed = SpeedFactor::new(speed)
            .map_err(|e| DbError::Corrupt(format!("control speed factor: {e}")))?;
        let archive_end = self
            .archive_end
            .as_deref()
            .map(parse_std)
            .transpose()
            .map_err(|e| DbError::Corrupt(format!("control archive end: {e}")))?;

        Ok(Some(ControlState {
            running: self.running,
            timings: TimingContext::new(archive_epoch, current_epoch, speed),
            archive_end,
        }))
    }
}

impl<'a> ControlStore<'a> {
    /// Create a control store bound to a connection pool.
    pub const fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether the simulation is currently flagged running.
    ///
    /// An absent or unconfigured control row reads as not running.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the query fails.
    pub async fn is_running(&self) -> Result<bool, DbError> {
        let row: Option<(bool,)> = sqlx::query_as("SELECT running FROM control WHERE id = 1")
            .fetch_optional(self.pool)
            .await?;
        Ok(row.is_some_and(|(running,)| running))
    }

    /// The full control state, or `None` when no start action has
    /// configured timing parameters yet.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Corrupt`] if the row holds unusable values;
    /// timing state the loop cannot trust is fatal, not skippable.
    pub async fn state(&self) -> Result<Option<ControlState>, DbError> {
        let row = sqlx::query_as::<_, ControlRow>(
            "SELECT running, archive_epoch, current_epoch, speed_factor, archive_end
             FROM control WHERE id = 1",
        )
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => row.into_state(),
            None => Ok(None),
        }
    }

    /// Write timing parameters and flip the running flag on.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the update fails.
    pub async fn start(&self, params: StartParams) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE control
             SET running = 1,
                 archive_epoch = ?,
                 current_epoch = ?,
                 speed_factor = ?,
                 archive_end = ?
             WHERE id = 1",
        )
        .bind(format_std(params.archive_epoch))
        .bind(format_std(params.current_epoch))
        .bind(params.speed.get())
        .bind(params.archive_end.map(format_std))
        .execute(self.pool)
        .await?;

        tracing::info!(
            archive_epoch = %format_std(params.archive_epoch),
            speed = %params.speed,
            "Simulation started"
        );
        Ok(())
    }

    /// Clear the running flag; timing parameters are retained.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if the update fails.
    pub async fn stop(&self) -> Result<(), DbError> {
        sqlx::query("UPDATE control SET running = 0 WHERE id = 1")
            .execute(self.pool)
            .await?;
        tracing::info!("Simulation stopped");
        Ok(())
    }

    /// Clear timing parameters and flip every event in both stores back
    /// to non-delivered, so the case can be re-run from scratch.
    ///
    /// Idempotent: a second reset leaves the same state as the first.
    /// Destructive; callers confirm at the CLI boundary, not here.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Sqlite`] if any update fails.
    pub async fn reset(&self) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE control
             SET running = 0,
                 archive_epoch = NULL,
                 current_epoch = NULL,
                 speed_factor = NULL,
                 archive_end = NULL
             WHERE id = 1",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE warnings SET delivered = 0")
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE radar_scans SET delivered = 0")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Simulation reset");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::{Duration, TimeZone as _};
    use squall_types::NewWarning;

    use super::*;
    use crate::pool::StorePool;
    use crate::queue::EventQueue as _;
    use crate::warning_store::WarningStore;

    async fn setup() -> StorePool {
        let pool = StorePool::connect_memory().await.expect("in-memory pool");
        pool.run_migrations().await.expect("migrations");
        pool
    }

    fn params() -> StartParams {
        StartParams {
            archive_epoch: Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap(),
            current_epoch: Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap(),
            speed: SpeedFactor::new(60.0).unwrap(),
            archive_end: Some(Utc.with_ymd_and_hms(2020, 6, 1, 6, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn fresh_database_is_not_running_and_unconfigured() {
        let pool = setup().await;
        let control = ControlStore::new(pool.pool());
        assert!(!control.is_running().await.unwrap());
        assert!(control.state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn start_writes_timings_and_running_flag() {
        let pool = setup().await;
        let control = ControlStore::new(pool.pool());
        control.start(params()).await.unwrap();

        assert!(control.is_running().await.unwrap());
        let state = control.state().await.unwrap().unwrap();
        assert!(state.running);
        assert_eq!(state.timings.archive_epoch, params().archive_epoch);
        assert_eq!(state.archive_end, params().archive_end);
    }

    #[tokio::test]
    async fn stop_keeps_timings() {
        let pool = setup().await;
        let control = ControlStore::new(pool.pool());
        control.start(params()).await.unwrap();
        control.stop().await.unwrap();

        assert!(!control.is_running().await.unwrap());
        let state = control.state().await.unwrap().unwrap();
        assert!(!state.running);
        assert!((state.timings.speed.get() - 60.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn reset_is_idempotent_and_undelivers_events() {
        let pool = setup().await;
        let control = ControlStore::new(pool.pool());
        let warnings = WarningStore::new(pool.pool());

        control.start(params()).await.unwrap();
        warnings
            .bulk_insert(&[NewWarning {
                archive_valid_time: params().archive_epoch + Duration::seconds(10),
                raw_text: String::from("SEVERE THUNDERSTORM WARNING"),
            }])
            .await
            .unwrap();
        let id = warnings.next_pending().await.unwrap().unwrap().id;
        warnings.mark_delivered(id).await.unwrap();

        control.reset().await.unwrap();
        control.reset().await.unwrap();

        assert!(!control.is_running().await.unwrap());
        assert!(control.state().await.unwrap().is_none());
        assert_eq!(warnings.pending_count().await.unwrap(), 1);
        assert_eq!(warnings.delivered_count().await.unwrap(), 0);
    }
}

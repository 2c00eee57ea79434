//! The [`EventQueue`] seam between the dispatch loop and the stores.
//!
//! The dispatch loop never names a concrete store; it is generic over
//! this trait, which both [`WarningStore`] and [`RadarStore`] implement.
//! Tests drive the loop with an in-memory implementation.
//!
//! [`WarningStore`]: crate::warning_store::WarningStore
//! [`RadarStore`]: crate::radar_store::RadarStore

use chrono::{DateTime, Utc};
use squall_types::{EventId, EventKind, ReplayItem};

use crate::error::DbError;

/// A persisted, idempotent queue of timestamped replay events.
#[allow(async_fn_in_trait)]
pub trait EventQueue {
    /// The event type this queue yields.
    type Item: ReplayItem + Send;

    /// The event kind, for log labeling.
    fn kind(&self) -> EventKind;

    /// All non-delivered events with archive time at or before
    /// `archive_now`, ascending by archive time then insertion order.
    ///
    /// Read-only and safe to call repeatedly; an overdue-and-undelivered
    /// event is indistinguishable from a due one, which is what makes
    /// retry-by-re-offer work.
    async fn due(&self, archive_now: DateTime<Utc>) -> Result<Vec<Self::Item>, DbError>;

    /// The earliest non-delivered event regardless of the archive clock,
    /// used to compute the next sleep. `None` means the queue is
    /// exhausted, the loop's terminal drain signal.
    async fn next_pending(&self) -> Result<Option<Self::Item>, DbError>;

    /// Flip an event to delivered. Idempotent: marking an
    /// already-delivered event is a no-op, not an error.
    async fn mark_delivered(&self, id: EventId) -> Result<(), DbError>;
}

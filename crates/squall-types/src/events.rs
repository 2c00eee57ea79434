//! Replay event types for the two archived event kinds.
//!
//! A replay case consists of severe-weather text warnings and radar volume
//! scans, each stamped with the archive time at which it originally
//! occurred. The dispatch loop never looks inside an event's payload; it
//! only needs the surrogate key and the archive time, which the
//! [`ReplayItem`] trait exposes for both kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, SiteId};

/// The two archived event kinds Squall replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Severe-weather text warning.
    Warning,
    /// Radar volume scan.
    RadarScan,
}

impl EventKind {
    /// Short lowercase label used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::RadarScan => "radar",
        }
    }
}

/// The dispatch loop's view of a stored event.
///
/// Both event kinds implement this; the loop schedules and logs through it
/// without knowing which store produced the item.
pub trait ReplayItem {
    /// Surrogate key assigned by the event store.
    fn id(&self) -> EventId;

    /// Archive time at which the event originally occurred.
    fn archive_time(&self) -> DateTime<Utc>;

    /// One-line description for log output.
    fn describe(&self) -> String;
}

/// A stored severe-weather text warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningEvent {
    /// Surrogate key assigned by the warning store.
    pub id: EventId,
    /// Archive time at which the warning became valid.
    pub archive_valid_time: DateTime<Utc>,
    /// Full archived warning text, timestamps unmodified.
    pub raw_text: String,
    /// Whether this warning has been released already.
    pub delivered: bool,
}

impl ReplayItem for WarningEvent {
    fn id(&self) -> EventId {
        self.id
    }

    fn archive_time(&self) -> DateTime<Utc> {
        self.archive_valid_time
    }

    fn describe(&self) -> String {
        format!(
            "warning {} valid {}",
            self.id,
            self.archive_valid_time.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// A stored radar volume scan reference.
///
/// The scan bytes themselves are not stored; `source_locator` names where
/// the acquisition collaborator staged them (a local path, or a locator it
/// knows how to resolve).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadarScanEvent {
    /// Surrogate key assigned by the radar store.
    pub id: EventId,
    /// Archive time of the volume scan.
    pub archive_time: DateTime<Utc>,
    /// Radar site that produced the scan.
    pub site_id: SiteId,
    /// Locator resolvable by the scan fetcher.
    pub source_locator: String,
    /// Whether this scan has been deployed already.
    pub delivered: bool,
}

impl ReplayItem for RadarScanEvent {
    fn id(&self) -> EventId {
        self.id
    }

    fn archive_time(&self) -> DateTime<Utc> {
        self.archive_time
    }

    fn describe(&self) -> String {
        format!(
            "radar scan {} site {} at {}",
            self.id,
            self.site_id,
            self.archive_time.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

/// Acquisition output row for a warning, prior to insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWarning {
    /// Archive time at which the warning became valid.
    pub archive_valid_time: DateTime<Utc>,
    /// Full archived warning text.
    pub raw_text: String,
}

/// Acquisition output row for a radar scan, prior to insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRadarScan {
    /// Archive time of the volume scan.
    pub archive_time: DateTime<Utc>,
    /// Radar site that produced the scan.
    pub site_id: SiteId,
    /// Locator resolvable by the scan fetcher.
    pub source_locator: String,
}

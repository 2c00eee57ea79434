//! Shared type definitions for the Squall weather replay system.
//!
//! This crate is the single source of truth for the event types that flow
//! between the event stores, the dispatch loop, and the dispatchers.
//!
//! # Modules
//!
//! - [`ids`] -- Surrogate event keys and validated radar site identifiers
//! - [`events`] -- Warning and radar scan events, plus the [`ReplayItem`]
//!   capability the dispatch loop is written against

pub mod events;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use events::{EventKind, NewRadarScan, NewWarning, RadarScanEvent, ReplayItem, WarningEvent};
pub use ids::{EventId, SiteId, SiteIdError};

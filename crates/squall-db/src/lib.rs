//! Persistence layer for the Squall weather replay system.
//!
//! `SQLite` holds the replay log (two event tables, one per event kind)
//! and the singleton simulation control row. A replay case is a single
//! operator-owned database file with one writer, so no locking is needed
//! beyond `SQLite`'s own journal; delivered-status flips are single-row
//! atomic updates.
//!
//! # Modules
//!
//! - [`pool`] -- connection pool and embedded migrations
//! - [`queue`] -- the [`EventQueue`] seam the dispatch loop is generic over
//! - [`warning_store`] -- persisted queue of text warnings
//! - [`radar_store`] -- persisted queue of radar volume scans
//! - [`control_store`] -- simulation lifecycle flags and timing parameters
//! - [`error`] -- shared error types

pub mod control_store;
pub mod error;
pub mod pool;
pub mod queue;
pub mod radar_store;
pub mod warning_store;

// Re-export primary types for convenience.
pub use control_store::{ControlState, ControlStore, StartParams};
pub use error::DbError;
pub use pool::{StoreConfig, StorePool};
pub use queue::EventQueue;
pub use radar_store::RadarStore;
pub use warning_store::WarningStore;

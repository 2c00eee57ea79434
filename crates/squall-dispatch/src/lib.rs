//! Release adapters for the Squall weather replay system.
//!
//! A dispatcher performs the kind-specific side effect that "releases" a
//! due event into the simulated present: appending rewritten warning text
//! to an hour-bucketed file, or deploying a munged radar scan into the
//! per-site tree. The dispatch loop only sees the [`Dispatcher`]
//! capability and a success/failure result; a failed event stays pending
//! and is re-offered on a later cycle.
//!
//! # Modules
//!
//! - [`warning`] -- timestamp rewriting and hour-bucketed file append
//! - [`radar`] -- fetch, munge, deploy, and manifest regeneration
//! - [`munge`] -- the external munging utility capability and its stub
//! - [`manifest`] -- `dir.list` manifest writer
//! - [`error`] -- shared error types

pub mod error;
pub mod manifest;
pub mod munge;
pub mod radar;
pub mod warning;

use squall_core::TimingContext;

pub use error::DispatchError;
pub use munge::{ExternalMunger, Munger, StubMunger};
pub use radar::{LocalScanFetcher, RadarDispatcher, ScanFetcher};
pub use warning::WarningDispatcher;

/// The release capability for one event kind.
///
/// Implementations must tolerate redelivery: a crash between the side
/// effect and the store's delivered-flip means the same event can arrive
/// again, and the safer failure mode is a repeated (idempotent) release,
/// not a lost one.
#[allow(async_fn_in_trait)]
pub trait Dispatcher<E> {
    /// Perform the release side effect for one event.
    async fn deliver(&self, event: &E, ctx: &TimingContext) -> Result<(), DispatchError>;
}

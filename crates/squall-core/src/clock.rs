//! Virtual clock mapping between archive time and simulated current time.
//!
//! A replay run is parameterized by a [`TimingContext`]: the archive epoch
//! (when the historical case starts), the current epoch (the wall-clock
//! instant the simulation was started), and a [`SpeedFactor`]. Archive time
//! and current time are exact inverses of each other under the mapping:
//!
//! ```text
//! current = current_epoch + (archive - archive_epoch) / speed
//! archive = archive_epoch + (current - current_epoch) * speed
//! ```
//!
//! # Design Principles
//!
//! - Both epochs are fixed at simulation start and never change while
//!   running; the context is read-only to the dispatch loop.
//! - Scaling happens at microsecond precision so that second-granular
//!   archive timestamps survive a round trip for any realistic speed
//!   factor. Rounding to whole seconds mid-mapping would not.
//! - Malformed timestamps fail with [`ClockError::InvalidTimestamp`]
//!   rather than producing a silently wrong time.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed serialization format for all stored and exchanged timestamps.
///
/// UTC, no offset suffix, zero-padded and fixed-width, so lexicographic
/// comparison of two formatted values agrees with chronological order.
pub const STD_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// A timestamp string did not match [`STD_FMT`].
    #[error("invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        /// The rejected input.
        value: String,
        /// The underlying parse error.
        #[source]
        source: chrono::format::ParseError,
    },

    /// A speed factor was zero, negative, or not finite.
    #[error("invalid speed factor {value}: must be positive and finite")]
    InvalidSpeedFactor {
        /// The rejected value.
        value: f64,
    },

    /// An elapsed span was too large to scale at microsecond precision.
    #[error("time span too large to map between clock domains")]
    SpanOverflow,
}

/// Parse a [`STD_FMT`] timestamp string into a UTC instant.
///
/// # Errors
///
/// Returns [`ClockError::InvalidTimestamp`] if the string does not match
/// the fixed format.
pub fn parse_std(value: &str) -> Result<DateTime<Utc>, ClockError> {
    NaiveDateTime::parse_from_str(value, STD_FMT)
        .map(|naive| naive.and_utc())
        .map_err(|source| ClockError::InvalidTimestamp {
            value: value.to_owned(),
            source,
        })
}

/// Format a UTC instant as a [`STD_FMT`] string.
///
/// Sub-second precision is dropped; the format is second-granular by
/// definition.
pub fn format_std(t: DateTime<Utc>) -> String {
    t.format(STD_FMT).to_string()
}

/// Ratio of archive-time elapsed to current-time elapsed.
///
/// A factor of 60 replays one archive hour per current minute; a factor of
/// 0.5 replays at half speed. Always positive and finite by construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SpeedFactor(f64);

impl SpeedFactor {
    /// Validate and wrap a speed factor.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidSpeedFactor`] for zero, negative, NaN,
    /// or infinite values.
    pub fn new(value: f64) -> Result<Self, ClockError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ClockError::InvalidSpeedFactor { value });
        }
        Ok(Self(value))
    }

    /// Return the inner ratio.
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl core::fmt::Display for SpeedFactor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<f64> for SpeedFactor {
    type Error = ClockError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SpeedFactor> for f64 {
    fn from(speed: SpeedFactor) -> Self {
        speed.0
    }
}

/// The timing parameters of one simulation run.
///
/// Created by the external start action, cleared by reset, and read-only
/// to the dispatch loop. Both replay loops (warnings, radar) share one
/// context; neither mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingContext {
    /// Archive instant the historical case starts at.
    pub archive_epoch: DateTime<Utc>,
    /// Wall-clock instant the simulation was started at.
    pub current_epoch: DateTime<Utc>,
    /// Replay speed factor.
    pub speed: SpeedFactor,
}

impl TimingContext {
    /// Assemble a timing context from its parts.
    pub const fn new(
        archive_epoch: DateTime<Utc>,
        current_epoch: DateTime<Utc>,
        speed: SpeedFactor,
    ) -> Self {
        Self {
            archive_epoch,
            current_epoch,
            speed,
        }
    }

    /// Map an archive instant to its simulated current instant.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::SpanOverflow`] if the elapsed span cannot be
    /// represented at microsecond precision.
    #[allow(clippy::cast_precision_loss)]
    pub fn current_from_archive(&self, t_arc: DateTime<Utc>) -> Result<DateTime<Utc>, ClockError> {
        let micros = span_micros(t_arc, self.archive_epoch)?;
        // Dividing by the factor shrinks the span; precision loss is
        // bounded well below one second for any practical factor.
        let scaled = micros as f64 / self.speed.get();
        Ok(self.current_epoch + micros_duration(scaled)?)
    }

    /// Map a simulated current instant back to its archive instant.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::SpanOverflow`] if the elapsed span cannot be
    /// represented at microsecond precision.
    #[allow(clippy::cast_precision_loss)]
    pub fn archive_from_current(&self, t_cur: DateTime<Utc>) -> Result<DateTime<Utc>, ClockError> {
        let micros = span_micros(t_cur, self.current_epoch)?;
        let scaled = micros as f64 * self.speed.get();
        Ok(self.archive_epoch + micros_duration(scaled)?)
    }
}

/// Elapsed microseconds between an instant and an epoch.
fn span_micros(t: DateTime<Utc>, epoch: DateTime<Utc>) -> Result<i64, ClockError> {
    t.signed_duration_since(epoch)
        .num_microseconds()
        .ok_or(ClockError::SpanOverflow)
}

/// Convert a scaled microsecond count back into a signed duration.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn micros_duration(scaled: f64) -> Result<Duration, ClockError> {
    if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
        return Err(ClockError::SpanOverflow);
    }
    // In-range by the check above.
    Ok(Duration::microseconds(scaled.round() as i64))
}

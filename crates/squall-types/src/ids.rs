//! Identifier types for replay events and radar sites.
//!
//! The legacy archive schema identified warnings by their raw text and
//! radar scans by a site/time pair. Squall assigns every stored event a
//! stable integer surrogate key instead; [`EventId`] wraps that key so the
//! two cannot be mixed up with other integers at compile time.

use serde::{Deserialize, Serialize};

/// Errors produced when validating a radar site identifier.
#[derive(Debug, thiserror::Error)]
pub enum SiteIdError {
    /// The identifier was empty.
    #[error("radar site identifier is empty")]
    Empty,

    /// The identifier contained a character outside `A-Z0-9`.
    #[error("radar site identifier {value:?} contains invalid characters")]
    InvalidCharacter {
        /// The rejected identifier.
        value: String,
    },
}

/// Surrogate key for a stored replay event.
///
/// Assigned by the event store on insert (the underlying table's integer
/// primary key). Stable for the lifetime of the replay log, including
/// across process restarts and resets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EventId(pub i64);

impl EventId {
    /// Return the inner integer key.
    pub const fn into_inner(self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<EventId> for i64 {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// Validated radar site identifier (e.g. `KTLX`, `KFWS`).
///
/// Site identifiers name the per-site deployment directory, so they are
/// restricted to uppercase ASCII alphanumerics. Lowercase input is
/// accepted and normalized on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteId(String);

impl SiteId {
    /// Validate and normalize a site identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SiteIdError::Empty`] for an empty string and
    /// [`SiteIdError::InvalidCharacter`] for anything outside ASCII
    /// alphanumerics.
    pub fn new(value: &str) -> Result<Self, SiteIdError> {
        if value.is_empty() {
            return Err(SiteIdError::Empty);
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SiteIdError::InvalidCharacter {
                value: value.to_owned(),
            });
        }
        Ok(Self(value.to_ascii_uppercase()))
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SiteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SiteId {
    type Error = SiteIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<SiteId> for String {
    fn from(id: SiteId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn site_id_normalizes_to_uppercase() {
        let site = SiteId::new("ktlx").unwrap();
        assert_eq!(site.as_str(), "KTLX");
    }

    #[test]
    fn site_id_rejects_empty() {
        assert!(SiteId::new("").is_err());
    }

    #[test]
    fn site_id_rejects_path_characters() {
        assert!(SiteId::new("../etc").is_err());
        assert!(SiteId::new("KTLX/scan").is_err());
    }

    #[test]
    fn event_id_display_matches_inner() {
        let id = EventId::from(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn site_id_serde_roundtrip() {
        let site = SiteId::new("kfws").unwrap();
        let json = serde_json::to_string(&site).unwrap();
        assert_eq!(json, "\"KFWS\"");
        let back: SiteId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, site);
    }
}

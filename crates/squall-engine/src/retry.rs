//! Per-event retry backoff for failed dispatch attempts.
//!
//! A failed event stays pending in the store and is re-offered on every
//! polling cycle, so without a backoff the loop would hammer a
//! persistently failing event once per cycle. The tracker holds a capped
//! exponential delay per event id; an event inside its window is skipped,
//! everything else in the burst proceeds normally.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use squall_types::EventId;

/// One event's failure history.
#[derive(Debug, Clone, Copy)]
struct Entry {
    attempts: u32,
    eligible_at: DateTime<Utc>,
}

/// Capped exponential backoff state, keyed by event id.
#[derive(Debug)]
pub struct RetryTracker {
    base: Duration,
    cap: Duration,
    entries: HashMap<EventId, Entry>,
}

impl RetryTracker {
    /// Create a tracker with the given first-retry delay and ceiling.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            entries: HashMap::new(),
        }
    }

    /// Whether the event is outside its backoff window at `now`.
    ///
    /// Events with no recorded failure are always eligible.
    pub fn is_eligible(&self, id: EventId, now: DateTime<Utc>) -> bool {
        self.entries
            .get(&id)
            .is_none_or(|entry| now >= entry.eligible_at)
    }

    /// Record a failed attempt and return the running attempt count.
    ///
    /// The delay doubles per failure, capped at the configured ceiling:
    /// base, 2x base, 4x base, and so on.
    pub fn record_failure(&mut self, id: EventId, now: DateTime<Utc>) -> u32 {
        let attempts = self
            .entries
            .get(&id)
            .map_or(1, |entry| entry.attempts.saturating_add(1));
        let factor = 2_u32.saturating_pow(attempts.saturating_sub(1).min(31));
        let delay = self.base.saturating_mul(factor).min(self.cap);
        let eligible_at = TimeDelta::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.entries.insert(
            id,
            Entry {
                attempts,
                eligible_at,
            },
        );
        attempts
    }

    /// Drop the event's failure history after a successful dispatch.
    pub fn clear(&mut self, id: EventId) {
        self.entries.remove(&id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap()
    }

    fn tracker() -> RetryTracker {
        RetryTracker::new(Duration::from_secs(5), Duration::from_secs(300))
    }

    #[test]
    fn unknown_event_is_eligible() {
        assert!(tracker().is_eligible(EventId::from(1), now()));
    }

    #[test]
    fn first_failure_applies_the_base_delay() {
        let mut retries = tracker();
        let id = EventId::from(1);
        assert_eq!(retries.record_failure(id, now()), 1);

        assert!(!retries.is_eligible(id, now()));
        assert!(!retries.is_eligible(id, now() + TimeDelta::seconds(4)));
        assert!(retries.is_eligible(id, now() + TimeDelta::seconds(5)));
    }

    #[test]
    fn delay_doubles_per_failure() {
        let mut retries = tracker();
        let id = EventId::from(1);
        retries.record_failure(id, now());
        assert_eq!(retries.record_failure(id, now()), 2);

        // Second failure: 10s window.
        assert!(!retries.is_eligible(id, now() + TimeDelta::seconds(9)));
        assert!(retries.is_eligible(id, now() + TimeDelta::seconds(10)));
    }

    #[test]
    fn delay_is_capped() {
        let mut retries = tracker();
        let id = EventId::from(1);
        for _ in 0..20 {
            retries.record_failure(id, now());
        }

        assert!(retries.is_eligible(id, now() + TimeDelta::seconds(300)));
        assert!(!retries.is_eligible(id, now() + TimeDelta::seconds(299)));
    }

    #[test]
    fn clear_restores_eligibility_and_resets_the_count() {
        let mut retries = tracker();
        let id = EventId::from(1);
        retries.record_failure(id, now());
        retries.record_failure(id, now());
        retries.clear(id);

        assert!(retries.is_eligible(id, now()));
        assert_eq!(retries.record_failure(id, now()), 1);
    }

    #[test]
    fn events_back_off_independently() {
        let mut retries = tracker();
        retries.record_failure(EventId::from(1), now());
        assert!(retries.is_eligible(EventId::from(2), now()));
    }
}

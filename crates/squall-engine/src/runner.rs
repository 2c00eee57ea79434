//! The dispatch loop: poll, dispatch due events, sleep until the next.
//!
//! One loop instance drives one event kind. Each cycle re-reads control
//! state (a fresh query, never a captured snapshot), maps wall-clock now
//! into archive time, dispatches everything due, then sleeps until the
//! next pending event's mapped arrival. Two instances (warnings, radar)
//! run concurrently against the same control row and independent stores;
//! they share only the read-only timing context.
//!
//! Store errors are fatal to the loop: scheduling against a store that
//! cannot be read would silently desynchronize the replay. Dispatch
//! errors are not: the event stays pending and is re-offered after its
//! backoff window.

use std::time::Duration;

use chrono::{TimeDelta, Utc};
use squall_core::config::SchedulerConfig;
use squall_db::control_store::ControlStore;
use squall_db::queue::EventQueue;
use squall_dispatch::Dispatcher;
use squall_types::ReplayItem as _;
use tracing::{info, warn};

use crate::control_api::LivenessProbe;
use crate::retry::RetryTracker;

/// Errors that can end a replay loop abnormally.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The replay log store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying database error.
        #[from]
        source: squall_db::DbError,
    },

    /// Mapping between clock domains failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: squall_core::ClockError,
    },
}

/// Why a replay loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// No simulation was running when the loop started.
    NotRunning,
    /// Every event in the queue has been delivered.
    Drained,
    /// The local control row was flipped to stopped mid-run.
    ControlStopped,
    /// The remote control plane reported the simulation terminated.
    RemoteTerminated,
    /// The archive clock passed the configured end bound.
    ArchiveEndReached,
}

impl EndReason {
    /// Whether this end counts as a completed replay.
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Drained | Self::ArchiveEndReached)
    }
}

/// Outcome of one replay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Why the loop ended.
    pub end_reason: EndReason,
    /// Events successfully dispatched.
    pub dispatched: u64,
    /// Failed dispatch attempts (each leaves the event pending).
    pub failures: u64,
}

/// Timing policy for one loop instance.
#[derive(Debug, Clone)]
pub struct LoopPolicy {
    /// Sleep floor between polling cycles.
    pub min_sleep: Duration,
    /// Optional sleep ceiling, bounding wall-clock scheduling drift.
    pub max_sleep: Option<Duration>,
    /// Wall-clock interval between control-plane liveness polls.
    pub api_check_interval: Duration,
    /// First retry delay after a dispatch failure.
    pub retry_base: Duration,
    /// Ceiling on the per-event retry delay.
    pub retry_cap: Duration,
}

impl From<&SchedulerConfig> for LoopPolicy {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            min_sleep: Duration::from_secs(config.min_sleep_secs),
            max_sleep: config.max_sleep_secs.map(Duration::from_secs),
            api_check_interval: Duration::from_secs(config.api_check_interval_secs),
            retry_base: Duration::from_secs(config.retry_base_secs),
            retry_cap: Duration::from_secs(config.retry_cap_secs),
        }
    }
}

/// Clamp the span until the next arrival into the sleep bounds.
///
/// A negative span (the event is already overdue) clamps to the floor.
fn clamp_sleep(until_arrival: TimeDelta, min: Duration, max: Option<Duration>) -> Duration {
    let raw = until_arrival.to_std().unwrap_or(Duration::ZERO);
    let floored = raw.max(min);
    max.map_or(floored, |ceiling| floored.min(ceiling))
}

/// Run one replay loop to completion.
///
/// Returns a [`RunSummary`] naming why the loop ended; every end reason
/// is a normal return. Only store and clock failures are errors.
///
/// # Errors
///
/// Returns [`RunnerError`] if the store or the clock mapping fails.
#[allow(clippy::too_many_lines)]
pub async fn run_loop<Q, D, P>(
    queue: &Q,
    dispatcher: &D,
    control: &ControlStore<'_>,
    probe: Option<&P>,
    policy: &LoopPolicy,
) -> Result<RunSummary, RunnerError>
where
    Q: EventQueue,
    D: Dispatcher<Q::Item>,
    P: LivenessProbe,
{
    let kind = queue.kind().as_str();
    let mut retries = RetryTracker::new(policy.retry_base, policy.retry_cap);
    let mut dispatched: u64 = 0;
    let mut failures: u64 = 0;
    let mut cycles: u64 = 0;
    let mut last_poll: Option<std::time::Instant> = None;

    info!(kind, "Replay loop starting");

    loop {
        let state = control.state().await?.filter(|s| s.running);
        let Some(state) = state else {
            let end_reason = if cycles == 0 {
                info!(kind, "No simulation running");
                EndReason::NotRunning
            } else {
                info!(kind, dispatched, "Control state stopped, loop ending");
                EndReason::ControlStopped
            };
            return Ok(RunSummary {
                end_reason,
                dispatched,
                failures,
            });
        };

        // Remote liveness, throttled to one poll per interval. A failed
        // poll reads as still running; only a definitive "not running"
        // ends the loop.
        if let Some(probe) = probe
            && last_poll.is_none_or(|t| t.elapsed() >= policy.api_check_interval)
        {
            last_poll = Some(std::time::Instant::now());
            match probe.is_running().await {
                Ok(true) => {}
                Ok(false) => {
                    info!(kind, dispatched, "Remote simulation terminated, loop ending");
                    return Ok(RunSummary {
                        end_reason: EndReason::RemoteTerminated,
                        dispatched,
                        failures,
                    });
                }
                Err(e) => {
                    warn!(kind, error = %e, "Liveness poll failed, assuming still running");
                }
            }
        }

        let archive_now = state.timings.archive_from_current(Utc::now())?;
        if let Some(end) = state.archive_end
            && archive_now > end
        {
            info!(kind, dispatched, "Archive end reached, loop ending");
            return Ok(RunSummary {
                end_reason: EndReason::ArchiveEndReached,
                dispatched,
                failures,
            });
        }

        for event in queue.due(archive_now).await? {
            if !retries.is_eligible(event.id(), Utc::now()) {
                continue;
            }
            match dispatcher.deliver(&event, &state.timings).await {
                Ok(()) => {
                    queue.mark_delivered(event.id()).await?;
                    retries.clear(event.id());
                    dispatched = dispatched.saturating_add(1);
                    info!(kind, event = %event.describe(), "Event dispatched");
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let attempt = retries.record_failure(event.id(), Utc::now());
                    warn!(
                        kind,
                        event = %event.describe(),
                        attempt,
                        error = %e,
                        "Dispatch failed, event stays pending"
                    );
                }
            }
        }
        cycles = cycles.saturating_add(1);

        let Some(next) = queue.next_pending().await? else {
            info!(kind, dispatched, "Queue drained, loop ending");
            return Ok(RunSummary {
                end_reason: EndReason::Drained,
                dispatched,
                failures,
            });
        };

        // Re-read now after the burst so dispatch latency never
        // accumulates into the wake time.
        let arrival = state.timings.current_from_archive(next.archive_time())?;
        let sleep = clamp_sleep(arrival - Utc::now(), policy.min_sleep, policy.max_sleep);
        tokio::time::sleep(sleep).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::{DateTime, TimeZone as _};
    use sqlx::SqlitePool;
    use squall_core::{SpeedFactor, TimingContext};
    use squall_db::control_store::StartParams;
    use squall_db::pool::StorePool;
    use squall_db::warning_store::WarningStore;
    use squall_dispatch::DispatchError;
    use squall_types::{NewWarning, WarningEvent};

    use super::*;
    use crate::control_api::{ApiError, ControlApiClient};

    /// Policy with no sleeps, for fast loop tests.
    fn fast_policy() -> LoopPolicy {
        LoopPolicy {
            min_sleep: Duration::ZERO,
            max_sleep: Some(Duration::ZERO),
            api_check_interval: Duration::ZERO,
            retry_base: Duration::ZERO,
            retry_cap: Duration::ZERO,
        }
    }

    struct OkDispatcher;

    impl Dispatcher<WarningEvent> for OkDispatcher {
        async fn deliver(
            &self,
            _event: &WarningEvent,
            _ctx: &TimingContext,
        ) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    /// Fails the first `failures_left` attempts, then succeeds.
    struct FlakyDispatcher {
        failures_left: AtomicU32,
    }

    impl Dispatcher<WarningEvent> for FlakyDispatcher {
        async fn deliver(
            &self,
            event: &WarningEvent,
            _ctx: &TimingContext,
        ) -> Result<(), DispatchError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(DispatchError::Fetch {
                    locator: event.id.to_string(),
                    message: String::from("transient failure"),
                });
            }
            Ok(())
        }
    }

    /// Flips the control row to stopped as its delivery side effect.
    struct StoppingDispatcher {
        pool: SqlitePool,
    }

    impl Dispatcher<WarningEvent> for StoppingDispatcher {
        async fn deliver(
            &self,
            _event: &WarningEvent,
            _ctx: &TimingContext,
        ) -> Result<(), DispatchError> {
            sqlx::query("UPDATE control SET running = 0 WHERE id = 1")
                .execute(&self.pool)
                .await
                .map_err(|e| DispatchError::Fetch {
                    locator: String::from("control"),
                    message: e.to_string(),
                })?;
            Ok(())
        }
    }

    struct TerminatedProbe;

    impl LivenessProbe for TerminatedProbe {
        async fn is_running(&self) -> Result<bool, ApiError> {
            Ok(false)
        }
    }

    async fn setup() -> StorePool {
        let pool = StorePool::connect_memory().await.expect("in-memory pool");
        pool.run_migrations().await.expect("migrations");
        pool
    }

    fn archive_epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap()
    }

    /// Start a run whose archive clock is already an hour past the epoch.
    async fn start_running(pool: &StorePool, archive_end: Option<DateTime<Utc>>) {
        let control = ControlStore::new(pool.pool());
        control
            .start(StartParams {
                archive_epoch: archive_epoch(),
                current_epoch: Utc::now() - TimeDelta::hours(1),
                speed: SpeedFactor::new(1.0).unwrap(),
                archive_end,
            })
            .await
            .unwrap();
    }

    async fn insert_warnings(pool: &StorePool, offsets_secs: &[i64]) {
        let rows: Vec<NewWarning> = offsets_secs
            .iter()
            .map(|s| NewWarning {
                archive_valid_time: archive_epoch() + TimeDelta::seconds(*s),
                raw_text: format!("WARNING AT OFFSET {s}"),
            })
            .collect();
        WarningStore::new(pool.pool()).bulk_insert(&rows).await.unwrap();
    }

    #[test]
    fn sleep_clamps_to_the_floor() {
        let sleep = clamp_sleep(
            TimeDelta::seconds(3),
            Duration::from_secs(10),
            Some(Duration::from_secs(20)),
        );
        assert_eq!(sleep, Duration::from_secs(10));
    }

    #[test]
    fn sleep_clamps_to_the_ceiling() {
        let sleep = clamp_sleep(
            TimeDelta::seconds(500),
            Duration::from_secs(10),
            Some(Duration::from_secs(20)),
        );
        assert_eq!(sleep, Duration::from_secs(20));
    }

    #[test]
    fn overdue_arrival_sleeps_the_floor() {
        let sleep = clamp_sleep(TimeDelta::seconds(-30), Duration::from_secs(2), None);
        assert_eq!(sleep, Duration::from_secs(2));
    }

    #[test]
    fn no_ceiling_passes_the_span_through() {
        let sleep = clamp_sleep(TimeDelta::seconds(500), Duration::from_secs(2), None);
        assert_eq!(sleep, Duration::from_secs(500));
    }

    #[tokio::test]
    async fn not_running_ends_immediately() {
        let pool = setup().await;
        let store = WarningStore::new(pool.pool());
        let control = ControlStore::new(pool.pool());

        let summary = run_loop::<_, _, ControlApiClient>(
            &store,
            &OkDispatcher,
            &control,
            None,
            &fast_policy(),
        )
        .await
        .unwrap();

        assert_eq!(summary.end_reason, EndReason::NotRunning);
        assert_eq!(summary.dispatched, 0);
    }

    #[tokio::test]
    async fn drains_overdue_events_in_order() {
        let pool = setup().await;
        start_running(&pool, None).await;
        insert_warnings(&pool, &[10, 20, 30]).await;

        let store = WarningStore::new(pool.pool());
        let control = ControlStore::new(pool.pool());
        let summary = run_loop::<_, _, ControlApiClient>(
            &store,
            &OkDispatcher,
            &control,
            None,
            &fast_policy(),
        )
        .await
        .unwrap();

        assert_eq!(summary.end_reason, EndReason::Drained);
        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.failures, 0);
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_event_stays_pending_until_a_later_attempt_succeeds() {
        let pool = setup().await;
        start_running(&pool, None).await;
        insert_warnings(&pool, &[10]).await;

        let store = WarningStore::new(pool.pool());
        let control = ControlStore::new(pool.pool());
        let dispatcher = FlakyDispatcher {
            failures_left: AtomicU32::new(2),
        };
        let summary =
            run_loop::<_, _, ControlApiClient>(&store, &dispatcher, &control, None, &fast_policy())
                .await
                .unwrap();

        assert_eq!(summary.end_reason, EndReason::Drained);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.failures, 2);
        assert_eq!(store.delivered_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn archive_end_wins_over_pending_events() {
        let pool = setup().await;
        // End bound one second past the epoch; the archive clock is
        // already an hour past it.
        start_running(&pool, Some(archive_epoch() + TimeDelta::seconds(1))).await;
        insert_warnings(&pool, &[7200]).await;

        let store = WarningStore::new(pool.pool());
        let control = ControlStore::new(pool.pool());
        let summary = run_loop::<_, _, ControlApiClient>(
            &store,
            &OkDispatcher,
            &control,
            None,
            &fast_policy(),
        )
        .await
        .unwrap();

        assert_eq!(summary.end_reason, EndReason::ArchiveEndReached);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn external_stop_is_observed_within_one_cycle() {
        let pool = setup().await;
        start_running(&pool, None).await;
        // First event is overdue; the second is hours in the future, so
        // the loop survives the first burst and re-reads control state.
        insert_warnings(&pool, &[10, 999_999]).await;

        let store = WarningStore::new(pool.pool());
        let control = ControlStore::new(pool.pool());
        let dispatcher = StoppingDispatcher {
            pool: pool.pool().clone(),
        };
        let summary =
            run_loop::<_, _, ControlApiClient>(&store, &dispatcher, &control, None, &fast_policy())
                .await
                .unwrap();

        assert_eq!(summary.end_reason, EndReason::ControlStopped);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn remote_termination_stops_before_dispatching() {
        let pool = setup().await;
        start_running(&pool, None).await;
        insert_warnings(&pool, &[10]).await;

        let store = WarningStore::new(pool.pool());
        let control = ControlStore::new(pool.pool());
        let summary = run_loop(
            &store,
            &OkDispatcher,
            &control,
            Some(&TerminatedProbe),
            &fast_policy(),
        )
        .await
        .unwrap();

        assert_eq!(summary.end_reason, EndReason::RemoteTerminated);
        assert_eq!(summary.dispatched, 0);
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }
}

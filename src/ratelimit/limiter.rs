//! Core sliding-window limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::identity::Identity;
use super::janitor::{Janitor, SweepReport};
use super::window::{TimeWindow, WindowRecord};
use crate::config::{default_requests_per_hour, default_requests_per_minute, JanitorConfig, LimiterConfig};
use crate::error::{Result, WardenError};

/// Immutable ceilings of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Admissions allowed within any trailing minute
    pub per_minute: u64,
    /// Admissions allowed within any trailing hour
    pub per_hour: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            per_minute: default_requests_per_minute() as u64,
            per_hour: default_requests_per_hour() as u64,
        }
    }
}

impl Limits {
    /// Build limits, substituting the default for any non-positive ceiling.
    pub fn clamped(per_minute: i64, per_hour: i64) -> Self {
        let defaults = Self::default();
        Self {
            per_minute: positive_or(per_minute, defaults.per_minute, TimeWindow::Minute),
            per_hour: positive_or(per_hour, defaults.per_hour, TimeWindow::Hour),
        }
    }

    /// Build limits, rejecting any non-positive ceiling.
    pub fn validated(per_minute: i64, per_hour: i64) -> Result<Self> {
        if per_minute <= 0 {
            return Err(WardenError::InvalidLimit {
                window: TimeWindow::Minute.as_str(),
                value: per_minute,
            });
        }
        if per_hour <= 0 {
            return Err(WardenError::InvalidLimit {
                window: TimeWindow::Hour.as_str(),
                value: per_hour,
            });
        }
        Ok(Self {
            per_minute: per_minute as u64,
            per_hour: per_hour as u64,
        })
    }

    pub fn ceiling(&self, window: TimeWindow) -> u64 {
        match window {
            TimeWindow::Minute => self.per_minute,
            TimeWindow::Hour => self.per_hour,
        }
    }

    /// Whether one more admission fits in both windows of `record`.
    fn admits(&self, record: &WindowRecord) -> bool {
        (record.count(TimeWindow::Minute) as u64) < self.per_minute
            && (record.count(TimeWindow::Hour) as u64) < self.per_hour
    }
}

fn positive_or(value: i64, default: u64, window: TimeWindow) -> u64 {
    if value > 0 {
        value as u64
    } else {
        warn!(
            window = %window,
            configured = value,
            substituted = default,
            "Non-positive rate limit, using default"
        );
        default
    }
}

/// State shared between the limiter and its janitor.
pub(crate) struct LimiterState {
    limits: Limits,
    records: DashMap<Identity, WindowRecord>,
    stale_after: Duration,
    last_sweep: Mutex<Option<SweepReport>>,
}

impl LimiterState {
    /// Evict stale identities and trim everything else.
    ///
    /// Trimming here does not restamp `last_swept`, so an identity that
    /// stops calling eventually becomes stale.
    pub(crate) fn sweep(&self, now: Instant) -> SweepReport {
        let stale_after = self.stale_after;
        let mut evicted = 0;

        self.records.retain(|identity, record| {
            if record.is_stale(now, stale_after) {
                debug!(identity = %identity, "Evicting idle identity");
                evicted += 1;
                false
            } else {
                record.expire(now);
                true
            }
        });

        let report = SweepReport {
            swept_at: Utc::now(),
            evicted,
            retained: self.records.len(),
        };
        *self.last_sweep.lock() = Some(report.clone());
        report
    }
}

/// A per-identity limiter enforcing a trailing-minute and a trailing-hour
/// ceiling at the same time.
///
/// This struct is thread-safe and can be shared across tasks and threads.
/// The identity map is partitioned into independently locked shards, so
/// calls for one identity are serialized while unrelated identities proceed
/// in parallel.
pub struct SlidingWindowLimiter {
    state: Arc<LimiterState>,
    janitor: Mutex<Option<Janitor>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter with the default janitor schedule.
    ///
    /// Non-positive ceilings are replaced by the defaults (10/min, 100/hour).
    pub fn new(per_minute: i64, per_hour: i64) -> Self {
        Self::with_janitor(per_minute, per_hour, &JanitorConfig::default())
    }

    /// Create a limiter with a custom janitor schedule.
    pub fn with_janitor(per_minute: i64, per_hour: i64, janitor: &JanitorConfig) -> Self {
        Self::build(Limits::clamped(per_minute, per_hour), janitor)
    }

    /// Create a limiter, rejecting non-positive ceilings instead of
    /// substituting defaults.
    pub fn try_new(per_minute: i64, per_hour: i64) -> Result<Self> {
        Self::try_with_janitor(per_minute, per_hour, &JanitorConfig::default())
    }

    pub fn try_with_janitor(per_minute: i64, per_hour: i64, janitor: &JanitorConfig) -> Result<Self> {
        Ok(Self::build(Limits::validated(per_minute, per_hour)?, janitor))
    }

    /// Create a limiter from its configuration section.
    pub fn from_config(limiter: &LimiterConfig, janitor: &JanitorConfig) -> Self {
        Self::with_janitor(limiter.requests_per_minute, limiter.requests_per_hour, janitor)
    }

    fn build(limits: Limits, janitor: &JanitorConfig) -> Self {
        let state = Arc::new(LimiterState {
            limits,
            records: DashMap::new(),
            stale_after: janitor.stale_after(),
            last_sweep: Mutex::new(None),
        });

        info!(
            per_minute = limits.per_minute,
            per_hour = limits.per_hour,
            sweep_interval_secs = janitor.sweep_interval().as_secs(),
            stale_after_secs = janitor.stale_after_secs,
            "Sliding window limiter initialized"
        );

        let janitor = Janitor::spawn(Arc::clone(&state), janitor.sweep_interval());
        Self {
            state,
            janitor: Mutex::new(janitor),
        }
    }

    /// Decide whether one more request from `identity` is admitted.
    ///
    /// The request counts against both windows only when both have room.
    /// A denied request is not recorded.
    pub fn allow(&self, identity: Identity) -> bool {
        let mut record = self.state.records.entry(identity).or_insert_with(|| {
            debug!(identity = %identity, "Tracking new identity");
            WindowRecord::new(Instant::now())
        });

        let now = Instant::now();
        record.trim(now);

        if !self.state.limits.admits(&record) {
            debug!(
                identity = %identity,
                minute_count = record.count(TimeWindow::Minute),
                hour_count = record.count(TimeWindow::Hour),
                "Rate limit exceeded"
            );
            return false;
        }

        record.record(now);
        trace!(
            identity = %identity,
            minute_count = record.count(TimeWindow::Minute),
            hour_count = record.count(TimeWindow::Hour),
            "Request admitted"
        );
        true
    }

    /// Admissions left for `identity` in the trailing minute.
    pub fn remaining_minute(&self, identity: Identity) -> u64 {
        self.remaining(identity, TimeWindow::Minute)
    }

    /// Admissions left for `identity` in the trailing hour.
    pub fn remaining_hour(&self, identity: Identity) -> u64 {
        self.remaining(identity, TimeWindow::Hour)
    }

    /// Unknown identities get the full ceiling and are not tracked by this call.
    fn remaining(&self, identity: Identity, window: TimeWindow) -> u64 {
        let ceiling = self.state.limits.ceiling(window);

        match self.state.records.get_mut(&identity) {
            Some(mut record) => {
                record.trim(Instant::now());
                ceiling.saturating_sub(record.count(window) as u64)
            }
            None => ceiling,
        }
    }

    /// Forget everything about `identity`, restoring its full budget.
    pub fn reset_for(&self, identity: Identity) {
        if self.state.records.remove(&identity).is_some() {
            info!(identity = %identity, "Rate limit reset");
        }
    }

    pub fn limits(&self) -> Limits {
        self.state.limits
    }

    /// Number of identities currently holding a window record.
    pub fn tracked_identities(&self) -> usize {
        self.state.records.len()
    }

    /// Drop every window record.
    pub fn clear(&self) {
        self.state.records.clear();
    }

    /// Run one janitor sweep immediately.
    pub fn sweep_now(&self) -> SweepReport {
        self.state.sweep(Instant::now())
    }

    /// The report of the most recent sweep, if any has run.
    pub fn last_sweep(&self) -> Option<SweepReport> {
        self.state.last_sweep.lock().clone()
    }

    pub fn is_janitor_running(&self) -> bool {
        self.janitor
            .lock()
            .as_ref()
            .is_some_and(|janitor| !janitor.is_finished())
    }

    /// Signal the janitor to stop and return without waiting for it.
    ///
    /// Admission keeps working afterwards; idle identities are simply no
    /// longer evicted. Calling this again is a no-op.
    pub fn shutdown(&self) {
        if let Some(janitor) = self.janitor.lock().take() {
            drop(janitor.stop());
        }
    }

    /// Signal the janitor to stop and wait for it to exit.
    pub async fn shutdown_and_wait(&self) {
        let handle = self.janitor.lock().take().map(Janitor::stop);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Janitor task ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("limits", &self.state.limits)
            .field("tracked_identities", &self.tracked_identities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    fn id(raw: u64) -> Identity {
        Identity::new(raw)
    }

    #[test]
    fn test_limiter_without_runtime() {
        let limiter = SlidingWindowLimiter::new(2, 10);

        assert!(!limiter.is_janitor_running());
        assert!(limiter.allow(id(1)));
        assert!(limiter.allow(id(1)));
        assert!(!limiter.allow(id(1)));

        tokio_test::block_on(limiter.shutdown_and_wait());
        assert_eq!(limiter.remaining_minute(id(1)), 0);
    }

    #[tokio::test]
    async fn test_unknown_identity_has_full_budget() {
        let limiter = SlidingWindowLimiter::new(3, 5);

        assert_eq!(limiter.remaining_minute(id(7)), 3);
        assert_eq!(limiter.remaining_hour(id(7)), 5);
        assert_eq!(limiter.tracked_identities(), 0);
    }

    #[tokio::test]
    async fn test_minute_ceiling() {
        let limiter = SlidingWindowLimiter::new(3, 5);

        for _ in 0..3 {
            assert!(limiter.allow(id(1)));
        }
        assert!(!limiter.allow(id(1)));

        for _ in 0..3 {
            assert!(limiter.allow(id(2)));
        }
        assert!(!limiter.allow(id(2)));
        assert_eq!(limiter.tracked_identities(), 2);
    }

    #[tokio::test]
    async fn test_hour_ceiling_binds_first() {
        let limiter = SlidingWindowLimiter::new(100, 3);

        for _ in 0..3 {
            assert!(limiter.allow(id(1)));
        }
        assert!(!limiter.allow(id(1)));
        assert_eq!(limiter.remaining_minute(id(1)), 97);
        assert_eq!(limiter.remaining_hour(id(1)), 0);
    }

    #[tokio::test]
    async fn test_denied_requests_are_not_recorded() {
        let limiter = SlidingWindowLimiter::new(2, 10);

        assert!(limiter.allow(id(1)));
        assert!(limiter.allow(id(1)));
        for _ in 0..20 {
            assert!(!limiter.allow(id(1)));
        }

        assert_eq!(limiter.remaining_minute(id(1)), 0);
        assert_eq!(limiter.remaining_hour(id(1)), 8);
    }

    #[tokio::test]
    async fn test_reset_restores_budget() {
        let limiter = SlidingWindowLimiter::new(1, 1);

        assert!(limiter.allow(id(1)));
        assert!(!limiter.allow(id(1)));

        limiter.reset_for(id(1));
        assert_eq!(limiter.tracked_identities(), 0);
        assert!(limiter.allow(id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_window_slides() {
        let limiter = SlidingWindowLimiter::new(2, 10);

        assert!(limiter.allow(id(1)));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.allow(id(1)));
        assert!(!limiter.allow(id(1)));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(limiter.remaining_minute(id(1)), 1);
        assert_eq!(limiter.remaining_hour(id(1)), 8);
        assert!(limiter.allow(id(1)));
        assert!(!limiter.allow(id(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hour_window_slides() {
        let limiter = SlidingWindowLimiter::new(10, 2);

        assert!(limiter.allow(id(1)));
        assert!(limiter.allow(id(1)));
        assert!(!limiter.allow(id(1)));

        tokio::time::advance(Duration::from_secs(3601)).await;
        assert_eq!(limiter.remaining_hour(id(1)), 2);
        assert!(limiter.allow(id(1)));
    }

    #[tokio::test]
    async fn test_non_positive_limits_use_defaults() {
        let limiter = SlidingWindowLimiter::new(0, -3);
        assert_eq!(limiter.limits(), Limits { per_minute: 10, per_hour: 100 });

        let limiter = SlidingWindowLimiter::new(4, 0);
        assert_eq!(limiter.limits(), Limits { per_minute: 4, per_hour: 100 });
    }

    #[tokio::test]
    async fn test_strict_constructor_rejects_non_positive() {
        let err = SlidingWindowLimiter::try_new(0, 5).unwrap_err();
        assert!(matches!(err, WardenError::InvalidLimit { window: "minute", value: 0 }));

        let err = SlidingWindowLimiter::try_new(5, -1).unwrap_err();
        assert!(matches!(err, WardenError::InvalidLimit { window: "hour", value: -1 }));

        let limiter = SlidingWindowLimiter::try_new(5, 6).unwrap();
        assert_eq!(limiter.limits(), Limits { per_minute: 5, per_hour: 6 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identities_do_not_interfere() {
        let per_minute = 5;
        let limiter = Arc::new(SlidingWindowLimiter::new(per_minute, 50));

        let tasks = (0..100u64).map(|raw| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                (0..per_minute).all(|_| limiter.allow(id(raw)))
            })
        });

        for admitted in join_all(tasks).await {
            assert!(admitted.unwrap());
        }

        assert_eq!(limiter.tracked_identities(), 100);
        for raw in 0..100u64 {
            assert!(!limiter.allow(id(raw)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_for_one_identity_respect_ceiling() {
        let limiter = Arc::new(SlidingWindowLimiter::new(25, 1000));

        let tasks = (0..200).map(|_| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.allow(id(1)) })
        });

        let admitted = join_all(tasks)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();

        assert_eq!(admitted, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_prompt_and_keeps_accounting() {
        let limiter = SlidingWindowLimiter::new(3, 5);
        assert!(limiter.is_janitor_running());
        assert!(limiter.allow(id(1)));

        tokio::time::timeout(Duration::from_secs(1), limiter.shutdown_and_wait())
            .await
            .expect("janitor should stop without waiting for its next tick");

        assert!(!limiter.is_janitor_running());
        assert_eq!(limiter.remaining_minute(id(1)), 2);

        limiter.shutdown();
        assert!(limiter.allow(id(1)));
        assert_eq!(limiter.remaining_minute(id(1)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_limiter_stops_janitor() {
        let limiter = SlidingWindowLimiter::new(3, 5);
        let state = Arc::downgrade(&limiter.state);

        drop(limiter);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(state.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_now_evicts_only_stale() {
        let janitor = JanitorConfig {
            sweep_interval_secs: 3600,
            stale_after_secs: 120,
        };
        let limiter = SlidingWindowLimiter::with_janitor(5, 50, &janitor);

        limiter.allow(id(1));
        tokio::time::advance(Duration::from_secs(100)).await;
        limiter.allow(id(2));
        tokio::time::advance(Duration::from_secs(50)).await;

        let report = limiter.sweep_now();
        assert_eq!(report.evicted, 1);
        assert_eq!(report.retained, 1);
        assert_eq!(limiter.last_sweep().map(|r| r.evicted), Some(1));

        assert_eq!(limiter.tracked_identities(), 1);
        assert_eq!(limiter.remaining_minute(id(2)), 4);
        assert_eq!(limiter.remaining_minute(id(1)), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_does_not_refresh_activity() {
        let janitor = JanitorConfig {
            sweep_interval_secs: 3600,
            stale_after_secs: 120,
        };
        let limiter = SlidingWindowLimiter::with_janitor(5, 50, &janitor);

        limiter.allow(id(1));
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(limiter.sweep_now().evicted, 0);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.sweep_now().evicted, 1);
        assert_eq!(limiter.tracked_identities(), 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let limiter = SlidingWindowLimiter::new(3, 5);
        limiter.allow(id(1));
        limiter.allow(id(2));

        limiter.clear();
        assert_eq!(limiter.tracked_identities(), 0);
    }
}

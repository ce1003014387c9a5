//! Sliding-window bookkeeping for a single identity.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Time window for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeWindow {
    /// Trailing 60 seconds
    Minute,
    /// Trailing 3600 seconds
    Hour,
}

impl TimeWindow {
    /// Get the span of this window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Minute => "minute",
            TimeWindow::Hour => "hour",
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission timestamps for one identity.
///
/// Both sequences are ordered oldest first. Every timestamp in the minute
/// sequence is also present in the hour sequence.
#[derive(Debug, Clone)]
pub struct WindowRecord {
    /// Admissions within the trailing minute
    minute_requests: VecDeque<Instant>,
    /// Admissions within the trailing hour
    hour_requests: VecDeque<Instant>,
    /// Last access-driven trim
    last_swept: Instant,
}

impl WindowRecord {
    /// Create an empty record stamped at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            minute_requests: VecDeque::new(),
            hour_requests: VecDeque::new(),
            last_swept: now,
        }
    }

    /// Drop expired timestamps from both windows and stamp `last_swept`.
    pub fn trim(&mut self, now: Instant) {
        self.expire(now);
        self.last_swept = now;
    }

    /// Drop expired timestamps without touching `last_swept`.
    ///
    /// The janitor uses this so that its own sweeps do not count as activity.
    pub fn expire(&mut self, now: Instant) {
        expire_older_than(&mut self.minute_requests, now, TimeWindow::Minute.duration());
        expire_older_than(&mut self.hour_requests, now, TimeWindow::Hour.duration());
    }

    /// Record one admission in both windows.
    pub fn record(&mut self, now: Instant) {
        self.minute_requests.push_back(now);
        self.hour_requests.push_back(now);
    }

    /// Number of admissions currently held for `window`.
    pub fn count(&self, window: TimeWindow) -> usize {
        match window {
            TimeWindow::Minute => self.minute_requests.len(),
            TimeWindow::Hour => self.hour_requests.len(),
        }
    }

    pub fn last_swept(&self) -> Instant {
        self.last_swept
    }

    /// Whether no access-driven trim happened within `threshold` of `now`.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_swept) > threshold
    }

    pub fn is_empty(&self) -> bool {
        self.hour_requests.is_empty()
    }
}

/// Pop timestamps from the front while they are older than `span`.
///
/// A timestamp exactly `span` old is still inside the window.
fn expire_older_than(requests: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(&oldest) = requests.front() {
        if now.saturating_duration_since(oldest) > span {
            requests.pop_front();
        } else {
            break;
        }
    }
}

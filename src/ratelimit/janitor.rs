//! Background eviction of idle identities.
//!
//! Each limiter owns one janitor task. The task wakes on a fixed interval,
//! evicts identities that have not been accessed within the stale threshold,
//! and trims the windows of everyone else. It never affects admission
//! decisions, only how much memory inactive identities hold.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::limiter::LimiterState;

/// Outcome of one sweep over a limiter's identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Wall-clock time the sweep finished
    pub swept_at: DateTime<Utc>,
    /// Identities removed for inactivity
    pub evicted: usize,
    /// Identities still tracked afterwards
    pub retained: usize,
}

/// Handle to a running janitor task.
pub(crate) struct Janitor {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Janitor {
    /// Spawn the janitor on the current Tokio runtime.
    ///
    /// Returns `None` outside a runtime; the limiter still works, it just
    /// never evicts idle identities.
    pub(crate) fn spawn(state: Arc<LimiterState>, interval: Duration) -> Option<Self> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No Tokio runtime available, idle identities will not be evicted");
                return None;
            }
        };

        let (shutdown, signal) = oneshot::channel();
        let handle = runtime.spawn(run(state, interval, signal));

        Some(Self { shutdown, handle })
    }

    /// Signal the task to exit and hand back its join handle.
    pub(crate) fn stop(self) -> JoinHandle<()> {
        // The receiver is gone only if the task already exited.
        let _ = self.shutdown.send(());
        self.handle
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Sweep on every tick until signalled.
///
/// The signal also fires when the sender is dropped together with its
/// limiter.
async fn run(state: Arc<LimiterState>, interval: Duration, mut signal: oneshot::Receiver<()>) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = interval.as_secs(), "Janitor started");

    loop {
        tokio::select! {
            _ = &mut signal => break,
            _ = ticker.tick() => {
                let report = state.sweep(Instant::now());
                debug!(
                    evicted = report.evicted,
                    retained = report.retained,
                    swept_at = %report.swept_at,
                    "Janitor sweep complete"
                );
            }
        }
    }

    info!("Janitor stopped");
}

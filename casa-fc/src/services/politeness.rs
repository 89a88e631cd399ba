//! Politeness gate
//!
//! Enforces a minimum delay between consecutive calls to the forum. A flat
//! delay, no burst allowance. The wait is cancellable so a shutdown between
//! channels does not have to sit out the delay.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// How a [`PolitenessGate::wait`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Caller may proceed
    Ready,
    /// Cancellation was requested while waiting
    Cancelled,
}

/// Minimum-interval gate between outbound calls
pub struct PolitenessGate {
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl PolitenessGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Mutex::new(None),
            min_interval,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until `min_interval` has passed since the previous call
    ///
    /// The first call returns immediately. A cancelled wait does not count as
    /// a call.
    pub async fn wait(&self, cancel: &CancellationToken) -> GateOutcome {
        let mut last = self.last_call.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Politeness delay: waiting {:?}", wait_time);
                tokio::select! {
                    _ = tokio::time::sleep(wait_time) => {}
                    _ = cancel.cancelled() => return GateOutcome::Cancelled,
                }
            }
        }

        if cancel.is_cancelled() {
            return GateOutcome::Cancelled;
        }

        *last = Some(Instant::now());
        GateOutcome::Ready
    }
}

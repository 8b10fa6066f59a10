//! Readiness polling with exponential backoff.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::debug;

use crate::backend::{ClusterApi, ClusterApiError};

use super::ClusterInfo;

/// Bounds for waiting on a cluster to reach a ready state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitPolicy {
    /// Total time allowed before giving up.
    pub timeout: Duration,
    /// Delay before the second poll.
    pub initial_interval: Duration,
    /// Upper bound for the doubled delay.
    pub max_interval: Duration,
}

impl WaitPolicy {
    /// Creates a policy, clamping `max_interval` to at least `initial_interval`.
    #[must_use]
    pub fn new(timeout: Duration, initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            timeout,
            initial_interval,
            max_interval: max_interval.max(initial_interval),
        }
    }

    pub(super) fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(20 * 60),
            Duration::from_secs(10),
            Duration::from_secs(60),
        )
    }
}

/// Polls `api` until the cluster is ready, terminal, or the deadline passes.
pub(crate) async fn poll_until_running<A: ClusterApi + ?Sized>(
    api: &A,
    cluster_id: &str,
    policy: &WaitPolicy,
) -> Result<ClusterInfo, ClusterApiError> {
    let started = Instant::now();
    // A timeout past the end of the clock means waiting without a deadline.
    let deadline = started.checked_add(policy.timeout);
    let mut interval = policy.initial_interval;

    loop {
        let info = api.get(cluster_id).await?;
        if info.state.is_ready() {
            return Ok(info);
        }
        if info.state.is_terminal() {
            return Err(ClusterApiError::TerminalState {
                cluster_id: info.cluster_id,
                state: info.state,
                message: info.state_message,
            });
        }

        let remaining = deadline.map_or(Duration::MAX, |until| {
            until.saturating_duration_since(Instant::now())
        });
        if remaining.is_zero() {
            break;
        }
        debug!(cluster_id, state = %info.state, ?interval, "cluster not ready yet");
        sleep(interval.min(remaining)).await;
        interval = policy.next_interval(interval);
    }

    Err(ClusterApiError::WaitTimeout {
        cluster_id: cluster_id.to_owned(),
        waited_secs: started.elapsed().as_secs(),
    })
}

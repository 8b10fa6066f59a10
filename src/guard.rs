//! Keyed mutual exclusion with memoized outcomes for shared resources.
//!
//! Several mounts can depend on one external credential object. The guard
//! makes sure the action that ensures such an object exists runs at most once
//! per identity, while callers for other identities proceed in parallel.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

static GLOBAL_GUARD: OnceLock<Arc<SharedResourceGuard>> = OnceLock::new();

/// Per-identity lock plus the recorded outcome of the guarded action.
#[derive(Debug, Default)]
pub struct SharedResourceGuard {
    entries: DashMap<String, Arc<Mutex<Option<bool>>>>,
}

impl SharedResourceGuard {
    /// Creates an empty guard, independent from [`SharedResourceGuard::global`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide guard.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_GUARD.get_or_init(|| Arc::new(Self::new())))
    }

    /// Runs `action` for `identity` unless an outcome is already recorded.
    ///
    /// Concurrent callers for the same identity wait for the first caller and
    /// then observe its outcome. Both success and failure are memoized for the
    /// lifetime of the guard.
    ///
    /// # Examples
    ///
    /// ```
    /// use lakemount::SharedResourceGuard;
    ///
    /// # let runtime = tokio::runtime::Builder::new_current_thread()
    /// #     .build()
    /// #     .expect("runtime");
    /// # runtime.block_on(async {
    /// let guard = SharedResourceGuard::new();
    /// assert!(guard.synchronized("profile", || async { true }).await);
    /// // The second action never runs; the first outcome is replayed.
    /// assert!(guard.synchronized("profile", || async { false }).await);
    /// # });
    /// ```
    pub async fn synchronized<F, Fut>(&self, identity: &str, action: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let entry = Arc::clone(self.entries.entry(identity.to_owned()).or_default().value());
        let mut outcome = entry.lock().await;
        if let Some(recorded) = *outcome {
            debug!(identity, recorded, "shared resource outcome already recorded");
            return recorded;
        }
        let result = action().await;
        debug!(identity, result, "recorded shared resource outcome");
        *outcome = Some(result);
        result
    }

    /// Returns the recorded outcome for `identity` when no action is in flight.
    #[must_use]
    pub fn outcome(&self, identity: &str) -> Option<bool> {
        let entry = self.entries.get(identity).map(|entry| Arc::clone(entry.value()))?;
        entry.try_lock().ok().and_then(|outcome| *outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn memoizes_failures() {
        let guard = SharedResourceGuard::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let outcome = guard
                .synchronized("arn", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    false
                })
                .await;
            assert!(!outcome);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.outcome("arn"), Some(false));
    }

    #[rstest]
    #[tokio::test]
    async fn identities_are_independent() {
        let guard = SharedResourceGuard::new();
        assert!(guard.synchronized("first", || async { true }).await);
        assert!(!guard.synchronized("second", || async { false }).await);
        assert_eq!(guard.outcome("first"), Some(true));
        assert_eq!(guard.outcome("second"), Some(false));
        assert_eq!(guard.outcome("third"), None);
    }

    #[rstest]
    fn global_returns_the_same_instance() {
        assert!(Arc::ptr_eq(
            &SharedResourceGuard::global(),
            &SharedResourceGuard::global()
        ));
    }
}

//! Concurrency coverage for the keyed shared-resource guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lakemount::SharedResourceGuard;
use rstest::rstest;
use tokio::task::JoinSet;
use tokio::time::sleep;
use uuid::Uuid;

/// Runs `callers` concurrent tasks against `identity` and returns every
/// observed outcome plus the number of times the action actually ran.
async fn race(
    guard: Arc<SharedResourceGuard>,
    identity: &str,
    callers: usize,
    outcome: bool,
) -> (Vec<bool>, usize) {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut tasks = JoinSet::new();
    for _ in 0..callers {
        let task_guard = Arc::clone(&guard);
        let task_runs = Arc::clone(&runs);
        let task_identity = identity.to_owned();
        tasks.spawn(async move {
            task_guard
                .synchronized(&task_identity, || async move {
                    task_runs.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(20)).await;
                    outcome
                })
                .await
        });
    }

    let mut results = Vec::with_capacity(callers);
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.expect("task completes"));
    }
    (results, runs.load(Ordering::SeqCst))
}

#[rstest]
#[case(true)]
#[case(false)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_execution(#[case] outcome: bool) {
    let guard = Arc::new(SharedResourceGuard::new());

    let (results, runs) = race(Arc::clone(&guard), "profile", 16, outcome).await;

    assert_eq!(runs, 1);
    assert_eq!(results.len(), 16);
    assert!(results.iter().all(|result| *result == outcome));
    assert_eq!(guard.outcome("profile"), Some(outcome));
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_identities_do_not_serialise_each_other() {
    let guard = Arc::new(SharedResourceGuard::new());

    let (first, second) = tokio::join!(
        race(Arc::clone(&guard), "first", 4, true),
        race(Arc::clone(&guard), "second", 4, false),
    );

    assert_eq!(first.1, 1);
    assert_eq!(second.1, 1);
    assert!(first.0.iter().all(|result| *result));
    assert!(second.0.iter().all(|result| !*result));
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn global_guard_is_shared_across_handles() {
    let identity = format!("profile-{}", Uuid::new_v4());

    let (results, runs) = race(SharedResourceGuard::global(), &identity, 8, true).await;
    let replayed = SharedResourceGuard::global()
        .synchronized(&identity, || async { false })
        .await;

    assert_eq!(runs, 1);
    assert!(results.iter().all(|result| *result));
    assert!(replayed, "second handle must observe the recorded outcome");
}

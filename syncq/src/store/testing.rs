//! Test suite for ensuring a correct implementation of a job store.
use futures::future::join_all;

use super::{JobStore, StoreError};
use crate::job::{JobStatus, NewJob, RetryDecision};

impl NewJob {
    pub(crate) fn mock_job() -> Self {
        Self {
            job_name: "mock job".to_owned(),
            script_path: "/opt/sync/noop.sh".to_owned(),
            priority: 0,
            max_retries: 3,
        }
    }

    pub(crate) fn with_priority(self, priority: u16) -> Self {
        Self { priority, ..self }
    }

    pub(crate) fn with_max_retries(self, max_retries: u16) -> Self {
        Self {
            max_retries,
            ..self
        }
    }
}

/// Create the conformance test suite for a [`JobStore`] implementation.
///
/// For store implementors, it is useful to include this as part of your test
/// suite.
///
/// # Example
///
/// ```
/// use syncq::test_suite;
/// use syncq::store::memory::InMemoryStore;
/// test_suite!(for: InMemoryStore::new());
/// ```
///
/// If you are using a different async test attribute you can configure the
/// macro to use that instead. For example when using `sqlx::test`:
///
/// ```ignore
/// use syncq::test_suite;
/// test_suite!(
///     attr: sqlx::test,
///     args: (pool: PgPool),
///     store: StoreImplementation::from_pool(pool).await.unwrap()
/// );
/// ```
#[macro_export]
macro_rules! test_suite {
    (for: $store:expr) => {
        test_suite!(attr: tokio::test, args: (), store: $store);
    };
    (attr: $attr:meta, args: $args:tt, store: $store:expr) => {
        #[$attr]
        async fn enqueue_assigns_distinct_ids $args {
            let store = $store;
            $crate::store::testing::enqueue_assigns_distinct_ids(store).await;
        }
        #[$attr]
        async fn claim_next_returns_none_when_empty $args {
            let store = $store;
            $crate::store::testing::claim_next_returns_none_when_empty(store).await;
        }
        #[$attr]
        async fn claim_next_marks_job_running $args {
            let store = $store;
            $crate::store::testing::claim_next_marks_job_running(store).await;
        }
        #[$attr]
        async fn claim_next_orders_by_priority $args {
            let store = $store;
            $crate::store::testing::claim_next_orders_by_priority(store).await;
        }
        #[$attr]
        async fn claim_next_breaks_ties_by_creation_time $args {
            let store = $store;
            $crate::store::testing::claim_next_breaks_ties_by_creation_time(store).await;
        }
        #[$attr]
        async fn claim_next_ignores_non_pending_jobs $args {
            let store = $store;
            $crate::store::testing::claim_next_ignores_non_pending_jobs(store).await;
        }
        #[$attr]
        async fn claim_next_never_hands_out_a_job_twice $args {
            let store = $store;
            $crate::store::testing::claim_next_never_hands_out_a_job_twice(store).await;
        }
        #[$attr]
        async fn mark_completed_is_terminal $args {
            let store = $store;
            $crate::store::testing::mark_completed_is_terminal(store).await;
        }
        #[$attr]
        async fn mark_completed_not_found $args {
            let store = $store;
            $crate::store::testing::mark_completed_not_found(store).await;
        }
        #[$attr]
        async fn mark_failed_requeues_while_retries_left $args {
            let store = $store;
            $crate::store::testing::mark_failed_requeues_while_retries_left(store).await;
        }
        #[$attr]
        async fn mark_failed_exhausts_retry_budget $args {
            let store = $store;
            $crate::store::testing::mark_failed_exhausts_retry_budget(store).await;
        }
        #[$attr]
        async fn mark_failed_not_found $args {
            let store = $store;
            $crate::store::testing::mark_failed_not_found(store).await;
        }
        #[$attr]
        async fn mark_stopped_is_terminal $args {
            let store = $store;
            $crate::store::testing::mark_stopped_is_terminal(store).await;
        }
        #[$attr]
        async fn request_stop_flags_running_job $args {
            let store = $store;
            $crate::store::testing::request_stop_flags_running_job(store).await;
        }
        #[$attr]
        async fn request_stop_is_noop_unless_running $args {
            let store = $store;
            $crate::store::testing::request_stop_is_noop_unless_running(store).await;
        }
        #[$attr]
        async fn stop_requested_when_job_left_running_state $args {
            let store = $store;
            $crate::store::testing::stop_requested_when_job_left_running_state(store).await;
        }
        #[$attr]
        async fn update_progress_round_trips $args {
            let store = $store;
            $crate::store::testing::update_progress_round_trips(store).await;
        }
        #[$attr]
        async fn update_progress_ignores_missing_job $args {
            let store = $store;
            $crate::store::testing::update_progress_ignores_missing_job(store).await;
        }
        #[$attr]
        async fn job_returns_none_when_missing $args {
            let store = $store;
            $crate::store::testing::job_returns_none_when_missing(store).await;
        }
    };
}

pub use test_suite;

#[doc(hidden)]
pub async fn enqueue_assigns_distinct_ids(store: impl JobStore) {
    let id1 = store.enqueue(NewJob::mock_job()).await.unwrap();
    let id2 = store.enqueue(NewJob::mock_job()).await.unwrap();

    assert_ne!(id1, id2);
    assert!(store.job(id1).await.unwrap().is_some());
    assert!(store.job(id2).await.unwrap().is_some());
}

#[doc(hidden)]
pub async fn claim_next_returns_none_when_empty(store: impl JobStore) {
    assert!(store.claim_next().await.unwrap().is_none());
}

#[doc(hidden)]
pub async fn claim_next_marks_job_running(store: impl JobStore) {
    let id = store.enqueue(NewJob::mock_job()).await.unwrap();

    let job = store.claim_next().await.unwrap().expect("should claim");

    assert_eq!(job.id, id);
    assert_eq!(job.status, JobStatus::Running);
    assert!(job.started_at.is_some());
}

#[doc(hidden)]
pub async fn claim_next_orders_by_priority(store: impl JobStore) {
    let low = store
        .enqueue(NewJob::mock_job().with_priority(1))
        .await
        .unwrap();
    let high = store
        .enqueue(NewJob::mock_job().with_priority(5))
        .await
        .unwrap();
    let mid = store
        .enqueue(NewJob::mock_job().with_priority(3))
        .await
        .unwrap();

    let claimed = [
        store.claim_next().await.unwrap().unwrap().id,
        store.claim_next().await.unwrap().unwrap().id,
        store.claim_next().await.unwrap().unwrap().id,
    ];

    assert_eq!(claimed, [high, mid, low]);
}

#[doc(hidden)]
pub async fn claim_next_breaks_ties_by_creation_time(store: impl JobStore) {
    let first = store.enqueue(NewJob::mock_job()).await.unwrap();
    let second = store.enqueue(NewJob::mock_job()).await.unwrap();

    assert_eq!(store.claim_next().await.unwrap().unwrap().id, first);
    assert_eq!(store.claim_next().await.unwrap().unwrap().id, second);
}

#[doc(hidden)]
pub async fn claim_next_ignores_non_pending_jobs(store: impl JobStore) {
    let completed = store.enqueue(NewJob::mock_job()).await.unwrap();
    store.claim_next().await.unwrap().unwrap();
    store.mark_completed(completed).await.unwrap();

    let stopped = store.enqueue(NewJob::mock_job()).await.unwrap();
    store.claim_next().await.unwrap().unwrap();
    store.mark_stopped(stopped).await.unwrap();

    let failed = store
        .enqueue(NewJob::mock_job().with_max_retries(0))
        .await
        .unwrap();
    store.claim_next().await.unwrap().unwrap();
    store.mark_failed(failed, "oh dear").await.unwrap();

    let running = store.enqueue(NewJob::mock_job()).await.unwrap();
    assert_eq!(store.claim_next().await.unwrap().unwrap().id, running);

    assert!(store.claim_next().await.unwrap().is_none());
}

#[doc(hidden)]
pub async fn claim_next_never_hands_out_a_job_twice(store: impl JobStore) {
    let id = store.enqueue(NewJob::mock_job()).await.unwrap();

    let claims = join_all([
        store.claim_next(),
        store.claim_next(),
        store.claim_next(),
        store.claim_next(),
    ])
    .await;

    let claimed: Vec<_> = claims
        .into_iter()
        .filter_map(|claim| claim.unwrap())
        .collect();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, id);
}

#[doc(hidden)]
pub async fn mark_completed_is_terminal(store: impl JobStore) {
    let id = store.enqueue(NewJob::mock_job()).await.unwrap();
    store.claim_next().await.unwrap().unwrap();

    store.mark_completed(id).await.unwrap();

    let job = store.job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());
}

#[doc(hidden)]
pub async fn mark_completed_not_found(store: impl JobStore) {
    assert!(matches!(
        store.mark_completed(42.into()).await,
        Err(StoreError::JobNotFound(_))
    ));
}

#[doc(hidden)]
pub async fn mark_failed_requeues_while_retries_left(store: impl JobStore) {
    let id = store
        .enqueue(NewJob::mock_job().with_max_retries(1))
        .await
        .unwrap();
    store.claim_next().await.unwrap().unwrap();

    let decision = store.mark_failed(id, "exit status 1").await.unwrap();

    assert_eq!(decision, RetryDecision::Requeued { retry_count: 1 });
    let job = store.job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.error_message.as_deref(), Some("exit status 1"));
    assert!(job.completed_at.is_none());
}

#[doc(hidden)]
pub async fn mark_failed_exhausts_retry_budget(store: impl JobStore) {
    let id = store
        .enqueue(NewJob::mock_job().with_max_retries(2))
        .await
        .unwrap();

    for _ in 0..2 {
        store.claim_next().await.unwrap().unwrap();
        let decision = store.mark_failed(id, "exit status 1").await.unwrap();
        assert!(matches!(decision, RetryDecision::Requeued { .. }));
    }

    store.claim_next().await.unwrap().unwrap();
    let decision = store.mark_failed(id, "exit status 1").await.unwrap();

    assert_eq!(decision, RetryDecision::Exhausted);
    let job = store.job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 2);
    assert!(job.completed_at.is_some());
}

#[doc(hidden)]
pub async fn mark_failed_not_found(store: impl JobStore) {
    assert!(matches!(
        store.mark_failed(42.into(), "oh dear").await,
        Err(StoreError::JobNotFound(_))
    ));
}

#[doc(hidden)]
pub async fn mark_stopped_is_terminal(store: impl JobStore) {
    let id = store.enqueue(NewJob::mock_job()).await.unwrap();
    store.claim_next().await.unwrap().unwrap();

    store.mark_stopped(id).await.unwrap();

    let job = store.job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Stopped);
    assert!(job.completed_at.is_some());
    assert!(store.claim_next().await.unwrap().is_none());
}

#[doc(hidden)]
pub async fn request_stop_flags_running_job(store: impl JobStore) {
    let id = store.enqueue(NewJob::mock_job()).await.unwrap();
    store.claim_next().await.unwrap().unwrap();

    assert!(!store.stop_requested(id).await.unwrap());
    store.request_stop(id).await.unwrap();

    assert!(store.stop_requested(id).await.unwrap());
    assert!(store.job(id).await.unwrap().unwrap().stop_requested);
}

#[doc(hidden)]
pub async fn request_stop_is_noop_unless_running(store: impl JobStore) {
    let id = store.enqueue(NewJob::mock_job()).await.unwrap();

    store.request_stop(id).await.unwrap();

    assert!(!store.job(id).await.unwrap().unwrap().stop_requested);
}

#[doc(hidden)]
pub async fn stop_requested_when_job_left_running_state(store: impl JobStore) {
    let id = store.enqueue(NewJob::mock_job()).await.unwrap();
    store.claim_next().await.unwrap().unwrap();
    store.mark_completed(id).await.unwrap();

    // The flag itself was never set, but the row is no longer running.
    assert!(store.stop_requested(id).await.unwrap());
}

#[doc(hidden)]
pub async fn update_progress_round_trips(store: impl JobStore) {
    let id = store.enqueue(NewJob::mock_job()).await.unwrap();
    store.claim_next().await.unwrap().unwrap();

    store
        .update_progress(id, Some("synced 3 of 7 pages"), Some(42))
        .await
        .unwrap();

    let job = store.job(id).await.unwrap().unwrap();
    assert_eq!(job.progress_message.as_deref(), Some("synced 3 of 7 pages"));
    assert_eq!(job.progress_percentage, Some(42));
}

#[doc(hidden)]
pub async fn update_progress_ignores_missing_job(store: impl JobStore) {
    assert!(store
        .update_progress(42.into(), Some("ghost"), Some(1))
        .await
        .is_ok());
}

#[doc(hidden)]
pub async fn job_returns_none_when_missing(store: impl JobStore) {
    assert!(store.job(42.into()).await.unwrap().is_none());
}

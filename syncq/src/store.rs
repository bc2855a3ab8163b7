//! The storage seam for job rows.
//!
//! [`JobStore`] is the only shared mutable surface in the system: producers
//! insert through it, the worker claims and transitions through it, and
//! running scripts report progress through it. Implementations must make
//! [`JobStore::claim_next`] atomic so concurrent claimants never receive the
//! same row.
use async_trait::async_trait;
use thiserror::Error;

use crate::job::{Job, JobId, NewJob, RetryDecision};

pub mod memory;
pub mod testing;

/// Durable, concurrency-safe persistence of [`Job`] rows.
#[async_trait]
pub trait JobStore {
    /// Inserts a new `pending` job and returns its id.
    async fn enqueue(&self, job: NewJob) -> Result<JobId, StoreError>;

    /// Atomically selects the highest-priority `pending` job (ties broken by
    /// earliest `created_at`), marks it `running` with `started_at` set, and
    /// returns it. Returns `None` when nothing is eligible.
    ///
    /// Concurrent callers must never claim the same row; this is the sole
    /// guard against double execution when several workers share a store.
    async fn claim_next(&self) -> Result<Option<Job>, StoreError>;

    /// Terminal success transition; sets `completed_at`.
    async fn mark_completed(&self, id: JobId) -> Result<(), StoreError>;

    /// Records a failure. If the retry budget allows, the job returns to
    /// `pending` with an incremented `retry_count`; otherwise it becomes
    /// terminally `failed` with `completed_at` set. Either way the error
    /// message is recorded on the row.
    async fn mark_failed(&self, id: JobId, error_message: &str)
        -> Result<RetryDecision, StoreError>;

    /// Terminal transition for a job whose stop request was honored.
    /// Distinct from `failed`: stopped jobs are never retried.
    async fn mark_stopped(&self, id: JobId) -> Result<(), StoreError>;

    /// Flags a `running` job to be stopped. A no-op for jobs in any other
    /// status; the flag is only ever consulted by the worker.
    async fn request_stop(&self, id: JobId) -> Result<(), StoreError>;

    /// Whether the worker should abandon this job: the stop flag is set, or
    /// the row is no longer `running` (e.g. it was rewritten externally).
    async fn stop_requested(&self, id: JobId) -> Result<bool, StoreError>;

    /// Best-effort progress write from the executing script. A missing row
    /// is ignored rather than reported: progress must never fail a script.
    async fn update_progress(
        &self,
        id: JobId,
        message: Option<&str>,
        percentage: Option<i16>,
    ) -> Result<(), StoreError>;

    /// Fetches a single job row, the function behind any status endpoint.
    async fn job(&self, id: JobId) -> Result<Option<Job>, StoreError>;
}

/// Errors surfaced by a [`JobStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("store in bad state")]
    BadState,
    #[error("database error: {0}")]
    Database(String),
}

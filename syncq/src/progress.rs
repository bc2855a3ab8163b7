//! Progress reporting for executing sync scripts.
//!
//! The worker exposes the job id to the child process through the
//! [`JOB_ID_ENV`] environment variable. A script that wants to surface
//! progress resolves the id from its environment and writes through the
//! store; when the variable is absent (e.g. a manual run outside the queue)
//! reporting quietly does nothing.
use crate::{
    job::JobId,
    store::JobStore,
};

/// Environment variable carrying the job id into the child process.
pub const JOB_ID_ENV: &str = "SYNCQ_JOB_ID";

/// Resolves the current job id from the environment.
///
/// Returns `None` when the variable is unset or does not parse; both cases
/// are expected for manual runs.
pub fn job_id_from_env() -> Option<JobId> {
    let raw = std::env::var(JOB_ID_ENV).ok()?;
    match raw.parse::<i64>() {
        Ok(id) => Some(id.into()),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {JOB_ID_ENV}: {raw}");
            None
        }
    }
}

/// Best-effort progress update for the job identified by [`JOB_ID_ENV`].
///
/// Failures are logged and swallowed: progress bookkeeping must never fail
/// the sync work itself.
pub async fn report<S: JobStore + ?Sized>(
    store: &S,
    message: Option<&str>,
    percentage: Option<i16>,
) {
    let Some(job_id) = job_id_from_env() else {
        tracing::debug!("{JOB_ID_ENV} not set, skipping progress update");
        return;
    };
    report_for(store, job_id, message, percentage).await;
}

/// Best-effort progress update for an explicit job id.
pub async fn report_for<S: JobStore + ?Sized>(
    store: &S,
    job_id: JobId,
    message: Option<&str>,
    percentage: Option<i16>,
) {
    if let Err(err) = store.update_progress(job_id, message, percentage).await {
        tracing::error!(?err, %job_id, "Failed to update progress for job {job_id}: {err}");
    }
}

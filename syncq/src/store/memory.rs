//! Provides an in memory implementation of [`JobStore`].
//!
//! Currently this is provided for testing purposes and not designed for use
//! in a production system.
//!
//! It is not optimized, instead it is designed to be a correct implementation
//! for use in a test setup.
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, RwLock,
};

use async_trait::async_trait;
use chrono::Utc;

use super::{JobStore, StoreError};
use crate::job::{Job, JobId, JobStatus, NewJob, RetryDecision};

/// An in memory implementation of [`JobStore`].
///
/// It is provided as a correct (but not optimized) implementation primarily
/// for use in testing circumstances.
///
/// **This is not designed for use in a production system.**
#[derive(Clone, Default)]
pub struct InMemoryStore {
    jobs: Arc<RwLock<Vec<Job>>>,
    id_counter: Arc<AtomicI64>,
}

impl InMemoryStore {
    /// Creates a new instance of [`InMemoryStore`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl NewJob {
    fn into_job(self, id: i64) -> Job {
        Job {
            id: id.into(),
            job_name: self.job_name,
            script_path: self.script_path,
            status: JobStatus::Pending,
            priority: self.priority as i32,
            retry_count: 0,
            max_retries: self.max_retries as i32,
            stop_requested: false,
            error_message: None,
            progress_message: None,
            progress_percentage: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

impl Job {
    fn mark_job_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    fn mark_job_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    fn mark_job_failed(&mut self, error_message: &str) -> RetryDecision {
        self.error_message = Some(error_message.to_owned());
        if self.is_final_attempt() {
            self.status = JobStatus::Failed;
            self.completed_at = Some(Utc::now());
            RetryDecision::Exhausted
        } else {
            self.retry_count += 1;
            self.status = JobStatus::Pending;
            self.started_at = None;
            RetryDecision::Requeued {
                retry_count: self.retry_count,
            }
        }
    }

    fn mark_job_stopped(&mut self) {
        self.status = JobStatus::Stopped;
        self.completed_at = Some(Utc::now());
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, StoreError> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.jobs
            .write()
            .map_err(|_| StoreError::BadState)?
            .push(job.into_job(id));
        Ok(id.into())
    }

    async fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        let mut eligible = jobs
            .iter_mut()
            .filter(|job| job.status == JobStatus::Pending)
            .collect::<Vec<_>>();
        eligible.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(eligible.first_mut().map(|job| {
            job.mark_job_running();
            job.to_owned()
        }))
    }

    async fn mark_completed(&self, id: JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        match jobs.iter_mut().find(|job| job.id == id) {
            None => Err(StoreError::JobNotFound(id)),
            Some(job) => {
                job.mark_job_completed();
                Ok(())
            }
        }
    }

    async fn mark_failed(
        &self,
        id: JobId,
        error_message: &str,
    ) -> Result<RetryDecision, StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        match jobs.iter_mut().find(|job| job.id == id) {
            None => Err(StoreError::JobNotFound(id)),
            Some(job) => Ok(job.mark_job_failed(error_message)),
        }
    }

    async fn mark_stopped(&self, id: JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        match jobs.iter_mut().find(|job| job.id == id) {
            None => Err(StoreError::JobNotFound(id)),
            Some(job) => {
                job.mark_job_stopped();
                Ok(())
            }
        }
    }

    async fn request_stop(&self, id: JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        match jobs.iter_mut().find(|job| job.id == id) {
            None => Err(StoreError::JobNotFound(id)),
            Some(job) => {
                if job.status == JobStatus::Running {
                    job.stop_requested = true;
                }
                Ok(())
            }
        }
    }

    async fn stop_requested(&self, id: JobId) -> Result<bool, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::BadState)?;
        match jobs.iter().find(|job| job.id == id) {
            None => Err(StoreError::JobNotFound(id)),
            Some(job) => Ok(job.stop_requested || job.status != JobStatus::Running),
        }
    }

    async fn update_progress(
        &self,
        id: JobId,
        message: Option<&str>,
        percentage: Option<i16>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::BadState)?;
        if let Some(job) = jobs.iter_mut().find(|job| job.id == id) {
            job.progress_message = message.map(ToOwned::to_owned);
            job.progress_percentage = percentage;
        }
        Ok(())
    }

    async fn job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| StoreError::BadState)?
            .iter()
            .find(|job| job.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;
    use crate::test_suite;

    test_suite!(for: InMemoryStore::new());

    #[tokio::test]
    async fn badstate_errors() {
        let store = InMemoryStore::new();
        let id = store.enqueue(NewJob::mock_job()).await.unwrap();

        tokio::task::spawn({
            let store = store.clone();
            async move {
                let _guard = store.jobs.write();
                panic!()
            }
        })
        .await
        .unwrap_err();

        assert_matches!(
            store.enqueue(NewJob::mock_job()).await,
            Err(StoreError::BadState)
        );
        assert_matches!(store.claim_next().await, Err(StoreError::BadState));
        assert_matches!(store.mark_completed(id).await, Err(StoreError::BadState));
        assert_matches!(
            store.mark_failed(id, "oh dear").await,
            Err(StoreError::BadState)
        );
        assert_matches!(store.mark_stopped(id).await, Err(StoreError::BadState));
        assert_matches!(store.request_stop(id).await, Err(StoreError::BadState));
        assert_matches!(store.stop_requested(id).await, Err(StoreError::BadState));
        assert_matches!(
            store.update_progress(id, None, None).await,
            Err(StoreError::BadState)
        );
        assert_matches!(store.job(id).await, Err(StoreError::BadState));
    }
}

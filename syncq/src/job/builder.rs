//! Builder surface for enqueuing jobs.
use crate::{
    global_store::GlobalStore,
    store::JobStore,
    SyncqError,
};

use super::{JobId, NewJob};

/// Builder for inserting a job into the queue.
///
/// The job name and script path are mandatory; priority defaults to `0` and
/// the retry budget to [`JobBuilder::DEFAULT_MAX_RETRIES`].
///
/// # Example
///
/// ```no_run
/// # use syncq::job::builder::JobBuilder;
/// # use syncq::store::memory::InMemoryStore;
/// # async fn example() -> Result<(), syncq::SyncqError> {
/// # let store = InMemoryStore::new();
/// let job_id = JobBuilder::new("Purchase achievements sync", "/opt/sync/purchase_achievements.py")
///     .with_priority(3)
///     .with_max_retries(1)
///     .enqueue_to_store(&store)
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct JobBuilder {
    job_name: String,
    script_path: String,
    priority: u16,
    max_retries: u16,
}

impl JobBuilder {
    /// The retry budget used when [`JobBuilder::with_max_retries`] is not
    /// called.
    pub const DEFAULT_MAX_RETRIES: u16 = 3;

    pub fn new(job_name: impl Into<String>, script_path: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            script_path: script_path.into(),
            priority: 0,
            max_retries: Self::DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_priority(self, priority: u16) -> Self {
        Self { priority, ..self }
    }

    pub fn with_max_retries(self, max_retries: u16) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    /// Enqueues via the global store set with
    /// [`crate::Syncq::set_global_store`].
    pub async fn enqueue(self) -> Result<JobId, SyncqError> {
        let store = GlobalStore::as_ref()?;
        self.enqueue_to_store(store).await
    }

    /// Enqueues to the provided store.
    pub async fn enqueue_to_store<S: JobStore + ?Sized>(
        self,
        store: &S,
    ) -> Result<JobId, SyncqError> {
        let job_id = store.enqueue(self.into()).await?;
        Ok(job_id)
    }
}

impl From<JobBuilder> for NewJob {
    fn from(value: JobBuilder) -> Self {
        Self {
            job_name: value.job_name,
            script_path: value.script_path,
            priority: value.priority,
            max_retries: value.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn enqueue_to_store() {
        let store = InMemoryStore::new();

        let job_id = JobBuilder::new("Weekly contact phase rollup", "/opt/sync/phases.py")
            .with_priority(5)
            .with_max_retries(2)
            .enqueue_to_store(&store)
            .await
            .unwrap();

        let job = store.job(job_id).await.unwrap().unwrap();
        assert_eq!(job.job_name, "Weekly contact phase rollup");
        assert_eq!(job.script_path, "/opt/sync/phases.py");
        assert_eq!(job.priority, 5);
        assert_eq!(job.max_retries, 2);
    }

    #[tokio::test]
    async fn defaults() {
        let store = InMemoryStore::new();

        let job_id = JobBuilder::new("job", "/opt/sync/job.sh")
            .enqueue_to_store(&store)
            .await
            .unwrap();

        let job = store.job(job_id).await.unwrap().unwrap();
        assert_eq!(job.priority, 0);
        assert_eq!(
            job.max_retries,
            JobBuilder::DEFAULT_MAX_RETRIES as i32
        );
    }
}

//! A batch job queue and worker for CRM sync scripts.
//!
//! Jobs live in a durable store (see [`store::JobStore`]); producers insert
//! them via [`job::builder::JobBuilder`] or on a timer via
//! [`schedule::ScheduleConfig`], and a single polling [`worker::Worker`]
//! executes each job's script as a child process, enforcing a timeout and
//! cooperative stop requests along the way.
//!
//! # Example
//!
//! ```no_run
//! use syncq::prelude::*;
//! use syncq::store::memory::InMemoryStore;
//!
//! # async fn example() -> Result<(), syncq::SyncqError> {
//! let supervisor = Syncq::new(InMemoryStore::new())
//!     .with_worker(WorkerConfig::default())
//!     .set_global_store()?;
//!
//! let job_id = JobBuilder::new("Purchase achievements sync", "/opt/sync/purchase_achievements.py")
//!     .with_priority(3)
//!     .enqueue()
//!     .await?;
//!
//! supervisor.graceful_shutdown().await?;
//! # Ok(())
//! # }
//! ```
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod catalog;
pub mod global_store;
pub mod job;
pub mod prelude;
pub mod progress;
pub mod schedule;
pub mod store;
pub mod worker;

use global_store::GlobalStore;
use schedule::{runner::ScheduleRunner, ScheduleConfig};
use store::{JobStore, StoreError};
use worker::{Worker, WorkerConfig};

/// Supervisor owning the background tasks of the queue: workers and
/// schedules.
pub struct Syncq<S> {
    store: S,
    cancellation_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl<S> Syncq<S>
where
    S: JobStore + Clone + Send + Sync + 'static,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cancellation_token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Spawns a polling worker against this store.
    ///
    /// A single worker executes one job at a time; spawning several is safe
    /// because claiming is atomic in the store.
    pub fn with_worker(mut self, config: WorkerConfig) -> Self {
        let worker = Worker::new(self.store.clone(), config);
        self.handles
            .push(tokio::spawn(worker.run(self.cancellation_token.clone())));
        self
    }

    /// Spawns the timed producer for the given schedule config.
    pub fn with_schedule(mut self, config: ScheduleConfig) -> Self {
        let runner = ScheduleRunner::new(self.store.clone(), config);
        self.handles
            .extend(runner.spawn(self.cancellation_token.clone()));
        self
    }

    /// Registers this store as the process-global one, enabling
    /// [`job::builder::JobBuilder::enqueue`] without a store reference.
    pub fn set_global_store(self) -> Result<Self, SyncqError> {
        GlobalStore::set(self.store.clone())?;
        Ok(self)
    }

    /// Access to the underlying store, e.g. for status lookups or stop
    /// requests from an API handler.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Signals all spawned tasks to stop and waits for them to finish. A
    /// worker that is mid-job drives that job to its terminal status first.
    pub async fn graceful_shutdown(self) -> Result<(), SyncqError> {
        tracing::debug!("Shutting down syncq tasks");
        self.cancellation_token.cancel();
        futures::future::join_all(self.handles)
            .await
            .into_iter()
            .map(|result| result.map_err(|_| SyncqError::GracefulShutdownFailed))
            .collect::<Result<Vec<()>, _>>()?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SyncqError {
    #[error("Failed to gracefully shut down")]
    GracefulShutdownFailed,
    #[error("Error communicating with the job store")]
    Store(#[from] StoreError),
    #[error("Error setting or accessing the global store")]
    GlobalStore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{job::builder::JobBuilder, store::memory::InMemoryStore};

    #[tokio::test]
    async fn setup_and_shutdown() {
        let supervisor = Syncq::new(InMemoryStore::new()).with_worker(WorkerConfig::default());
        supervisor.graceful_shutdown().await.unwrap();
    }

    // The global store can only be set once per process, so everything that
    // exercises it lives in this single test.
    #[tokio::test]
    async fn global_store_enqueue() {
        let store = InMemoryStore::new();
        let supervisor = Syncq::new(store.clone()).set_global_store().unwrap();

        let job_id = JobBuilder::new("global", "/opt/sync/global.sh")
            .enqueue()
            .await
            .unwrap();

        assert!(store.job(job_id).await.unwrap().is_some());
        assert!(matches!(
            Syncq::new(store).set_global_store(),
            Err(SyncqError::GlobalStore)
        ));
        supervisor.graceful_shutdown().await.unwrap();
    }
}

use std::{ops::Sub, time::Duration};

use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::store::JobStore;

use super::{ScheduleConfig, ScheduleEntry};

pub(crate) struct ScheduleRunner<S> {
    config: ScheduleConfig,
    store: S,
}

impl<S> ScheduleRunner<S>
where
    S: JobStore + Clone + Send + Sync + 'static,
{
    pub fn new(store: S, config: ScheduleConfig) -> Self {
        Self { store, config }
    }

    pub fn spawn(self, cancellation_token: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        self.config
            .entries
            .into_iter()
            .map(|entry| {
                tokio::spawn(Self::run_entry(
                    self.store.clone(),
                    entry,
                    cancellation_token.clone(),
                ))
            })
            .collect()
    }

    async fn run_entry(store: S, entry: ScheduleEntry, cancellation_token: CancellationToken) {
        loop {
            let Some(next) = entry.schedule.upcoming(Utc).next() else {
                tracing::warn!(
                    "No future scheduled time for job {:?}, stopping its schedule",
                    entry.job.job_name,
                );
                break;
            };
            let delay = next
                .sub(Utc::now())
                .sub(TimeDelta::milliseconds(10))
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = store
                        .enqueue(entry.job.clone())
                        .await
                        .inspect(|job_id| {
                            tracing::info!(
                                %job_id,
                                "Enqueued scheduled job {:?} as {job_id}", entry.job.job_name,
                            );
                        })
                        .inspect_err(|err| {
                            tracing::error!(
                                ?err,
                                "Failed to enqueue scheduled job {:?}: {err}", entry.job.job_name,
                            );
                        });
                    let delay = next - Utc::now();
                    if delay > TimeDelta::zero() {
                        tokio::time::sleep(delay.to_std().unwrap_or(Duration::ZERO)).await;
                    }
                }
                _ = cancellation_token.cancelled() => {
                    tracing::debug!("Shutting down schedule for {:?}", entry.job.job_name);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;
    use crate::{
        job::{JobStatus, NewJob},
        schedule::ScheduleConfig,
        store::memory::InMemoryStore,
    };

    #[tokio::test]
    async fn enqueues_when_the_schedule_fires() {
        let store = InMemoryStore::new();
        // Every second.
        let config = ScheduleConfig::new().with_job(
            cron::Schedule::from_str("* * * * * * *").unwrap(),
            NewJob::mock_job(),
        );
        let token = CancellationToken::new();

        let handles = ScheduleRunner::new(store.clone(), config).spawn(token.clone());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        token.cancel();
        for handle in handles {
            let _ = handle.await;
        }

        let job = store
            .claim_next()
            .await
            .unwrap()
            .expect("schedule should have produced at least one job");
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.job_name, NewJob::mock_job().job_name);
    }
}

use async_trait::async_trait;
use syncq::{
    job::{Job, JobId, NewJob, RetryDecision},
    store::{JobStore, StoreError},
};
use tracing::instrument;

use crate::{
    map_err,
    types::{JobRow, JobStatus},
    SyncqPgStore,
};

const JOB_COLUMNS: &str = r#"
    id,
    job_name,
    script_path,
    status,
    priority,
    retry_count,
    max_retries,
    stop_requested,
    error_message,
    progress_message,
    progress_percentage,
    created_at,
    started_at,
    completed_at
"#;

impl SyncqPgStore {
    fn handle_update(result: sqlx::Result<u64>, job_id: JobId) -> Result<(), StoreError> {
        match result {
            Ok(0) => Err(StoreError::JobNotFound(job_id)),
            Ok(1) => Ok(()),
            Ok(_) => Err(StoreError::BadState),
            Err(error) => Err(map_err(error)),
        }
    }
}

#[async_trait]
impl JobStore for SyncqPgStore {
    #[instrument(skip(self))]
    async fn enqueue(&self, job: NewJob) -> Result<JobId, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO sync_jobs (job_name, script_path, priority, max_retries)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&job.job_name)
        .bind(&job.script_path)
        .bind(job.priority as i32)
        .bind(job.max_retries as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(id.into())
    }

    async fn claim_next(&self) -> Result<Option<Job>, StoreError> {
        let claim = format!(
            r#"UPDATE sync_jobs
            SET
                status = 'running',
                started_at = now()
            WHERE id IN (
                SELECT id FROM sync_jobs
                WHERE status = 'pending'
                ORDER BY priority DESC, created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}"#,
        );
        let row = sqlx::query_as::<_, JobRow>(&claim)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(Into::into))
    }

    async fn mark_completed(&self, id: JobId) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE sync_jobs
            SET
                status = 'completed',
                completed_at = now()
            WHERE id = $1"#,
        )
        .bind(i64::from(id))
        .execute(&self.pool)
        .await
        .map(|done| done.rows_affected());
        Self::handle_update(result, id)
    }

    async fn mark_failed(
        &self,
        id: JobId,
        error_message: &str,
    ) -> Result<RetryDecision, StoreError> {
        let row = sqlx::query_as::<_, (JobStatus, i32)>(
            r#"UPDATE sync_jobs
            SET
                error_message = $2,
                status = CASE WHEN retry_count < max_retries
                    THEN 'pending'::sync_job_state
                    ELSE 'failed'::sync_job_state END,
                retry_count = CASE WHEN retry_count < max_retries
                    THEN retry_count + 1
                    ELSE retry_count END,
                started_at = CASE WHEN retry_count < max_retries
                    THEN NULL
                    ELSE started_at END,
                completed_at = CASE WHEN retry_count < max_retries
                    THEN NULL
                    ELSE now() END
            WHERE id = $1
            RETURNING status, retry_count"#,
        )
        .bind(i64::from(id))
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        match row {
            None => Err(StoreError::JobNotFound(id)),
            Some((JobStatus::Pending, retry_count)) => Ok(RetryDecision::Requeued { retry_count }),
            Some((JobStatus::Failed, _)) => Ok(RetryDecision::Exhausted),
            Some(_) => Err(StoreError::BadState),
        }
    }

    async fn mark_stopped(&self, id: JobId) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE sync_jobs
            SET
                status = 'stopped',
                completed_at = now()
            WHERE id = $1"#,
        )
        .bind(i64::from(id))
        .execute(&self.pool)
        .await
        .map(|done| done.rows_affected());
        Self::handle_update(result, id)
    }

    async fn request_stop(&self, id: JobId) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"UPDATE sync_jobs
            SET stop_requested = TRUE
            WHERE id = $1 AND status = 'running'"#,
        )
        .bind(i64::from(id))
        .execute(&self.pool)
        .await
        .map_err(map_err)?
        .rows_affected();
        if updated == 1 {
            return Ok(());
        }
        // Not running: a no-op, unless the row does not exist at all.
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM sync_jobs WHERE id = $1)",
        )
        .bind(i64::from(id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::JobNotFound(id))
        }
    }

    async fn stop_requested(&self, id: JobId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT stop_requested OR status <> 'running' FROM sync_jobs WHERE id = $1",
        )
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?
        .ok_or(StoreError::JobNotFound(id))
    }

    async fn update_progress(
        &self,
        id: JobId,
        message: Option<&str>,
        percentage: Option<i16>,
    ) -> Result<(), StoreError> {
        // Best effort: a vanished row is not an error for the reporting
        // script.
        sqlx::query(
            r#"UPDATE sync_jobs
            SET
                progress_message = $2,
                progress_percentage = $3
            WHERE id = $1"#,
        )
        .bind(i64::from(id))
        .bind(message)
        .bind(percentage)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let select = format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&select)
            .bind(i64::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(row.map(Into::into))
    }
}

#[cfg(test)]
mod test {
    use sqlx::PgPool;
    use syncq::job::JobStatus;

    use super::*;

    syncq::test_suite!(
        attr: sqlx::test,
        args: (pool: PgPool),
        store: SyncqPgStore::from_pool(pool).await.unwrap()
    );

    #[sqlx::test]
    async fn enqueue_applies_column_defaults(pool: PgPool) {
        let store = SyncqPgStore::from_pool(pool).await.unwrap();

        let id = store
            .enqueue(NewJob {
                job_name: "defaults".to_owned(),
                script_path: "/opt/sync/defaults.sh".to_owned(),
                priority: 0,
                max_retries: 3,
            })
            .await
            .unwrap();

        let job = store.job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert!(!job.stop_requested);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.error_message.is_none());
    }

    #[sqlx::test]
    async fn claimed_job_is_not_visible_to_a_second_claim(pool: PgPool) {
        let store = SyncqPgStore::from_pool(pool).await.unwrap();
        store
            .enqueue(NewJob {
                job_name: "single".to_owned(),
                script_path: "/opt/sync/single.sh".to_owned(),
                priority: 0,
                max_retries: 0,
            })
            .await
            .unwrap();

        assert!(store.claim_next().await.unwrap().is_some());
        assert!(store.claim_next().await.unwrap().is_none());
    }
}

use chrono::{DateTime, Utc};
use sqlx::prelude::FromRow;

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "sync_job_state", rename_all = "lowercase")]
pub(crate) enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl From<JobStatus> for syncq::job::JobStatus {
    fn from(value: JobStatus) -> Self {
        match value {
            JobStatus::Pending => Self::Pending,
            JobStatus::Running => Self::Running,
            JobStatus::Completed => Self::Completed,
            JobStatus::Failed => Self::Failed,
            JobStatus::Stopped => Self::Stopped,
        }
    }
}

impl From<syncq::job::JobStatus> for JobStatus {
    fn from(value: syncq::job::JobStatus) -> Self {
        match value {
            syncq::job::JobStatus::Pending => Self::Pending,
            syncq::job::JobStatus::Running => Self::Running,
            syncq::job::JobStatus::Completed => Self::Completed,
            syncq::job::JobStatus::Failed => Self::Failed,
            syncq::job::JobStatus::Stopped => Self::Stopped,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct JobRow {
    pub id: i64,
    pub job_name: String,
    pub script_path: String,
    pub status: JobStatus,
    pub priority: i32,
    pub retry_count: i32,
    pub max_retries: i32,
    pub stop_requested: bool,
    pub error_message: Option<String>,
    pub progress_message: Option<String>,
    pub progress_percentage: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobRow> for syncq::job::Job {
    fn from(value: JobRow) -> Self {
        Self {
            id: value.id.into(),
            job_name: value.job_name,
            script_path: value.script_path,
            status: value.status.into(),
            priority: value.priority,
            retry_count: value.retry_count,
            max_retries: value.max_retries,
            stop_requested: value.stop_requested,
            error_message: value.error_message,
            progress_message: value.progress_message,
            progress_percentage: value.progress_percentage,
            created_at: value.created_at,
            started_at: value.started_at,
            completed_at: value.completed_at,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [
            syncq::job::JobStatus::Pending,
            syncq::job::JobStatus::Running,
            syncq::job::JobStatus::Completed,
            syncq::job::JobStatus::Failed,
            syncq::job::JobStatus::Stopped,
        ] {
            assert_eq!(syncq::job::JobStatus::from(JobStatus::from(status)), status);
        }
    }
}

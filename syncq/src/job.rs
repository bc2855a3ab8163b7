//! The job data model.
//!
//! A [`Job`] is one row of scheduled work: which script to run, how urgent it
//! is, how often it may be retried, and where it currently sits in its
//! lifecycle. Rows are written by the producer side (see
//! [`builder::JobBuilder`]) and driven to a terminal status by the worker.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod builder;

/// Identifier of a persisted job, assigned by the store on insert.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct JobId(i64);

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<JobId> for i64 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted unit of scheduled work.
///
/// Jobs are never deleted by the system: terminal rows are retained as the
/// audit trail and the data behind the status surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    /// Human-readable label, e.g. `"Weekly contact phase rollup"`.
    pub job_name: String,
    /// Path of the executable the worker will run for this job.
    pub script_path: String,
    pub status: JobStatus,
    /// Higher priority jobs are claimed first; ties broken by `created_at`.
    pub priority: i32,
    /// Number of times this job has been requeued after a failure.
    pub retry_count: i32,
    pub max_retries: i32,
    /// Set by an external actor while the job is running; consulted by the
    /// worker's monitor loop, never by producers.
    pub stop_requested: bool,
    pub error_message: Option<String>,
    /// Free-form progress reported by the running script itself.
    pub progress_message: Option<String>,
    pub progress_percentage: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Whether the next failure would exhaust the retry budget.
    pub fn is_final_attempt(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// The lifecycle of a [`Job`].
///
/// ```text
/// pending -> running -> completed
///                    -> pending   (failure with retries left)
///                    -> failed    (failure, retries exhausted, or timeout)
///                    -> stopped   (stop requested while running)
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    /// Terminal statuses are never left once entered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        write!(f, "{value}")
    }
}

/// The payload accepted by [`crate::store::JobStore::enqueue`].
///
/// Two enqueues with identical fields produce two distinct jobs: there is no
/// deduplication on this surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub job_name: String,
    pub script_path: String,
    pub priority: u16,
    pub max_retries: u16,
}

/// The store's verdict after recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The job went back to `pending` with the given (incremented) retry
    /// count.
    Requeued { retry_count: i32 },
    /// The retry budget is spent; the job is terminally `failed`.
    Exhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_round_trips_through_i64() {
        let id = JobId::from(42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&JobStatus::Pending).unwrap();
        assert_eq!(json, r#""pending""#);
        let status: JobStatus = serde_json::from_str(r#""stopped""#).unwrap();
        assert_eq!(status, JobStatus::Stopped);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
    }
}

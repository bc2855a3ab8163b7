//! The polling worker that drives jobs to a terminal status.
//!
//! A single worker claims one job at a time and runs its script as a child
//! process. While the child runs, a monitor wakes at a fixed cadence to check
//! for a stop request and for timeout expiry; either one force-terminates the
//! child. The worker itself never exits because of a job: every script and
//! store failure is recorded against the job (or logged) and the loop
//! continues.
use std::{path::PathBuf, process::Stdio, time::Duration};

use rand::Rng;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    job::{Job, JobId, RetryDecision},
    progress,
    store::JobStore,
};

/// How long a terminated child is given to be reaped before we log and move
/// on.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Upper bound on the retained tail of each output channel.
const OUTPUT_TAIL_LIMIT: usize = 8 * 1024;

/// Tuning knobs for a [`Worker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How long to sleep when the queue is empty or the store errored.
    pub poll_interval: Duration,
    /// Maximum random addition to the poll sleep, to avoid workers on a
    /// shared store polling in lockstep.
    pub poll_jitter: Duration,
    /// Cadence of the stop/timeout checks while a script is running.
    pub check_interval: Duration,
    /// Wall-clock budget for a single script run.
    pub job_timeout: Duration,
    /// Working directory for script execution.
    pub working_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            poll_jitter: Duration::from_secs(1),
            check_interval: Duration::from_secs(2),
            job_timeout: Duration::from_secs(3600),
            working_dir: None,
        }
    }
}

/// The outcome of one script run, before it is written back to the store.
#[derive(Debug)]
enum ScriptOutcome {
    Completed,
    Failed { error: String },
    Stopped,
    TimedOut,
}

/// A single polling worker bound to a store.
pub struct Worker<S> {
    store: S,
    config: WorkerConfig,
}

impl<S> Worker<S>
where
    S: JobStore + Send + Sync + 'static,
{
    pub fn new(store: S, config: WorkerConfig) -> Self {
        Self { store, config }
    }

    /// Runs until the token is cancelled. Cancellation is observed between
    /// jobs: a job that is already executing is driven to its terminal
    /// status first.
    pub async fn run(self, cancellation_token: CancellationToken) {
        tracing::info!("Sync job worker started");
        loop {
            if cancellation_token.is_cancelled() {
                break;
            }
            match self.store.claim_next().await {
                Ok(Some(job)) => {
                    self.process_job(job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.sleep_duration_with_jitter()) => {}
                        _ = cancellation_token.cancelled() => break,
                    }
                }
                Err(err) => {
                    tracing::error!(?err, "Failed to claim next job: {err}");
                    tokio::select! {
                        _ = tokio::time::sleep(self.sleep_duration_with_jitter()) => {}
                        _ = cancellation_token.cancelled() => break,
                    }
                }
            }
        }
        tracing::debug!("Shutting down sync job worker");
    }

    fn sleep_duration_with_jitter(&self) -> Duration {
        if self.config.poll_jitter.is_zero() {
            return self.config.poll_interval;
        }
        let jitter_millis = u64::try_from(self.config.poll_jitter.as_millis()).unwrap_or(u64::MAX);
        let random_jitter = rand::thread_rng().gen_range(0..=jitter_millis);
        self.config.poll_interval + Duration::from_millis(random_jitter)
    }

    async fn process_job(&self, job: Job) {
        let job_id = job.id;
        tracing::info!(%job_id, "Starting job {job_id}: {}", job.job_name);

        match self.run_script(&job).await {
            ScriptOutcome::Completed => {
                progress::report_for(&self.store, job_id, Some("done"), Some(100)).await;
                match self.store.mark_completed(job_id).await {
                    Ok(()) => tracing::info!(%job_id, "Job {job_id} completed"),
                    Err(err) => tracing::error!(
                        ?err,
                        %job_id,
                        "Failed to mark job {job_id} as completed: {err}",
                    ),
                }
            }
            ScriptOutcome::Stopped => match self.store.mark_stopped(job_id).await {
                Ok(()) => tracing::info!(%job_id, "Job {job_id} stopped on request"),
                Err(err) => tracing::error!(
                    ?err,
                    %job_id,
                    "Failed to mark job {job_id} as stopped: {err}",
                ),
            },
            ScriptOutcome::TimedOut => {
                let error = format!(
                    "job timed out after {}s",
                    self.config.job_timeout.as_secs()
                );
                self.record_failure(job_id, &error).await;
            }
            ScriptOutcome::Failed { error } => self.record_failure(job_id, &error).await,
        }
    }

    async fn record_failure(&self, job_id: JobId, error: &str) {
        match self.store.mark_failed(job_id, error).await {
            Ok(RetryDecision::Requeued { retry_count }) => tracing::warn!(
                %job_id,
                "Job {job_id} failed and was requeued (retry {retry_count}): {error}",
            ),
            Ok(RetryDecision::Exhausted) => {
                tracing::error!(%job_id, "Job {job_id} failed permanently: {error}")
            }
            Err(err) => tracing::error!(
                ?err,
                %job_id,
                "Failed to record failure for job {job_id}: {err}",
            ),
        }
    }

    /// Launches the job's script and supervises it to completion or forced
    /// termination. Launch errors are folded into a failed outcome so the
    /// caller has a single path back to the store.
    async fn run_script(&self, job: &Job) -> ScriptOutcome {
        let mut command = Command::new(&job.script_path);
        command
            .env(progress::JOB_ID_ENV, job.id.to_string())
            // The sync scripts are Python; without this their output only
            // shows up at process exit.
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ScriptOutcome::Failed {
                    error: format!("failed to launch {}: {err}", job.script_path),
                }
            }
        };

        let stdout = spawn_output_reader(child.stdout.take(), job.id, false);
        let stderr = spawn_output_reader(child.stderr.take(), job.id, true);

        let started = Instant::now();
        loop {
            match tokio::time::timeout(self.config.check_interval, child.wait()).await {
                Ok(status) => {
                    let (stdout, stderr) = collect_output(stdout, stderr).await;
                    return match status {
                        Ok(status) if status.success() => ScriptOutcome::Completed,
                        Ok(status) => ScriptOutcome::Failed {
                            error: failure_message(status.to_string(), stdout, stderr),
                        },
                        Err(err) => ScriptOutcome::Failed {
                            error: format!("failed to await script: {err}"),
                        },
                    };
                }
                // Still running: run the periodic checks. Stop wins over
                // timeout when both hold in one cycle.
                Err(_elapsed) => {
                    if self.stop_requested(job.id).await {
                        tracing::info!(
                            job_id = %job.id,
                            "Stop requested for job {}, terminating script", job.id,
                        );
                        terminate(&mut child, job.id).await;
                        return ScriptOutcome::Stopped;
                    }
                    if started.elapsed() >= self.config.job_timeout {
                        tracing::warn!(
                            job_id = %job.id,
                            "Job {} exceeded its timeout, terminating script", job.id,
                        );
                        terminate(&mut child, job.id).await;
                        return ScriptOutcome::TimedOut;
                    }
                }
            }
        }
    }

    async fn stop_requested(&self, job_id: JobId) -> bool {
        match self.store.stop_requested(job_id).await {
            Ok(stop) => stop,
            Err(err) => {
                tracing::error!(?err, %job_id, "Stop check failed for job {job_id}: {err}");
                false
            }
        }
    }
}

/// Force-kills the child and waits briefly for it to be reaped.
async fn terminate(child: &mut Child, job_id: JobId) {
    if let Err(err) = child.start_kill() {
        tracing::error!(?err, %job_id, "Failed to kill script for job {job_id}: {err}");
    }
    match tokio::time::timeout(KILL_GRACE, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            tracing::error!(?err, %job_id, "Failed to reap script for job {job_id}: {err}")
        }
        Err(_) => tracing::error!(%job_id, "Script for job {job_id} did not exit after kill"),
    }
}

/// Streams one output channel into the log line by line, retaining a capped
/// tail for the failure message.
fn spawn_output_reader<R>(
    reader: Option<R>,
    job_id: JobId,
    is_stderr: bool,
) -> Option<JoinHandle<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let reader = reader?;
    Some(tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut tail = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                tracing::warn!(%job_id, "[job {job_id} stderr] {line}");
            } else {
                tracing::info!(%job_id, "[job {job_id} stdout] {line}");
            }
            push_capped(&mut tail, &line);
        }
        tail
    }))
}

fn push_capped(buffer: &mut String, line: &str) {
    buffer.push_str(line);
    buffer.push('\n');
    if buffer.len() > OUTPUT_TAIL_LIMIT {
        let mut cut = buffer.len() - OUTPUT_TAIL_LIMIT;
        while !buffer.is_char_boundary(cut) {
            cut += 1;
        }
        buffer.drain(..cut);
    }
}

async fn collect_output(
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
) -> (String, String) {
    let stdout = match stdout {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };
    let stderr = match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };
    (stdout, stderr)
}

fn failure_message(status: String, stdout: String, stderr: String) -> String {
    let mut message = if stderr.trim().is_empty() {
        format!("script exited with {status}")
    } else {
        stderr
    };
    if !stdout.trim().is_empty() {
        message.push_str("\nstdout: ");
        message.push_str(stdout.trim_end());
    }
    message
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::{
        job::{builder::JobBuilder, JobStatus},
        store::memory::InMemoryStore,
    };

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(25),
            poll_jitter: Duration::ZERO,
            check_interval: Duration::from_millis(100),
            job_timeout: Duration::from_secs(30),
            working_dir: None,
        }
    }

    fn write_script(contents: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let path = std::env::temp_dir().join(format!(
            "syncq-worker-test-{}-{}.sh",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst),
        ));
        std::fs::write(&path, contents).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn spawn_worker(store: &InMemoryStore, config: WorkerConfig) -> CancellationToken {
        let token = CancellationToken::new();
        tokio::spawn(Worker::new(store.clone(), config).run(token.clone()));
        token
    }

    async fn wait_for_status(
        store: &InMemoryStore,
        id: crate::job::JobId,
        status: JobStatus,
    ) -> Job {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let job = store.job(id).await.unwrap().unwrap();
            if job.status == status {
                return job;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {status}, job: {job:?}",
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn successful_script_completes_the_job() {
        let store = InMemoryStore::new();
        let script = write_script("#!/bin/sh\nexit 0\n");
        let id = JobBuilder::new("noop", script.to_string_lossy())
            .enqueue_to_store(&store)
            .await
            .unwrap();

        let token = spawn_worker(&store, fast_config());

        let job = wait_for_status(&store, id, JobStatus::Completed).await;
        assert!(job.completed_at.is_some());
        assert_eq!(job.progress_percentage, Some(100));
        token.cancel();
    }

    #[tokio::test]
    async fn failing_script_records_stderr_and_exhausts_retries() {
        let store = InMemoryStore::new();
        let script = write_script("#!/bin/sh\necho 'boom' >&2\nexit 1\n");
        let id = JobBuilder::new("always fails", script.to_string_lossy())
            .with_max_retries(1)
            .enqueue_to_store(&store)
            .await
            .unwrap();

        let token = spawn_worker(&store, fast_config());

        let job = wait_for_status(&store, id, JobStatus::Failed).await;
        assert_eq!(job.retry_count, 1);
        assert!(job.error_message.unwrap().contains("boom"));
        token.cancel();
    }

    #[tokio::test]
    async fn script_sees_its_job_id_in_the_environment() {
        let store = InMemoryStore::new();
        let script = write_script("#!/bin/sh\necho \"job=$SYNCQ_JOB_ID\" >&2\nexit 1\n");
        let id = JobBuilder::new("echo id", script.to_string_lossy())
            .with_max_retries(0)
            .enqueue_to_store(&store)
            .await
            .unwrap();

        let token = spawn_worker(&store, fast_config());

        let job = wait_for_status(&store, id, JobStatus::Failed).await;
        assert!(job.error_message.unwrap().contains(&format!("job={id}")));
        token.cancel();
    }

    #[tokio::test]
    async fn stop_request_terminates_a_long_running_script() {
        let store = InMemoryStore::new();
        let script = write_script("#!/bin/sh\nsleep 30\n");
        let id = JobBuilder::new("long runner", script.to_string_lossy())
            .enqueue_to_store(&store)
            .await
            .unwrap();

        let token = spawn_worker(&store, fast_config());

        wait_for_status(&store, id, JobStatus::Running).await;
        store.request_stop(id).await.unwrap();

        let stop_observed = Instant::now();
        let job = wait_for_status(&store, id, JobStatus::Stopped).await;
        assert!(stop_observed.elapsed() < Duration::from_secs(5));
        assert!(job.completed_at.is_some());
        token.cancel();
    }

    #[tokio::test]
    async fn timed_out_script_is_terminated_and_failed() {
        let store = InMemoryStore::new();
        let script = write_script("#!/bin/sh\nsleep 30\n");
        let id = JobBuilder::new("too slow", script.to_string_lossy())
            .with_max_retries(0)
            .enqueue_to_store(&store)
            .await
            .unwrap();

        let config = WorkerConfig {
            job_timeout: Duration::from_millis(300),
            ..fast_config()
        };
        let token = spawn_worker(&store, config);

        let job = wait_for_status(&store, id, JobStatus::Failed).await;
        assert!(job.error_message.unwrap().contains("timed out"));
        token.cancel();
    }

    #[tokio::test]
    async fn missing_script_is_recorded_as_a_job_failure() {
        let store = InMemoryStore::new();
        let id = JobBuilder::new("ghost", "/nonexistent/sync-script.sh")
            .with_max_retries(0)
            .enqueue_to_store(&store)
            .await
            .unwrap();

        let token = spawn_worker(&store, fast_config());

        let job = wait_for_status(&store, id, JobStatus::Failed).await;
        assert!(job.error_message.unwrap().contains("failed to launch"));
        token.cancel();
    }

    #[tokio::test]
    async fn worker_keeps_going_after_a_job_failure() {
        let store = InMemoryStore::new();
        let failing = write_script("#!/bin/sh\nexit 1\n");
        let succeeding = write_script("#!/bin/sh\nexit 0\n");

        // Higher priority, so the failing job is claimed first.
        let failed_id = JobBuilder::new("bad", failing.to_string_lossy())
            .with_priority(1)
            .with_max_retries(0)
            .enqueue_to_store(&store)
            .await
            .unwrap();
        let ok_id = JobBuilder::new("good", succeeding.to_string_lossy())
            .enqueue_to_store(&store)
            .await
            .unwrap();

        let token = spawn_worker(&store, fast_config());

        wait_for_status(&store, failed_id, JobStatus::Failed).await;
        wait_for_status(&store, ok_id, JobStatus::Completed).await;
        token.cancel();
    }

    #[test]
    fn push_capped_retains_the_tail() {
        let mut buffer = String::new();
        for i in 0..1000 {
            push_capped(&mut buffer, &format!("line number {i}"));
        }
        assert!(buffer.len() <= OUTPUT_TAIL_LIMIT);
        assert!(buffer.ends_with("line number 999\n"));
        assert!(!buffer.contains("line number 0\n"));
    }

    #[test]
    fn failure_message_prefers_stderr() {
        let message = failure_message(
            "exit status: 1".to_owned(),
            "partial output".to_owned(),
            "it broke".to_owned(),
        );
        assert!(message.starts_with("it broke"));
        assert!(message.contains("stdout: partial output"));

        let message = failure_message("exit status: 2".to_owned(), String::new(), String::new());
        assert_eq!(message, "script exited with exit status: 2");
    }
}

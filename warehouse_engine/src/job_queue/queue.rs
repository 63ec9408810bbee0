use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::job_queue::{Job, JobId, JobOptions, JobState};

#[derive(Debug, Clone, Error)]
pub enum JobQueueError {
    #[error("Job queue storage error: {0}")]
    DatabaseError(String),
    #[error("Could not (de)serialize the job payload: {0}")]
    PayloadError(String),
    #[error("Invalid job options: {0}")]
    InvalidOptions(String),
}

impl From<sqlx::Error> for JobQueueError {
    fn from(e: sqlx::Error) -> Self {
        JobQueueError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for JobQueueError {
    fn from(e: serde_json::Error) -> Self {
        JobQueueError::PayloadError(e.to_string())
    }
}

/// Persistent storage and dispatch for jobs.
///
/// Acknowledgements (`complete`, `fail`, `defer`) only apply to jobs that are still `Active`. If a repeatable job
/// removes its own schedule while running, the acknowledgement that follows is a no-op.
#[async_trait]
pub trait JobQueue: Clone + Send + Sync + 'static {
    /// Adds a job to the queue.
    ///
    /// One-shot jobs are always inserted. Repeatable jobs are unique per `(queue, key)`: enqueuing one that already
    /// exists updates its payload and returns the existing job, reviving it if it was dead.
    async fn enqueue_raw(&self, queue: &str, key: &str, payload: String, options: JobOptions)
        -> Result<Job, JobQueueError>;

    /// Removes the repeatable job for `(queue, key)`. Returns `false` if there was none.
    async fn remove_repeatable(&self, queue: &str, key: &str) -> Result<bool, JobQueueError>;

    /// Atomically claims the next due job on the queue, marking it `Active` and counting the attempt.
    async fn claim_next(&self, queue: &str) -> Result<Option<Job>, JobQueueError>;

    /// Marks a successful run. Repeatable jobs are rescheduled with a fresh attempt budget.
    async fn complete(&self, job: &Job) -> Result<(), JobQueueError>;

    /// Records a failed run and returns the job's new state.
    ///
    /// Permanent failures are not retried. Otherwise the job is retried after its backoff delay, unless its attempt
    /// budget is spent, in which case one-shot jobs die and repeatable jobs are rescheduled with a fresh budget.
    async fn fail(&self, job: &Job, reason: &str, permanent: bool) -> Result<JobState, JobQueueError>;

    /// Puts the job back to wait for `delay` without counting the current run as an attempt.
    async fn defer(&self, job: &Job, delay: Duration) -> Result<(), JobQueueError>;

    /// Returns jobs that have been `Active` for longer than `stalled_after` (e.g. because the process running them
    /// died) to the `Waiting` state. Returns the number of jobs recovered.
    async fn recover_stalled(&self, queue: &str, stalled_after: Duration) -> Result<u64, JobQueueError>;

    async fn fetch_job(&self, id: JobId) -> Result<Option<Job>, JobQueueError>;

    /// Every job on the queue with the given key, oldest first.
    async fn jobs_for_key(&self, queue: &str, key: &str) -> Result<Vec<Job>, JobQueueError>;

    /// Jobs that were abandoned on the queue, most recent first.
    async fn dead_jobs(&self, queue: &str) -> Result<Vec<Job>, JobQueueError>;

    /// Serializes the payload and adds the job to the queue.
    async fn enqueue<P: Serialize + Send + Sync>(
        &self,
        queue: &str,
        key: &str,
        payload: &P,
        options: JobOptions,
    ) -> Result<Job, JobQueueError> {
        let payload = serde_json::to_string(payload)?;
        self.enqueue_raw(queue, key, payload, options).await
    }
}

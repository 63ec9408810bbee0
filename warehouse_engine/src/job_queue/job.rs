use std::{fmt::Display, time::Duration};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::job_queue::JobQueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum JobState {
    /// Ready to run once `run_at` has passed.
    Waiting,
    /// Claimed by a worker.
    Active,
    Completed,
    /// Abandoned after a permanent error or once the attempt budget was spent.
    Dead,
}

impl Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Waiting => "Waiting",
            JobState::Active => "Active",
            JobState::Completed => "Completed",
            JobState::Dead => "Dead",
        };
        f.write_str(s)
    }
}

/// A persisted job. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub job_key: String,
    pub payload: String,
    pub state: JobState,
    /// The number of times this job has been claimed, including the current run.
    pub attempts_made: i64,
    pub max_attempts: i64,
    pub backoff_ms: i64,
    pub run_at: i64,
    pub repeat_every_ms: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Job {
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, JobQueueError> {
        serde_json::from_str(&self.payload).map_err(|e| JobQueueError::PayloadError(e.to_string()))
    }

    pub fn is_repeatable(&self) -> bool {
        self.repeat_every_ms.is_some()
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }

    /// The delay before the next attempt after the current one fails: `backoff * 2^(attempts_made - 1)`.
    pub fn retry_delay(&self) -> Duration {
        let exp = u32::try_from(self.attempts_made.saturating_sub(1).clamp(0, 30)).unwrap_or(30);
        let base = u64::try_from(self.backoff_ms).unwrap_or_default();
        Duration::from_millis(base.saturating_mul(1u64 << exp))
    }
}

/// Options for a newly enqueued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOptions {
    /// Total number of runs the job gets before it is abandoned (or, for repeatable jobs, rescheduled afresh).
    pub attempts: u32,
    /// The base delay of the exponential retry backoff.
    pub backoff: Duration,
    /// How long to wait before the first run.
    pub delay: Duration,
    /// If set, the job is repeatable and reruns this long after each completion.
    pub repeat_every: Option<Duration>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self { attempts: 5, backoff: Duration::from_secs(1), delay: Duration::ZERO, repeat_every: None }
    }
}

impl JobOptions {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The first run happens after `delay`, then every `every` thereafter.
    pub fn repeat_every(mut self, every: Duration) -> Self {
        self.repeat_every = Some(every);
        self
    }

    pub fn validate(&self) -> Result<(), JobQueueError> {
        if self.attempts == 0 {
            return Err(JobQueueError::InvalidOptions("A job needs at least one attempt".into()));
        }
        if matches!(self.repeat_every, Some(d) if d.is_zero()) {
            return Err(JobQueueError::InvalidOptions("The repeat interval must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn job(attempts_made: i64, backoff_ms: i64) -> Job {
        Job {
            id: JobId(1),
            queue: "q".into(),
            job_key: "1".into(),
            payload: r#"{"id":1}"#.into(),
            state: JobState::Active,
            attempts_made,
            max_attempts: 5,
            backoff_ms,
            run_at: 0,
            repeat_every_ms: None,
            last_error: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn exponential_backoff() {
        assert_eq!(job(1, 1000).retry_delay(), Duration::from_secs(1));
        assert_eq!(job(2, 1000).retry_delay(), Duration::from_secs(2));
        assert_eq!(job(4, 1000).retry_delay(), Duration::from_secs(8));
        assert_eq!(job(0, 1000).retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn budget() {
        assert!(!job(4, 10).attempts_exhausted());
        assert!(job(5, 10).attempts_exhausted());
    }

    #[test]
    fn payload_decoding() {
        #[derive(Deserialize)]
        struct P {
            id: i64,
        }
        let p: P = job(1, 1).payload().unwrap();
        assert_eq!(p.id, 1);
        let mut bad = job(1, 1);
        bad.payload = "nope".into();
        assert!(matches!(bad.payload::<P>(), Err(JobQueueError::PayloadError(_))));
    }

    #[test]
    fn invalid_options() {
        assert!(JobOptions::default().validate().is_ok());
        assert!(JobOptions::default().with_attempts(0).validate().is_err());
        assert!(JobOptions::default().repeat_every(Duration::ZERO).validate().is_err());
    }
}

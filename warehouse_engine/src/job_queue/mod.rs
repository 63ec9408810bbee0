//! # Durable job queue
//!
//! Named queues of persisted jobs with at-least-once delivery. A job is handed to exactly one worker at a time. When
//! a handler fails, the job is retried with exponential backoff until its attempt budget is spent, after which it is
//! kept as a dead job for inspection.
//!
//! Jobs may be *repeatable*: a repeatable job is a single record, identified by its queue and key, that is rescheduled
//! one interval later every time it finishes, until it is removed with [`JobQueue::remove_repeatable`].
//!
//! [`WorkerPool`] runs a configurable number of concurrent consumers for one queue and dispatches each claimed job to
//! a [`JobHandler`].
mod job;
mod queue;
mod worker;

pub use job::{Job, JobId, JobOptions, JobState};
pub use queue::{JobQueue, JobQueueError};
pub use worker::{run_next_job, JobError, JobHandler, JobOutcome, WorkerConfig, WorkerPool};

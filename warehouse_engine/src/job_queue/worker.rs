use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures_util::future::join_all;
use log::*;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};

use crate::job_queue::{Job, JobQueue, JobQueueError, JobState};

/// The outcome of a single handler run, as reported to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// A transient failure. The job is retried with backoff while it has attempts left.
    #[error("{0}")]
    Retryable(String),
    /// The job can never succeed. It is not retried.
    #[error("{0}")]
    Permanent(String),
    /// The job could not run yet. It is put back without using up an attempt.
    #[error("deferred for {0:?}")]
    Deferred(Duration),
}

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

/// What happened to a job after a worker ran it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Deferred,
    /// The run failed. The job is now in the given state (`Waiting` for a retry, or `Dead`).
    Failed(JobState),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of jobs from the queue that may run at the same time.
    pub concurrency: usize,
    /// How long an idle worker waits before looking for due jobs again.
    pub poll_interval: Duration,
    /// A handler run that takes longer than this is abandoned and counted as a retryable failure.
    pub job_timeout: Duration,
    /// Jobs that have been active for longer than this are considered stalled: their worker is gone, so they are put
    /// back on the queue. Idle workers check for stalled jobs on every poll.
    pub stalled_after: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            poll_interval: Duration::from_millis(500),
            job_timeout: Duration::from_secs(120),
            stalled_after: Duration::from_secs(240),
        }
    }
}

impl WorkerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self.stalled_after = job_timeout * 2;
        self
    }
}

/// A set of concurrent consumers for one queue.
pub struct WorkerPool {
    queue_name: String,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Recovers stalled jobs on the queue and then spawns `config.concurrency` workers that feed due jobs to
    /// `handler`.
    pub async fn start<Q, H>(
        queue: Q,
        queue_name: &str,
        handler: Arc<H>,
        config: WorkerConfig,
    ) -> Result<Self, JobQueueError>
    where
        Q: JobQueue,
        H: JobHandler,
    {
        let recovered = queue.recover_stalled(queue_name, config.stalled_after).await?;
        if recovered > 0 {
            warn!("🧰️ Recovered {recovered} stalled jobs on {queue_name}");
        }
        Ok(Self::spawn(queue, queue_name, handler, config))
    }

    /// Spawns the workers without looking for stalled jobs first. Stalled jobs are still picked up by idle workers.
    pub fn spawn<Q, H>(queue: Q, queue_name: &str, handler: Arc<H>, config: WorkerConfig) -> Self
    where
        Q: JobQueue,
        H: JobHandler,
    {
        let (shutdown, rx) = watch::channel(false);
        let concurrency = config.concurrency.max(1);
        let tasks = (0..concurrency)
            .map(|worker| {
                let queue = queue.clone();
                let handler = Arc::clone(&handler);
                let config = config.clone();
                let name = queue_name.to_string();
                let rx = rx.clone();
                tokio::spawn(async move { worker_loop(worker, queue, name, handler, config, rx).await })
            })
            .collect();
        info!("🧰️ Started {concurrency} workers on {queue_name}");
        Self { queue_name: queue_name.to_string(), shutdown, tasks }
    }

    pub fn queue_name(&self) -> &str {
        self.queue_name.as_str()
    }

    /// Signals every worker to stop and waits for jobs that are already running to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in join_all(self.tasks).await {
            if let Err(e) = result {
                error!("🧰️ A worker on {} panicked: {e}", self.queue_name);
            }
        }
        info!("🧰️ Workers on {} have stopped", self.queue_name);
    }
}

async fn worker_loop<Q: JobQueue, H: JobHandler>(
    worker: usize,
    queue: Q,
    queue_name: String,
    handler: Arc<H>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!("🧰️ Worker {worker} on {queue_name} is running");
    loop {
        if *shutdown.borrow() {
            break;
        }
        match run_next_job(&queue, &queue_name, handler.as_ref(), config.job_timeout).await {
            // Keep draining while there is work
            Ok(Some(_)) => continue,
            Ok(None) => match queue.recover_stalled(&queue_name, config.stalled_after).await {
                Ok(0) => {},
                Ok(n) => warn!("🧰️ Worker {worker} returned {n} stalled jobs on {queue_name} to the queue"),
                Err(e) => error!("🧰️ Worker {worker} could not check {queue_name} for stalled jobs. {e}"),
            },
            Err(e) => error!("🧰️ Worker {worker} on {queue_name} could not process a job. {e}"),
        }
        tokio::select! {
            changed = shutdown.changed() => if changed.is_err() { break },
            _ = tokio::time::sleep(config.poll_interval) => {},
        }
    }
    debug!("🧰️ Worker {worker} on {queue_name} has stopped");
}

/// Claims the next due job on the queue, runs it and acknowledges the result. Returns `None` if no job was due.
pub async fn run_next_job<Q, H>(
    queue: &Q,
    queue_name: &str,
    handler: &H,
    timeout: Duration,
) -> Result<Option<(Job, JobOutcome)>, JobQueueError>
where
    Q: JobQueue,
    H: JobHandler + ?Sized,
{
    let Some(job) = queue.claim_next(queue_name).await? else {
        return Ok(None);
    };
    trace!("🧰️ Running {} on {queue_name} (attempt {}/{})", job.id, job.attempts_made, job.max_attempts);
    let result = match tokio::time::timeout(timeout, handler.handle(&job)).await {
        Ok(result) => result,
        Err(_) => Err(JobError::Retryable(format!("timed out after {timeout:?}"))),
    };
    let outcome = match result {
        Ok(()) => {
            queue.complete(&job).await?;
            debug!("🧰️ {} on {queue_name} completed", job.id);
            JobOutcome::Completed
        },
        Err(JobError::Deferred(delay)) => {
            queue.defer(&job, delay).await?;
            debug!("🧰️ {} on {queue_name} deferred for {delay:?}", job.id);
            JobOutcome::Deferred
        },
        Err(JobError::Retryable(reason)) => {
            let state = queue.fail(&job, &reason, false).await?;
            error!("🧰️ {} on {queue_name} failed: {reason}. The job is now {state}", job.id);
            JobOutcome::Failed(state)
        },
        Err(JobError::Permanent(reason)) => {
            let state = queue.fail(&job, &reason, true).await?;
            error!("🧰️ {} on {queue_name} failed permanently: {reason}. The job is now {state}", job.id);
            JobOutcome::Failed(state)
        },
    };
    Ok(Some((job, outcome)))
}

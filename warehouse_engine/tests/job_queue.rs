use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use tokio::time::sleep;
use warehouse_engine::{
    job_queue::{
        run_next_job,
        Job,
        JobError,
        JobHandler,
        JobOptions,
        JobOutcome,
        JobQueue,
        JobState,
        WorkerConfig,
        WorkerPool,
    },
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    SqliteDatabase,
};

const QUEUE: &str = "TEST_QUEUE";
const TIMEOUT: Duration = Duration::from_secs(5);

/// Answers every run with the same result and counts the runs.
struct Scripted {
    result: Result<(), JobError>,
    runs: AtomicUsize,
}

impl Scripted {
    fn new(result: Result<(), JobError>) -> Self {
        Self { result, runs: AtomicUsize::new(0) }
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for Scripted {
    async fn handle(&self, _job: &Job) -> Result<(), JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

fn fast_retries(attempts: u32) -> JobOptions {
    JobOptions::default().with_attempts(attempts).with_backoff(Duration::from_millis(10))
}

async fn run(db: &SqliteDatabase, handler: &dyn JobHandler) -> Option<(Job, JobOutcome)> {
    run_next_job(db, QUEUE, handler, TIMEOUT).await.expect("Error running job")
}

#[tokio::test]
async fn failing_jobs_back_off_and_then_die() {
    let db = prepare_test_env(&random_db_path()).await;
    let handler = Scripted::new(Err(JobError::Retryable("gateway timeout".into())));
    let job = db.enqueue(QUEUE, "1", &json!({"id": 1}), fast_retries(3)).await.unwrap();

    let (_, outcome) = run(&db, &handler).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed(JobState::Waiting));
    let stored = db.fetch_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.attempts_made, 1);
    assert!(stored.run_at - stored.updated_at >= 10);
    // Not due until the backoff has passed
    assert!(run(&db, &handler).await.is_none());

    sleep(Duration::from_millis(30)).await;
    let (_, outcome) = run(&db, &handler).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed(JobState::Waiting));
    let stored = db.fetch_job(job.id).await.unwrap().unwrap();
    assert!(stored.run_at - stored.updated_at >= 20);

    sleep(Duration::from_millis(50)).await;
    let (_, outcome) = run(&db, &handler).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed(JobState::Dead));
    assert_eq!(handler.runs(), 3);

    let dead = db.dead_jobs(QUEUE).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts_made, 3);
    assert_eq!(dead[0].last_error.as_deref(), Some("gateway timeout"));
    sleep(Duration::from_millis(100)).await;
    assert!(run(&db, &handler).await.is_none());
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let db = prepare_test_env(&random_db_path()).await;
    let handler = Scripted::new(Err(JobError::Permanent("bad payload".into())));
    db.enqueue(QUEUE, "1", &json!({"id": 1}), fast_retries(5)).await.unwrap();
    let (_, outcome) = run(&db, &handler).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed(JobState::Dead));
    assert_eq!(db.dead_jobs(QUEUE).await.unwrap().len(), 1);
}

#[tokio::test]
async fn deferring_does_not_use_an_attempt() {
    let db = prepare_test_env(&random_db_path()).await;
    let handler = Scripted::new(Err(JobError::Deferred(Duration::from_millis(10))));
    let job = db.enqueue(QUEUE, "1", &json!({"id": 1}), fast_retries(1)).await.unwrap();
    for _ in 0..3 {
        let (_, outcome) = run(&db, &handler).await.unwrap();
        assert_eq!(outcome, JobOutcome::Deferred);
        sleep(Duration::from_millis(20)).await;
    }
    let stored = db.fetch_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Waiting);
    assert_eq!(stored.attempts_made, 0);

    let handler = Scripted::new(Ok(()));
    let (_, outcome) = run(&db, &handler).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(db.fetch_job(job.id).await.unwrap().unwrap().state, JobState::Completed);
}

#[tokio::test]
async fn repeatable_jobs_are_unique_and_rescheduled() {
    let db = prepare_test_env(&random_db_path()).await;
    let options = fast_retries(5).repeat_every(Duration::from_secs(60)).with_delay(Duration::from_secs(60));
    let first = db.enqueue(QUEUE, "42", &json!({"id": 42}), options.clone()).await.unwrap();
    let second = db.enqueue(QUEUE, "42", &json!({"id": 42}), options).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(db.jobs_for_key(QUEUE, "42").await.unwrap().len(), 1);
    assert!(first.is_repeatable());
    // Not due until the initial delay has passed
    assert!(run(&db, &Scripted::new(Ok(()))).await.is_none());

    let opts = fast_retries(5).repeat_every(Duration::from_millis(10));
    let job = db.enqueue(QUEUE, "7", &json!({"id": 7}), opts).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    let handler = Scripted::new(Ok(()));
    let (ran, outcome) = run(&db, &handler).await.unwrap();
    assert_eq!(ran.id, job.id);
    assert_eq!(outcome, JobOutcome::Completed);
    let stored = db.fetch_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Waiting);
    assert_eq!(stored.attempts_made, 0);
    assert!(stored.run_at >= stored.updated_at + 10);
}

#[tokio::test]
async fn exhausted_repeatable_jobs_get_a_fresh_budget() {
    let db = prepare_test_env(&random_db_path()).await;
    let options = fast_retries(2).repeat_every(Duration::from_secs(60));
    let job = db.enqueue(QUEUE, "9", &json!({"id": 9}), options).await.unwrap();
    let handler = Scripted::new(Err(JobError::Retryable("still failing".into())));
    let (_, outcome) = run(&db, &handler).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed(JobState::Waiting));
    sleep(Duration::from_millis(30)).await;
    let (_, outcome) = run(&db, &handler).await.unwrap();
    assert_eq!(outcome, JobOutcome::Failed(JobState::Waiting));
    let stored = db.fetch_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.attempts_made, 0);
    assert!(stored.run_at >= stored.updated_at + 60_000);
    assert!(db.dead_jobs(QUEUE).await.unwrap().is_empty());
}

/// Removes its own schedule, the way a reconciliation run does once the payment is settled.
struct SelfCancelling {
    db: SqliteDatabase,
}

#[async_trait]
impl JobHandler for SelfCancelling {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        self.db.remove_repeatable(QUEUE, &job.job_key).await.map_err(|e| JobError::Retryable(e.to_string()))?;
        Ok(())
    }
}

#[tokio::test]
async fn a_job_that_removes_its_schedule_is_not_rescheduled() {
    let db = prepare_test_env(&random_db_path()).await;
    let options = fast_retries(5).repeat_every(Duration::from_millis(10));
    let job = db.enqueue(QUEUE, "5", &json!({"id": 5}), options).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    let handler = SelfCancelling { db: db.clone() };
    let (_, outcome) = run(&db, &handler).await.unwrap();
    assert_eq!(outcome, JobOutcome::Completed);
    assert!(db.fetch_job(job.id).await.unwrap().is_none());
    assert!(!db.remove_repeatable(QUEUE, "5").await.unwrap());
}

#[tokio::test]
async fn stalled_jobs_are_recovered() {
    let db = prepare_test_env(&random_db_path()).await;
    let job = db.enqueue(QUEUE, "3", &json!({"id": 3}), fast_retries(5)).await.unwrap();
    // A worker claims the job and then disappears
    let claimed = db.claim_next(QUEUE).await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id);
    assert!(db.claim_next(QUEUE).await.unwrap().is_none());
    assert_eq!(db.recover_stalled(QUEUE, Duration::from_secs(60)).await.unwrap(), 0);
    sleep(Duration::from_millis(5)).await;
    assert_eq!(db.recover_stalled(QUEUE, Duration::ZERO).await.unwrap(), 1);
    let reclaimed = db.claim_next(QUEUE).await.unwrap().unwrap();
    assert_eq!(reclaimed.id, job.id);
    assert_eq!(reclaimed.attempts_made, 2);
}

struct Slow;

#[async_trait]
impl JobHandler for Slow {
    async fn handle(&self, _job: &Job) -> Result<(), JobError> {
        sleep(Duration::from_secs(10)).await;
        Ok(())
    }
}

#[tokio::test]
async fn slow_jobs_time_out() {
    let db = prepare_test_env(&random_db_path()).await;
    let job = db.enqueue(QUEUE, "8", &json!({"id": 8}), fast_retries(5)).await.unwrap();
    let (_, outcome) = run_next_job(&db, QUEUE, &Slow, Duration::from_millis(50)).await.unwrap().unwrap();
    assert_eq!(outcome, JobOutcome::Failed(JobState::Waiting));
    let stored = db.fetch_job(job.id).await.unwrap().unwrap();
    assert!(stored.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn worker_pool_drains_the_queue() {
    let db = prepare_test_env(&random_db_path()).await;
    for n in 0..20 {
        db.enqueue(QUEUE, &n.to_string(), &json!({"id": n}), fast_retries(5)).await.unwrap();
    }
    let handler = Arc::new(Scripted::new(Ok(())));
    let config = WorkerConfig::default().with_concurrency(4).with_poll_interval(Duration::from_millis(10));
    let pool = WorkerPool::start(db.clone(), QUEUE, Arc::clone(&handler), config).await.unwrap();
    assert_eq!(pool.queue_name(), QUEUE);
    for _ in 0..200 {
        if handler.runs() >= 20 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    pool.shutdown().await;
    assert_eq!(handler.runs(), 20);
    for n in 0..20 {
        let jobs = db.jobs_for_key(QUEUE, &n.to_string()).await.unwrap();
        assert_eq!(jobs[0].state, JobState::Completed);
    }
}

#[tokio::test]
async fn invalid_options_are_rejected() {
    let db = prepare_test_env(&random_db_path()).await;
    let err = db.enqueue(QUEUE, "1", &json!({}), JobOptions::default().with_attempts(0)).await.unwrap_err();
    assert!(err.to_string().contains("at least one attempt"));
}

#[tokio::test]
async fn jobs_left_active_by_a_crashed_process_run_again() {
    let db = prepare_test_env(&random_db_path()).await;
    let job = db.enqueue(QUEUE, "4", &json!({"id": 4}), fast_retries(5)).await.unwrap();
    // The previous process claimed the job and died before acknowledging it
    db.claim_next(QUEUE).await.unwrap().unwrap();

    let handler = Arc::new(Scripted::new(Ok(())));
    let config = WorkerConfig::default().with_poll_interval(Duration::from_millis(10)).with_job_timeout(Duration::from_millis(50));
    let pool = WorkerPool::start(db.clone(), QUEUE, Arc::clone(&handler), config).await.unwrap();
    // Too recent to be treated as stalled when the pool starts
    assert_eq!(db.fetch_job(job.id).await.unwrap().unwrap().state, JobState::Active);
    for _ in 0..100 {
        if handler.runs() >= 1 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    pool.shutdown().await;
    assert_eq!(handler.runs(), 1);
    let stored = db.fetch_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Completed);
    assert_eq!(stored.attempts_made, 2);
}

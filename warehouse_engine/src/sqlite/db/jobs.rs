use std::time::Duration;

use log::{debug, trace};
use sqlx::SqliteConnection;

use super::{duration_ms, now_ms};
use crate::job_queue::{Job, JobId, JobOptions, JobQueueError, JobState};

const INSERT_JOB: &str = r#"
    INSERT INTO jobs (queue, job_key, payload, max_attempts, backoff_ms, run_at, repeat_every_ms, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
    RETURNING *;
"#;

// A repeatable job is unique per queue and key. Re-adding it refreshes the definition and revives a dead one.
const UPSERT_REPEATABLE_JOB: &str = r#"
    INSERT INTO jobs (queue, job_key, payload, max_attempts, backoff_ms, run_at, repeat_every_ms, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
    ON CONFLICT (queue, job_key) WHERE repeat_every_ms IS NOT NULL DO UPDATE SET
        payload = excluded.payload,
        max_attempts = excluded.max_attempts,
        backoff_ms = excluded.backoff_ms,
        repeat_every_ms = excluded.repeat_every_ms,
        state = CASE WHEN jobs.state = 'Dead' THEN 'Waiting' ELSE jobs.state END,
        attempts_made = CASE WHEN jobs.state = 'Dead' THEN 0 ELSE jobs.attempts_made END,
        run_at = CASE WHEN jobs.state = 'Dead' THEN excluded.run_at ELSE jobs.run_at END,
        updated_at = excluded.updated_at
    RETURNING *;
"#;

pub async fn insert_job(
    queue: &str,
    key: &str,
    payload: String,
    options: &JobOptions,
    conn: &mut SqliteConnection,
) -> Result<Job, JobQueueError> {
    options.validate()?;
    let now = now_ms();
    let run_at = now.saturating_add(duration_ms(options.delay));
    let sql = match options.repeat_every {
        None => INSERT_JOB,
        Some(_) => UPSERT_REPEATABLE_JOB,
    };
    let job: Job = sqlx::query_as(sql)
        .bind(queue)
        .bind(key)
        .bind(payload)
        .bind(i64::from(options.attempts))
        .bind(duration_ms(options.backoff))
        .bind(run_at)
        .bind(options.repeat_every.map(duration_ms))
        .bind(now)
        .fetch_one(conn)
        .await?;
    debug!("🧰️ {} added to {queue} with key {key}", job.id);
    Ok(job)
}

pub async fn delete_repeatable(queue: &str, key: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM jobs WHERE queue = $1 AND job_key = $2 AND repeat_every_ms IS NOT NULL")
        .bind(queue)
        .bind(key)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Marks the oldest due job on the queue as active and counts the attempt, in one statement.
pub async fn claim_next(queue: &str, conn: &mut SqliteConnection) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE jobs SET state = 'Active', attempts_made = attempts_made + 1, updated_at = $2
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue = $1 AND state = 'Waiting' AND run_at <= $2
                ORDER BY run_at, id
                LIMIT 1
            )
            RETURNING *;
        "#,
    )
    .bind(queue)
    .bind(now_ms())
    .fetch_optional(conn)
    .await
}

pub async fn complete(id: JobId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE jobs SET
                state = CASE WHEN repeat_every_ms IS NULL THEN 'Completed' ELSE 'Waiting' END,
                attempts_made = CASE WHEN repeat_every_ms IS NULL THEN attempts_made ELSE 0 END,
                run_at = CASE WHEN repeat_every_ms IS NULL THEN run_at ELSE $2 + repeat_every_ms END,
                last_error = NULL,
                updated_at = $2
            WHERE id = $1 AND state = 'Active';
        "#,
    )
    .bind(id)
    .bind(now_ms())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Records a failed run of an active job. See [`crate::job_queue::JobQueue::fail`] for the rules.
pub async fn fail(
    job: &Job,
    reason: &str,
    permanent: bool,
    conn: &mut SqliteConnection,
) -> Result<JobState, sqlx::Error> {
    let now = now_ms();
    let (state, attempts_made, run_at) = match (permanent, job.attempts_exhausted(), job.repeat_every_ms) {
        (true, _, _) => (JobState::Dead, job.attempts_made, job.run_at),
        (false, false, _) => (JobState::Waiting, job.attempts_made, now.saturating_add(duration_ms(job.retry_delay()))),
        (false, true, Some(every)) => (JobState::Waiting, 0, now.saturating_add(every)),
        (false, true, None) => (JobState::Dead, job.attempts_made, job.run_at),
    };
    let result = sqlx::query(
        r#"
            UPDATE jobs SET state = $2, attempts_made = $3, run_at = $4, last_error = $5, updated_at = $6
            WHERE id = $1 AND state = 'Active';
        "#,
    )
    .bind(job.id)
    .bind(state)
    .bind(attempts_made)
    .bind(run_at)
    .bind(reason)
    .bind(now)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        debug!("🧰️ {} was removed while it was running. The failure was not recorded", job.id);
    }
    Ok(state)
}

/// Returns an active job to the queue without counting the run against its attempt budget.
pub async fn defer(id: JobId, delay: Duration, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let now = now_ms();
    let result = sqlx::query(
        r#"
            UPDATE jobs SET state = 'Waiting', attempts_made = MAX(attempts_made - 1, 0), run_at = $2, updated_at = $3
            WHERE id = $1 AND state = 'Active';
        "#,
    )
    .bind(id)
    .bind(now.saturating_add(duration_ms(delay)))
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn recover_stalled(
    queue: &str,
    stalled_after: Duration,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let now = now_ms();
    let result = sqlx::query(
        r#"
            UPDATE jobs SET state = 'Waiting', run_at = $2, updated_at = $2
            WHERE queue = $1 AND state = 'Active' AND updated_at <= $3;
        "#,
    )
    .bind(queue)
    .bind(now)
    .bind(now.saturating_sub(duration_ms(stalled_after)))
    .execute(conn)
    .await?;
    trace!("🧰️ {} stalled jobs on {queue} returned to the queue", result.rows_affected());
    Ok(result.rows_affected())
}

pub async fn fetch_job(id: JobId, conn: &mut SqliteConnection) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM jobs WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn jobs_for_key(queue: &str, key: &str, conn: &mut SqliteConnection) -> Result<Vec<Job>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM jobs WHERE queue = $1 AND job_key = $2 ORDER BY id")
        .bind(queue)
        .bind(key)
        .fetch_all(conn)
        .await
}

pub async fn dead_jobs(queue: &str, conn: &mut SqliteConnection) -> Result<Vec<Job>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM jobs WHERE queue = $1 AND state = 'Dead' ORDER BY updated_at DESC, id DESC")
        .bind(queue)
        .fetch_all(conn)
        .await
}

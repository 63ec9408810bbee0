//! Queue names, payloads and scheduling helpers for the pipeline's jobs.
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::OrderId,
    job_queue::{Job, JobError, JobOptions, JobQueue, JobQueueError},
    traits::OrderManagement,
    wh_api::PipelineSettings,
};

/// Delivers a paid order.
pub const DELIVER_AFTER_ORDER: &str = "DELIVER_AFTER_ORDER";
/// Polls the gateway for a payment that was not confirmed at capture time. Repeatable.
pub const CHECK_PENDING_TX: &str = "CHECK_PENDING_TX";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderJobPayload {
    pub id: OrderId,
}

/// Pipeline jobs are keyed by the order id.
pub fn job_key(order_id: OrderId) -> String {
    order_id.value().to_string()
}

fn retry_options(settings: &PipelineSettings) -> JobOptions {
    JobOptions::default().with_attempts(settings.job_attempts).with_backoff(settings.job_backoff)
}

pub async fn enqueue_delivery<Q: JobQueue>(
    queue: &Q,
    order_id: OrderId,
    settings: &PipelineSettings,
) -> Result<Job, JobQueueError> {
    let job = queue
        .enqueue(DELIVER_AFTER_ORDER, &job_key(order_id), &OrderJobPayload { id: order_id }, retry_options(settings))
        .await?;
    debug!("📦️ Delivery of order {order_id} queued as {}", job.id);
    Ok(job)
}

/// Polls the gateway every `reconcile_interval` until [`cancel_reconciliation`] is called for the order.
pub async fn schedule_reconciliation<Q: JobQueue>(
    queue: &Q,
    order_id: OrderId,
    settings: &PipelineSettings,
) -> Result<Job, JobQueueError> {
    let options = retry_options(settings)
        .with_delay(settings.reconcile_interval)
        .repeat_every(settings.reconcile_interval);
    let job = queue.enqueue(CHECK_PENDING_TX, &job_key(order_id), &OrderJobPayload { id: order_id }, options).await?;
    debug!("🔁️ Payment check for order {order_id} scheduled every {:?} as {}", settings.reconcile_interval, job.id);
    Ok(job)
}

pub async fn cancel_reconciliation<Q: JobQueue>(queue: &Q, order_id: OrderId) -> Result<bool, JobQueueError> {
    queue.remove_repeatable(CHECK_PENDING_TX, &job_key(order_id)).await
}

/// Reads the order id out of a pipeline job. A payload that cannot be read will never succeed.
pub fn order_id_for(job: &Job) -> Result<OrderId, JobError> {
    job.payload::<OrderJobPayload>()
        .map(|p| p.id)
        .map_err(|e| JobError::Permanent(format!("{} has an invalid payload. {e}", job.id)))
}

/// Runs `f` while holding the order's lease on behalf of `job`. If another job holds the lease, `job` is deferred.
pub async fn with_order_lease<B, F, Fut>(
    db: &B,
    order_id: OrderId,
    job: &Job,
    settings: &PipelineSettings,
    f: F,
) -> Result<(), JobError>
where
    B: OrderManagement,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), JobError>>,
{
    let holder = job.id.to_string();
    let acquired = db.try_acquire_lease(order_id, &holder, settings.lease_ttl).await.map_err(retryable)?;
    if !acquired {
        debug!("🧰️ Order {order_id} is busy. {} will try again in {:?}", job.id, settings.lease_retry_delay);
        return Err(JobError::Deferred(settings.lease_retry_delay));
    }
    let result = f().await;
    if let Err(e) = db.release_lease(order_id, &holder).await {
        // The lease expires on its own
        warn!("🧰️ {holder} could not release the lease on order {order_id}. {e}");
    }
    result
}

pub fn retryable<E: std::fmt::Display>(e: E) -> JobError {
    JobError::Retryable(e.to_string())
}

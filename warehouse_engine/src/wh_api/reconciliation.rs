use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use log::*;

use crate::{
    db_types::{OrderId, OrderStatusType, OrderUpdate},
    job_queue::{Job, JobError, JobHandler, JobQueue},
    traits::{OrderManagement, PaymentGateway},
    wh_api::{
        order_jobs::{cancel_reconciliation, enqueue_delivery, order_id_for, retryable, with_order_lease},
        PipelineSettings,
    },
};

/// Handles `CHECK_PENDING_TX` jobs: asks the gateway about a payment that was not confirmed at capture time.
///
/// * Authorized or captured: the order is marked paid, delivery is queued and polling stops.
/// * Refunded or failed: polling stops. The order is left as it is.
/// * Anything else: the new payment status is recorded and the next scheduled run checks again.
pub struct ReconciliationWorker<B, Q, G: ?Sized> {
    db: B,
    queue: Q,
    gateway: Arc<G>,
    settings: PipelineSettings,
}

impl<B, Q, G: ?Sized> Debug for ReconciliationWorker<B, Q, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationWorker")
    }
}

impl<B, Q, G: ?Sized> ReconciliationWorker<B, Q, G> {
    pub fn new(db: B, queue: Q, gateway: Arc<G>, settings: PipelineSettings) -> Self {
        Self { db, queue, gateway, settings }
    }
}

impl<B, Q, G> ReconciliationWorker<B, Q, G>
where
    B: OrderManagement,
    Q: JobQueue,
    G: PaymentGateway + ?Sized,
{
    pub async fn reconcile(&self, order_id: OrderId) -> Result<(), JobError> {
        let Some(order) = self.db.fetch_order(order_id).await.map_err(retryable)? else {
            self.stop_polling(order_id).await?;
            return Err(JobError::Permanent(format!("Order {order_id} does not exist")));
        };
        match order.status {
            OrderStatusType::PaymentNotConfirmed => {},
            // A capture that attached the payment but did not finish. The check completes it
            OrderStatusType::AwaitingPayment if order.payment_attempt.is_some() => {},
            OrderStatusType::PaidAwaitingShipment => {
                // An earlier run marked the order paid but did not get as far as stopping the schedule
                info!("🔁️ Order {order_id} is already paid. Making sure it is queued for delivery");
                enqueue_delivery(&self.queue, order_id, &self.settings).await.map_err(retryable)?;
                return self.stop_polling(order_id).await;
            },
            status => {
                info!("🔁️ Order {order_id} is {status}. There is no payment to check");
                return self.stop_polling(order_id).await;
            },
        }
        let Some(attempt) = order.payment_attempt else {
            return Err(JobError::Permanent(format!("Order {order_id} is awaiting confirmation but has no payment")));
        };
        let info = self.gateway.fetch_payment(&attempt.payment_id).await.map_err(|e| {
            warn!("🔁️ Could not fetch payment {} for order {order_id}. {e}", attempt.payment_id);
            retryable(e)
        })?;
        let status = info.status;
        let update = OrderUpdate::default().with_payment_status(status.clone());
        if status.is_paid() {
            self.db
                .update_order(order_id, update.with_status(OrderStatusType::PaidAwaitingShipment))
                .await
                .map_err(retryable)?;
            enqueue_delivery(&self.queue, order_id, &self.settings).await.map_err(retryable)?;
            info!("🔁️ Payment {} for order {order_id} is {status}. The order has been paid", attempt.payment_id);
            self.stop_polling(order_id).await
        } else if status.is_dead() {
            self.db.update_order(order_id, update).await.map_err(retryable)?;
            info!("🔁️ Payment {} for order {order_id} is {status}. No longer checking it", attempt.payment_id);
            self.stop_polling(order_id).await
        } else {
            let update = update.with_status(OrderStatusType::PaymentNotConfirmed);
            self.db.update_order(order_id, update).await.map_err(retryable)?;
            debug!("🔁️ Payment {} for order {order_id} is still {status}", attempt.payment_id);
            Ok(())
        }
    }

    async fn stop_polling(&self, order_id: OrderId) -> Result<(), JobError> {
        if cancel_reconciliation(&self.queue, order_id).await.map_err(retryable)? {
            debug!("🔁️ Stopped checking the payment for order {order_id}");
        }
        Ok(())
    }
}

#[async_trait]
impl<B, Q, G> JobHandler for ReconciliationWorker<B, Q, G>
where
    B: OrderManagement,
    Q: JobQueue,
    G: PaymentGateway + ?Sized + 'static,
{
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let order_id = order_id_for(job)?;
        trace!("🔁️ Checking the payment for order {order_id} ({})", job.id);
        with_order_lease(&self.db, order_id, job, &self.settings, || self.reconcile(order_id)).await
    }
}

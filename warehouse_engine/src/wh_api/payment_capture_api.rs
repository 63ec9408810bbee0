use std::{fmt::Debug, sync::Arc};

use log::*;

use crate::{
    db_types::{OrderId, OrderStatusType, OrderUpdate, PaymentAttempt, UserId},
    job_queue::JobQueue,
    traits::{OrderManagement, PaymentGateway},
    wh_api::{
        order_jobs::{enqueue_delivery, schedule_reconciliation},
        order_objects::CaptureResult,
        PipelineError,
        PipelineSettings,
    },
};

/// `PaymentCaptureApi` handles a buyer reporting that they have paid for an order.
pub struct PaymentCaptureApi<B, Q, G: ?Sized> {
    db: B,
    queue: Q,
    gateway: Arc<G>,
    settings: PipelineSettings,
}

impl<B, Q, G: ?Sized> Debug for PaymentCaptureApi<B, Q, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentCaptureApi")
    }
}

impl<B, Q, G: ?Sized> PaymentCaptureApi<B, Q, G> {
    pub fn new(db: B, queue: Q, gateway: Arc<G>, settings: PipelineSettings) -> Self {
        Self { db, queue, gateway, settings }
    }
}

impl<B, Q, G> PaymentCaptureApi<B, Q, G>
where
    B: OrderManagement,
    Q: JobQueue,
    G: PaymentGateway + ?Sized,
{
    /// Records the payment against the order and asks the gateway about it.
    ///
    /// If the gateway reports the payment as authorized or captured, the order moves to `PAID_AWAITING_SHIPMENT` and
    /// a delivery job is queued. Otherwise it moves to `PAYMENT_NOT_CONFIRMED` and a repeating payment check is
    /// scheduled. The same happens when the gateway cannot be reached, since the payment id is already on record.
    ///
    /// The follow-up job is queued before the new status is stored. If either step fails, the order stays in
    /// `AWAITING_PAYMENT` and the buyer can report the same payment again to finish the capture.
    ///
    /// An order accepts exactly one payment. Reporting a different payment fails with `PAYMENT_ALREADY_ADDED`.
    pub async fn capture_payment(
        &self,
        user_id: UserId,
        order_id: OrderId,
        payment_id: &str,
    ) -> Result<CaptureResult, PipelineError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(PipelineError::OrderNotFound(order_id))?;
        if order.creator_id != user_id {
            warn!("💳️ User {user_id} tried to pay for order {order_id}, which belongs to user {}", order.creator_id);
            return Err(PipelineError::OrderNotOwned(order_id));
        }
        match order.payment_id() {
            None => {
                let attempt = PaymentAttempt::new(self.gateway.provider_name(), payment_id);
                self.db.attach_payment_attempt(order_id, attempt).await?;
                debug!("💳️ Payment {payment_id} attached to order {order_id}");
            },
            Some(existing) if existing == payment_id && order.status == OrderStatusType::AwaitingPayment => {
                info!("💳️ Resuming the capture of payment {payment_id} for order {order_id}");
            },
            Some(_) => return Err(PipelineError::PaymentAlreadyAdded(order_id)),
        }
        let mut update = OrderUpdate::default();
        let new_status = match self.gateway.fetch_payment(payment_id).await {
            Ok(info) => {
                let status = if info.status.is_paid() {
                    OrderStatusType::PaidAwaitingShipment
                } else {
                    OrderStatusType::PaymentNotConfirmed
                };
                update = update.with_payment_status(info.status);
                status
            },
            Err(e) => {
                warn!("💳️ Could not fetch payment {payment_id} for order {order_id}. It will be checked later. {e}");
                OrderStatusType::PaymentNotConfirmed
            },
        };
        if new_status == OrderStatusType::PaidAwaitingShipment {
            enqueue_delivery(&self.queue, order_id, &self.settings).await?;
        } else {
            schedule_reconciliation(&self.queue, order_id, &self.settings).await?;
        }
        let order = self.db.update_order(order_id, update.with_status(new_status)).await?;
        let payment_status = order.payment_attempt.and_then(|a| a.status).map(|s| s.to_string());
        info!(
            "💳️ Payment {payment_id} for order {order_id} is {}. Order is now {new_status}",
            payment_status.as_deref().unwrap_or("unknown")
        );
        Ok(CaptureResult { new_status })
    }
}

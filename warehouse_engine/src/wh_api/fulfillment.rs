use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use log::*;

use crate::{
    db_types::{
        CodeClaim,
        CodeId,
        OrderDetails,
        OrderId,
        OrderLine,
        OrderStatusType,
        OrderUpdate,
        PaymentStatus,
        ProductCode,
        ProductType,
    },
    job_queue::{Job, JobError, JobHandler},
    traits::{InventoryManagement, Notifier, OrderManagement, PaymentGateway, UserDirectory},
    wh_api::{
        order_jobs::{order_id_for, retryable, with_order_lease},
        PipelineSettings,
    },
};

/// Handles `DELIVER_AFTER_ORDER` jobs.
///
/// Manually delivered lines are passed on to the fulfilment operator. Automatically delivered lines are allocated
/// codes from the product's pool, which are sent to the buyer and then marked redeemed. If any line cannot be covered
/// by the pool, the payment is refunded, the buyer is told, and nothing is sent.
///
/// Only orders that are `PAID_AWAITING_SHIPMENT` are delivered. A run for any other order is a no-op, so repeated
/// deliveries of the same job are harmless.
pub struct FulfillmentWorker<B, G: ?Sized, N: ?Sized> {
    db: B,
    gateway: Arc<G>,
    notifier: Arc<N>,
    settings: PipelineSettings,
}

impl<B, G: ?Sized, N: ?Sized> Debug for FulfillmentWorker<B, G, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FulfillmentWorker")
    }
}

impl<B, G: ?Sized, N: ?Sized> FulfillmentWorker<B, G, N> {
    pub fn new(db: B, gateway: Arc<G>, notifier: Arc<N>, settings: PipelineSettings) -> Self {
        Self { db, gateway, notifier, settings }
    }
}

impl<B, G, N> FulfillmentWorker<B, G, N>
where
    B: OrderManagement + InventoryManagement + UserDirectory,
    G: PaymentGateway + ?Sized,
    N: Notifier + ?Sized,
{
    pub async fn deliver(&self, order_id: OrderId) -> Result<(), JobError> {
        let details = self
            .db
            .fetch_order_details(order_id)
            .await
            .map_err(retryable)?
            .ok_or_else(|| JobError::Permanent(format!("Order {order_id} does not exist")))?;
        if details.order.status == OrderStatusType::AwaitingPayment && details.order.payment_attempt.is_some() {
            // The capture queued this job and has not stored the new status yet
            return Err(JobError::Retryable(format!("The payment for order {order_id} has not been recorded yet")));
        }
        if details.order.status != OrderStatusType::PaidAwaitingShipment {
            info!("📦️ Order {order_id} is {}. Nothing to deliver", details.order.status);
            return Ok(());
        }
        let mut deliveries: Vec<(&OrderLine, Vec<ProductCode>)> = Vec::new();
        for line in &details.lines {
            match line.product.product_type {
                ProductType::ManuallyDelivered => self.notify_operator(&details, line).await,
                ProductType::AutomaticallyDelivered => {
                    match self.db.claim_codes(order_id, line.product.id, line.quantity).await.map_err(retryable)? {
                        CodeClaim::Claimed(codes) => deliveries.push((line, codes)),
                        CodeClaim::Shortfall { requested, available } => {
                            warn!(
                                "📦️ Order {order_id} needs {requested} codes for {}, but only {available} are left",
                                line.product.sku
                            );
                            return self.refund_for_stockout(&details, line).await;
                        },
                    }
                },
            }
        }
        let buyer = &details.creator.email;
        for (line, codes) in &deliveries {
            let subject = format!("Your codes for {}", line.product.name);
            let body = codes_message(&details, line, codes);
            self.notifier.send(buyer, &subject, &body).await.map_err(|e| {
                error!("📦️ Could not send the codes for {} on order {order_id} to {buyer}. {e}", line.product.sku);
                retryable(e)
            })?;
        }
        let code_ids = deliveries.iter().flat_map(|(_, codes)| codes.iter().map(|c| c.id)).collect::<Vec<CodeId>>();
        let redeemed = self.db.redeem_codes(&code_ids).await.map_err(retryable)?;
        self.db
            .update_order(order_id, OrderUpdate::default().with_status(OrderStatusType::Delivered))
            .await
            .map_err(retryable)?;
        info!("📦️ Order {order_id} delivered. {redeemed} codes redeemed");
        Ok(())
    }

    /// Tells the operator about a manually delivered line. A missing operator or a failed message does not stop
    /// delivery of the rest of the order.
    async fn notify_operator(&self, details: &OrderDetails, line: &OrderLine) {
        let order_id = details.order.id;
        let operator = match self.db.fulfillment_operator(self.settings.trusted_privilege_level).await {
            Ok(Some(operator)) => operator,
            Ok(None) => {
                warn!("📦️ There is no operator to fulfil {} on order {order_id}. Skipping it", line.product.sku);
                return;
            },
            Err(e) => {
                warn!("📦️ Could not look up the operator for {} on order {order_id}. {e}", line.product.sku);
                return;
            },
        };
        let subject = format!("Order {order_id} needs fulfilment");
        let body = format!(
            "Please deliver {} x {} ({}) to {} <{}>.",
            line.quantity, line.product.name, line.product.sku, details.creator.full_name, details.creator.email
        );
        match self.notifier.send(&operator.email, &subject, &body).await {
            Ok(()) => debug!("📦️ {} asked to deliver {} for order {order_id}", operator.email, line.product.sku),
            Err(e) => warn!("📦️ Could not notify {} about order {order_id}. {e}", operator.email),
        }
    }

    /// Refunds the order's payment and closes the order. The codes this order was holding go back to the pool.
    ///
    /// The gateway is asked about the payment first, so a retry after a successful refund does not refund twice.
    async fn refund_for_stockout(&self, details: &OrderDetails, line: &OrderLine) -> Result<(), JobError> {
        let order_id = details.order.id;
        let payment_id = details
            .order
            .payment_id()
            .ok_or_else(|| JobError::Permanent(format!("Order {order_id} is paid but has no payment to refund")))?;
        let released = self.db.release_claims(order_id).await.map_err(retryable)?;
        trace!("📦️ {released} codes held by order {order_id} returned to the pool");
        let current = self.gateway.fetch_payment(payment_id).await.map_err(retryable)?;
        if current.status == PaymentStatus::Refunded {
            info!("📦️ Payment {payment_id} for order {order_id} has already been refunded");
        } else {
            self.gateway.refund_payment(payment_id).await.map_err(|e| {
                error!("📦️ Could not refund payment {payment_id} for order {order_id}. {e}");
                retryable(e)
            })?;
            info!("📦️ Payment {payment_id} for order {order_id} refunded");
        }
        let update =
            OrderUpdate::default().with_status(OrderStatusType::Delivered).with_payment_status(PaymentStatus::Refunded);
        self.db.update_order(order_id, update).await.map_err(retryable)?;
        let buyer = &details.creator.email;
        let subject = format!("Order {order_id} has been refunded");
        let body = format!(
            "Sorry, {} is out of stock, so we could not complete your order. Your payment of {} {} has been refunded.",
            line.product.name, details.order.total, details.order.currency
        );
        if let Err(e) = self.notifier.send(buyer, &subject, &body).await {
            warn!("📦️ Could not tell {buyer} about the refund for order {order_id}. {e}");
        }
        Ok(())
    }
}

fn codes_message(details: &OrderDetails, line: &OrderLine, codes: &[ProductCode]) -> String {
    let list = codes.iter().map(|c| c.code.as_str()).collect::<Vec<_>>().join("\n");
    format!(
        "Hi {},\n\nThank you for order {}. Here are your {} codes for {}:\n\n{list}\n",
        details.creator.full_name, details.order.id, line.quantity, line.product.name
    )
}

#[async_trait]
impl<B, G, N> JobHandler for FulfillmentWorker<B, G, N>
where
    B: OrderManagement + InventoryManagement + UserDirectory,
    G: PaymentGateway + ?Sized + 'static,
    N: Notifier + ?Sized + 'static,
{
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let order_id = order_id_for(job)?;
        trace!("📦️ Delivering order {order_id} ({})", job.id);
        with_order_lease(&self.db, order_id, job, &self.settings, || self.deliver(order_id)).await
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        db_types::{NewOrder, OrderItem, PaymentAttempt, Product, User},
        test_utils::{
            fakes::{FakeGateway, RecordingNotifier},
            fixtures::{create_buyer, create_code_product, create_manual_product, create_operator},
            prepare_env::{prepare_test_env, random_db_path},
        },
        traits::PaymentInfo,
        wh_api::test_mocks::{MockGateway, MockMailer},
        SqliteDatabase,
    };

    async fn paid_order(db: &SqliteDatabase, buyer: &User, lines: &[(&Product, i64)]) -> OrderId {
        let items = lines
            .iter()
            .map(|(p, quantity)| OrderItem { product_id: p.id, price: p.price, quantity: *quantity })
            .collect();
        let order = db.create_order(NewOrder::new(buyer.id, items, "INR", "order_xyz")).await.unwrap();
        db.attach_payment_attempt(order.id, PaymentAttempt::new("MockPay", "pay_123")).await.unwrap();
        let update = OrderUpdate::default()
            .with_status(OrderStatusType::PaidAwaitingShipment)
            .with_payment_status(PaymentStatus::Captured);
        db.update_order(order.id, update).await.unwrap();
        order.id
    }

    #[tokio::test]
    async fn stockout_refunds_once_and_tells_the_buyer() {
        let db = prepare_test_env(&random_db_path()).await;
        let buyer = create_buyer(&db, "buyer@example.com").await;
        let product = create_code_product(&db, "GAME-KEY", 2_500, 1).await;
        let order_id = paid_order(&db, &buyer, &[(&product, 2)]).await;

        let mut gateway = MockGateway::new();
        gateway.expect_fetch_payment().times(1).returning(|id| Ok(PaymentInfo::new(id, PaymentStatus::Captured)));
        gateway.expect_refund_payment().times(1).returning(|id| {
            assert_eq!(id, "pay_123");
            Ok(())
        });
        let mut mailer = MockMailer::new();
        mailer.expect_send().times(1).returning(|to, subject, _| {
            assert_eq!(to, "buyer@example.com");
            assert!(subject.contains("refunded"));
            Ok(())
        });
        let worker = FulfillmentWorker::new(db.clone(), Arc::new(gateway), Arc::new(mailer), PipelineSettings::default());
        worker.deliver(order_id).await.unwrap();

        let order = db.fetch_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Delivered);
        assert_eq!(order.payment_attempt.unwrap().status, Some(PaymentStatus::Refunded));
        let codes = db.fetch_codes(product.id).await.unwrap();
        assert!(codes.iter().all(|c| !c.redeemed && c.claimed_by.is_none()));
    }

    #[tokio::test]
    async fn stockout_on_a_later_line_releases_the_earlier_claims() {
        let db = prepare_test_env(&random_db_path()).await;
        let buyer = create_buyer(&db, "buyer@example.com").await;
        let in_stock = create_code_product(&db, "GAME-KEY", 2_500, 2).await;
        let short = create_code_product(&db, "DLC-KEY", 1_000, 1).await;
        let order_id = paid_order(&db, &buyer, &[(&in_stock, 2), (&short, 2)]).await;

        let mut gateway = MockGateway::new();
        gateway.expect_fetch_payment().times(1).returning(|id| Ok(PaymentInfo::new(id, PaymentStatus::Captured)));
        gateway.expect_refund_payment().times(1).returning(|_| Ok(()));
        let mut mailer = MockMailer::new();
        mailer.expect_send().times(1).returning(|to, subject, body| {
            assert_eq!(to, "buyer@example.com");
            assert!(subject.contains("refunded"));
            assert!(!body.contains("GAME-KEY-1") && !body.contains("GAME-KEY-2"));
            Ok(())
        });
        let worker = FulfillmentWorker::new(db.clone(), Arc::new(gateway), Arc::new(mailer), PipelineSettings::default());
        worker.deliver(order_id).await.unwrap();

        let order = db.fetch_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Delivered);
        assert_eq!(order.payment_attempt.unwrap().status, Some(PaymentStatus::Refunded));
        for product in [&in_stock, &short] {
            let codes = db.fetch_codes(product.id).await.unwrap();
            assert!(codes.iter().all(|c| !c.redeemed && c.claimed_by.is_none()));
        }
        assert_eq!(db.available_quantity(in_stock.id).await.unwrap(), crate::db_types::Availability::Limited(2));
    }

    #[tokio::test]
    async fn codes_are_sent_then_redeemed() {
        let db = prepare_test_env(&random_db_path()).await;
        let buyer = create_buyer(&db, "buyer@example.com").await;
        let product = create_code_product(&db, "GAME-KEY", 2_500, 3).await;
        let order_id = paid_order(&db, &buyer, &[(&product, 2)]).await;

        let mut mailer = MockMailer::new();
        mailer.expect_send().times(1).returning(|to, _, body| {
            assert_eq!(to, "buyer@example.com");
            assert!(body.contains("GAME-KEY-1") && body.contains("GAME-KEY-2"));
            assert!(!body.contains("GAME-KEY-3"));
            Ok(())
        });
        let worker =
            FulfillmentWorker::new(db.clone(), Arc::new(MockGateway::new()), Arc::new(mailer), PipelineSettings::default());
        worker.deliver(order_id).await.unwrap();

        let order = db.fetch_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Delivered);
        let codes = db.fetch_codes(product.id).await.unwrap();
        assert_eq!(codes.iter().filter(|c| c.redeemed).count(), 2);
        assert_eq!(codes.iter().filter(|c| c.claimed_by == Some(order_id)).count(), 2);
        assert!(!codes[2].redeemed);
    }

    #[tokio::test]
    async fn failed_send_is_retried_with_the_same_codes() {
        let db = prepare_test_env(&random_db_path()).await;
        let buyer = create_buyer(&db, "buyer@example.com").await;
        let product = create_code_product(&db, "GAME-KEY", 2_500, 3).await;
        let order_id = paid_order(&db, &buyer, &[(&product, 2)]).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let worker =
            FulfillmentWorker::new(db.clone(), Arc::new(FakeGateway::new()), notifier.clone(), PipelineSettings::default());

        notifier.fail_sends(true);
        let err = worker.deliver(order_id).await.unwrap_err();
        assert!(matches!(err, JobError::Retryable(_)));
        let held = db.fetch_codes(product.id).await.unwrap();
        assert_eq!(held.iter().filter(|c| c.claimed_by == Some(order_id)).count(), 2);
        assert!(held.iter().all(|c| !c.redeemed));

        notifier.fail_sends(false);
        worker.deliver(order_id).await.unwrap();
        let codes = db.fetch_codes(product.id).await.unwrap();
        let redeemed = codes.iter().filter(|c| c.redeemed).map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(redeemed, vec![codes[0].id, codes[1].id]);
        assert_eq!(db.available_quantity(product.id).await.unwrap(), crate::db_types::Availability::Limited(1));
        assert_eq!(notifier.messages_to("buyer@example.com").len(), 1);
    }

    #[tokio::test]
    async fn manual_lines_go_to_the_newest_operator() {
        let db = prepare_test_env(&random_db_path()).await;
        let buyer = create_buyer(&db, "buyer@example.com").await;
        create_operator(&db, "old-op@example.com").await;
        create_operator(&db, "new-op@example.com").await;
        let product = create_manual_product(&db, "PRINTED-MUG", 899).await;
        let order_id = paid_order(&db, &buyer, &[(&product, 3)]).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let worker =
            FulfillmentWorker::new(db.clone(), Arc::new(FakeGateway::new()), notifier.clone(), PipelineSettings::default());
        worker.deliver(order_id).await.unwrap();

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, "new-op@example.com");
        assert!(messages[0].body.contains("3 x PRINTED-MUG"));
        assert!(messages[0].body.contains("buyer@example.com"));
        let order = db.fetch_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Delivered);
    }

    #[tokio::test]
    async fn missing_operator_does_not_block_delivery() {
        let db = prepare_test_env(&random_db_path()).await;
        let buyer = create_buyer(&db, "buyer@example.com").await;
        let product = create_manual_product(&db, "PRINTED-MUG", 899).await;
        let order_id = paid_order(&db, &buyer, &[(&product, 1)]).await;
        let notifier = Arc::new(RecordingNotifier::new());
        let worker =
            FulfillmentWorker::new(db.clone(), Arc::new(FakeGateway::new()), notifier.clone(), PipelineSettings::default());
        worker.deliver(order_id).await.unwrap();
        assert!(notifier.messages().is_empty());
        let order = db.fetch_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::Delivered);
    }

    #[tokio::test]
    async fn unpaid_orders_are_left_alone() {
        let db = prepare_test_env(&random_db_path()).await;
        let buyer = create_buyer(&db, "buyer@example.com").await;
        let product = create_code_product(&db, "GAME-KEY", 2_500, 3).await;
        let items = vec![OrderItem { product_id: product.id, price: product.price, quantity: 1 }];
        let order = db.create_order(NewOrder::new(buyer.id, items, "INR", "order_1")).await.unwrap();
        let worker = FulfillmentWorker::new(
            db.clone(),
            Arc::new(MockGateway::new()),
            Arc::new(MockMailer::new()),
            PipelineSettings::default(),
        );
        worker.deliver(order.id).await.unwrap();
        let order = db.fetch_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatusType::AwaitingPayment);
        assert!(db.fetch_codes(product.id).await.unwrap().iter().all(|c| c.claimed_by.is_none()));
    }
}

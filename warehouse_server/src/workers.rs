use std::sync::Arc;

use futures::future::join;
use log::*;
use warehouse_engine::{
    job_queue::{JobQueue, WorkerPool},
    wh_api::{CHECK_PENDING_TX, DELIVER_AFTER_ORDER},
    FulfillmentWorker,
    Notifier,
    PaymentGateway,
    ReconciliationWorker,
    SqliteDatabase,
};

use crate::{config::ServerConfig, errors::ServerError};

/// The worker pools for both pipeline queues.
pub struct PipelineWorkers {
    delivery: WorkerPool,
    reconciliation: WorkerPool,
}

/// Starts a worker pool for each pipeline queue. Jobs left running by a previous process are recovered first.
pub async fn start_workers(
    db: SqliteDatabase,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    config: &ServerConfig,
) -> Result<PipelineWorkers, ServerError> {
    let settings = config.pipeline_settings();
    let fulfillment = FulfillmentWorker::new(db.clone(), Arc::clone(&gateway), notifier, settings.clone());
    let reconciliation = ReconciliationWorker::new(db.clone(), db.clone(), gateway, settings);
    let delivery_config = config.worker_config(config.delivery_workers);
    let reconcile_config = config.worker_config(config.reconcile_workers);
    // Both queues are checked before any worker runs, so a failed start leaves nothing behind
    for (queue, worker_config) in [(DELIVER_AFTER_ORDER, &delivery_config), (CHECK_PENDING_TX, &reconcile_config)] {
        let recovered = db.recover_stalled(queue, worker_config.stalled_after).await?;
        if recovered > 0 {
            warn!("🚀️ Recovered {recovered} stalled jobs on {queue}");
        }
    }
    let delivery = WorkerPool::spawn(db.clone(), DELIVER_AFTER_ORDER, Arc::new(fulfillment), delivery_config);
    let reconciliation = WorkerPool::spawn(db, CHECK_PENDING_TX, Arc::new(reconciliation), reconcile_config);
    info!(
        "🚀️ Pipeline workers started. {} on {DELIVER_AFTER_ORDER}, {} on {CHECK_PENDING_TX}",
        config.delivery_workers, config.reconcile_workers
    );
    Ok(PipelineWorkers { delivery, reconciliation })
}

impl PipelineWorkers {
    /// Stops both pools, letting jobs that are already running finish.
    pub async fn shutdown(self) {
        info!("🚀️ Stopping pipeline workers");
        join(self.delivery.shutdown(), self.reconciliation.shutdown()).await;
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::time::sleep;
    use warehouse_engine::{
        db_types::{NewOrder, OrderItem, OrderStatusType, OrderUpdate, PaymentAttempt, PaymentStatus},
        job_queue::{JobOptions, JobState},
        test_utils::{
            fakes::{FakeGateway, RecordingNotifier},
            fixtures::{create_buyer, create_code_product},
            prepare_env::{create_database, prepare_test_env, random_db_path},
        },
        wh_api::order_jobs::enqueue_delivery,
        OrderManagement,
    };

    use super::*;

    #[tokio::test]
    async fn workers_deliver_queued_orders() {
        let db = prepare_test_env(&random_db_path()).await;
        let buyer = create_buyer(&db, "buyer@example.com").await;
        let product = create_code_product(&db, "GIFT-CARD", 1_000, 2).await;
        let items = vec![OrderItem { product_id: product.id, price: product.price, quantity: 1 }];
        let order = db.create_order(NewOrder::new(buyer.id, items, "INR", "order_1")).await.unwrap();
        db.attach_payment_attempt(order.id, PaymentAttempt::new("FakePay", "pay_1")).await.unwrap();
        let update = OrderUpdate::default()
            .with_status(OrderStatusType::PaidAwaitingShipment)
            .with_payment_status(PaymentStatus::Captured);
        db.update_order(order.id, update).await.unwrap();

        let config = ServerConfig { delivery_workers: 2, reconcile_workers: 1, ..ServerConfig::default() };
        enqueue_delivery(&db, order.id, &config.pipeline_settings()).await.unwrap();
        let notifier = Arc::new(RecordingNotifier::new());
        let workers = start_workers(db.clone(), Arc::new(FakeGateway::new()), notifier.clone(), &config).await.unwrap();
        let mut status = OrderStatusType::PaidAwaitingShipment;
        for _ in 0..100 {
            status = db.fetch_order(order.id).await.unwrap().unwrap().status;
            if status == OrderStatusType::Delivered {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        workers.shutdown().await;
        assert_eq!(status, OrderStatusType::Delivered);
        let sent = notifier.messages_to("buyer@example.com");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("GIFT-CARD-1"));
    }

    #[tokio::test]
    async fn a_failed_start_leaves_no_workers_running() {
        let url = random_db_path();
        create_database(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.unwrap();
        let config = ServerConfig {
            delivery_workers: 1,
            reconcile_workers: 1,
            job_timeout: Duration::from_secs(1),
            ..ServerConfig::default()
        };
        // Without migrations there is no job table to recover from
        let notifier = Arc::new(RecordingNotifier::new());
        let result = start_workers(db.clone(), Arc::new(FakeGateway::new()), notifier, &config).await;
        assert!(result.is_err());

        db.run_migrations().await.unwrap();
        let job = db.enqueue(DELIVER_AFTER_ORDER, "1", &serde_json::json!({"id": 1}), JobOptions::default()).await.unwrap();
        sleep(Duration::from_millis(1_200)).await;
        let stored = db.fetch_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Waiting);
        assert_eq!(stored.attempts_made, 0);
    }
}

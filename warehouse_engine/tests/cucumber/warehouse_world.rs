use std::{collections::HashMap, sync::Arc, time::Duration};

use cucumber::World;
use log::*;
use warehouse_engine::{
    db_types::{OrderId, Product, User},
    test_utils::{
        fakes::{FakeGateway, RecordingNotifier},
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    FulfillmentWorker,
    OrderCreationApi,
    PaymentCaptureApi,
    PipelineSettings,
    ReconciliationWorker,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct WarehouseWorld {
    pub system: Option<WarehouseSystem>,
    pub users: HashMap<String, User>,
    pub products: HashMap<String, Product>,
    /// The most recent order placed by each buyer
    pub orders: HashMap<String, OrderId>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct WarehouseSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub settings: PipelineSettings,
}

impl WarehouseWorld {
    pub fn system(&self) -> &WarehouseSystem {
        self.system.as_ref().expect("Warehouse system not initialised")
    }

    pub fn db(&self) -> &SqliteDatabase {
        &self.system().db
    }

    pub fn user(&self, email: &str) -> &User {
        self.users.get(email).unwrap_or_else(|| panic!("No user {email}"))
    }

    pub fn product(&self, sku: &str) -> &Product {
        self.products.get(sku).unwrap_or_else(|| panic!("No product {sku}"))
    }

    pub fn order_for(&self, email: &str) -> OrderId {
        *self.orders.get(email).unwrap_or_else(|| panic!("{email} has not placed an order"))
    }
}

impl WarehouseSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        // Short intervals so that scheduled jobs come due within a scenario
        let settings = PipelineSettings {
            reconcile_interval: Duration::from_millis(50),
            job_backoff: Duration::from_millis(10),
            lease_retry_delay: Duration::from_millis(10),
            ..PipelineSettings::default()
        };
        let gateway = Arc::new(FakeGateway::new());
        let notifier = Arc::new(RecordingNotifier::new());
        Self { db_path: url, db, gateway, notifier, settings }
    }

    pub fn order_creation(&self) -> OrderCreationApi<SqliteDatabase, FakeGateway> {
        OrderCreationApi::new(self.db.clone(), Arc::clone(&self.gateway), self.settings.store_currency.clone())
    }

    pub fn payment_capture(&self) -> PaymentCaptureApi<SqliteDatabase, SqliteDatabase, FakeGateway> {
        PaymentCaptureApi::new(self.db.clone(), self.db.clone(), Arc::clone(&self.gateway), self.settings.clone())
    }

    pub fn reconciliation(&self) -> ReconciliationWorker<SqliteDatabase, SqliteDatabase, FakeGateway> {
        ReconciliationWorker::new(self.db.clone(), self.db.clone(), Arc::clone(&self.gateway), self.settings.clone())
    }

    pub fn fulfillment(&self) -> FulfillmentWorker<SqliteDatabase, FakeGateway, RecordingNotifier> {
        FulfillmentWorker::new(
            self.db.clone(),
            Arc::clone(&self.gateway),
            Arc::clone(&self.notifier),
            self.settings.clone(),
        )
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}

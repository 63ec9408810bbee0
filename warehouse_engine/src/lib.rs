//! Warehouse Engine
//!
//! The warehouse engine turns shopping carts into paid, fulfilled orders. It coordinates with an external payment
//! gateway and a finite pool of redeemable product codes, and it is built to survive partial failure at every step:
//! gateway timeouts, duplicate job runs, stock running out between checkout and delivery, and refunds that must only
//! happen once.
//!
//! The library is divided into these main sections:
//! 1. Domain types ([`mod@db_types`]) and the interfaces the pipeline relies on ([`mod@traits`]): the ledger store, the
//!    payment gateway and the notifier.
//! 2. A durable, retrying job queue ([`mod@job_queue`]) with a worker pool that runs job handlers concurrently.
//! 3. The SQLite backend ([`SqliteDatabase`]), which implements both the ledger store and the job queue.
//! 4. The pipeline itself ([`mod@wh_api`]): order creation, payment capture, and the reconciliation and fulfilment
//!    workers.
pub mod db_types;
pub mod job_queue;
pub mod traits;
pub mod wh_api;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(all(feature = "sqlite", any(feature = "test_utils", test)))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::{db::db_url, SqliteDatabase};
pub use traits::{
    CartManagement,
    GatewayError,
    InventoryManagement,
    LedgerError,
    LedgerStore,
    Notifier,
    NotifierError,
    OrderManagement,
    PaymentGateway,
    PaymentInfo,
    UserDirectory,
};
pub use wh_api::{
    order_objects,
    ApiResponse,
    CartApi,
    FulfillmentWorker,
    InventoryApi,
    OrderCreationApi,
    OrderQueryApi,
    PaymentCaptureApi,
    PipelineError,
    PipelineSettings,
    ReconciliationWorker,
};

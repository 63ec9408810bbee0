//! # The warehouse order pipeline
//!
//! The public face of the engine. Synchronous entry points ([`OrderCreationApi`], [`PaymentCaptureApi`],
//! [`CartApi`], [`OrderQueryApi`], [`InventoryApi`]) answer buyer and administrator requests. The asynchronous half of
//! the pipeline is driven by two job handlers:
//!
//! * [`ReconciliationWorker`] consumes [`CHECK_PENDING_TX`] and polls the gateway for payments that were not
//!   confirmed at capture time.
//! * [`FulfillmentWorker`] consumes [`DELIVER_AFTER_ORDER`] and delivers paid orders, refunding them when the code
//!   pool has run dry.
//!
//! Every job run takes the per-order lease before touching an order, so a reconciliation run and a delivery run for
//! the same order never interleave.
pub mod cart_api;
pub mod errors;
pub mod fulfillment;
pub mod inventory_api;
pub mod order_creation_api;
pub mod order_jobs;
pub mod order_objects;
pub mod order_query_api;
pub mod payment_capture_api;
pub mod pipeline_settings;
pub mod reconciliation;
pub mod response;

#[cfg(test)]
mod test_mocks;

pub use cart_api::CartApi;
pub use errors::PipelineError;
pub use fulfillment::FulfillmentWorker;
pub use inventory_api::InventoryApi;
pub use order_creation_api::OrderCreationApi;
pub use order_jobs::{OrderJobPayload, CHECK_PENDING_TX, DELIVER_AFTER_ORDER};
pub use order_query_api::OrderQueryApi;
pub use payment_capture_api::PaymentCaptureApi;
pub use pipeline_settings::PipelineSettings;
pub use reconciliation::ReconciliationWorker;
pub use response::ApiResponse;

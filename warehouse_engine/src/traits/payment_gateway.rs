use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{MinorUnits, PaymentStatus};

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Could not initialize the payment gateway client: {0}")]
    Initialization(String),
    #[error("Could not send the request to the payment gateway: {0}")]
    RequestError(String),
    #[error("Invalid response from the payment gateway: {0}")]
    ResponseError(String),
    #[error("The payment gateway rejected the request. Status {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Could not (de)serialize payment gateway data: {0}")]
    JsonError(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::JsonError(e.to_string())
    }
}

/// The gateway's view of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub id: String,
    pub status: PaymentStatus,
    pub amount: Option<MinorUnits>,
}

impl PaymentInfo {
    pub fn new<S: Into<String>>(id: S, status: PaymentStatus) -> Self {
        Self { id: id.into(), status, amount: None }
    }
}

/// The external payment processor of record.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The provider name recorded on payment attempts, e.g. "Razorpay".
    fn provider_name(&self) -> &'static str;

    /// Opens a payment order with the gateway for the given amount. Returns the gateway's id for the order.
    async fn create_remote_order(&self, amount: MinorUnits, currency: &str) -> Result<String, GatewayError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentInfo, GatewayError>;

    /// Refunds the full amount of the payment.
    async fn refund_payment(&self, payment_id: &str) -> Result<(), GatewayError>;
}

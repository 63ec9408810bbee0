use thiserror::Error;

use crate::{
    db_types::{CartLineId, OrderId, ProductId},
    job_queue::JobQueueError,
    traits::{GatewayError, LedgerError},
};

/// Errors returned by the synchronous pipeline APIs. Each maps to a stable error code via [`Self::error_code`].
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("There are no products in the cart")]
    NoProductsInCart,
    #[error("Product {0} is not available in the requested quantity")]
    ProductUnsatisfiable(ProductId),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {0} does not belong to this user")]
    OrderNotOwned(OrderId),
    #[error("A payment has already been added to order {0}")]
    PaymentAlreadyAdded(OrderId),
    #[error("Product {0} does not exist")]
    NoProductFound(ProductId),
    #[error("Cart line {0} does not belong to this user")]
    CartLineNotOwned(CartLineId),
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),
    #[error("Payment gateway error. {0}")]
    GatewayError(#[from] GatewayError),
    #[error("Database error. {0}")]
    DatabaseError(String),
    #[error("Job queue error. {0}")]
    QueueError(#[from] JobQueueError),
}

impl PipelineError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::NoProductsInCart => "NO_PRODUCTS_IN_CART",
            PipelineError::ProductUnsatisfiable(_) => "PRODUCT_UNSATISFIABLE",
            PipelineError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            PipelineError::OrderNotOwned(_) => "ORDER_NOT_OWNED",
            PipelineError::PaymentAlreadyAdded(_) => "PAYMENT_ALREADY_ADDED",
            PipelineError::NoProductFound(_) => "NO_PRODUCT_FOUND",
            PipelineError::CartLineNotOwned(_) => "CART_LINE_NOT_OWNED",
            PipelineError::InvalidQuantity(_) => "INVALID_QUANTITY",
            PipelineError::GatewayError(_) => "GATEWAY_ERROR",
            PipelineError::DatabaseError(_) => "DATABASE_ERROR",
            PipelineError::QueueError(_) => "QUEUE_ERROR",
        }
    }
}

impl From<LedgerError> for PipelineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::OrderNotFound(id) => PipelineError::OrderNotFound(id),
            LedgerError::ProductNotFound(id) => PipelineError::NoProductFound(id),
            LedgerError::CartLineNotFound(id) => PipelineError::CartLineNotOwned(id),
            LedgerError::PaymentAlreadyAdded(id) => PipelineError::PaymentAlreadyAdded(id),
            LedgerError::InvalidQuantity(q) => PipelineError::InvalidQuantity(q),
            e => PipelineError::DatabaseError(e.to_string()),
        }
    }
}

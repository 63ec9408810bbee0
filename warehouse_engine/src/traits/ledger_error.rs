use thiserror::Error;

use crate::db_types::{CartLineId, OrderId, ProductId, UserId};

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested product {0} does not exist")]
    ProductNotFound(ProductId),
    #[error("The requested user {0} does not exist")]
    UserNotFound(UserId),
    #[error("Cart line {0} does not exist or does not belong to the user")]
    CartLineNotFound(CartLineId),
    #[error("Order {0} already has a payment attempt attached")]
    PaymentAlreadyAdded(OrderId),
    #[error("Cannot insert {0}, since it already exists")]
    AlreadyExists(String),
    #[error("Invalid quantity: {0}. Quantities must be at least 1, and the line total must be in range")]
    InvalidQuantity(i64),
    #[error("The requested order change would result in a no-op.")]
    OrderModificationNoOp,
    #[error("Codes can only be stocked for automatically delivered products. {0} is manually delivered")]
    NotCodeStocked(ProductId),
    #[error("Could not decode a stored value. {0}")]
    DecodeError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref de) if de.is_unique_violation() => LedgerError::AlreadyExists(de.to_string()),
            e => LedgerError::DatabaseError(e.to_string()),
        }
    }
}

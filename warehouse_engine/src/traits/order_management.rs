use std::time::Duration;

use async_trait::async_trait;

use crate::{
    db_types::{NewOrder, Order, OrderDetails, OrderId, OrderUpdate, PaymentAttempt, UserId},
    traits::LedgerError,
};

/// Order storage.
///
/// The order total and line items are fixed when the order is created and are never modified afterwards.
#[async_trait]
pub trait OrderManagement: Clone + Send + Sync + 'static {
    /// Stores a new order and its line items in a single atomic transaction. The order starts in
    /// `AWAITING_PAYMENT` and its total is computed from the line items.
    async fn create_order(&self, order: NewOrder) -> Result<Order, LedgerError>;

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, LedgerError>;

    /// Fetches the order together with its creator and the products of each line item.
    async fn fetch_order_details(&self, id: OrderId) -> Result<Option<OrderDetails>, LedgerError>;

    /// All orders created by the user, newest first.
    async fn fetch_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, LedgerError>;

    /// All orders in the ledger, newest first.
    async fn fetch_all_orders(&self) -> Result<Vec<Order>, LedgerError>;

    /// Attaches the payment attempt to the order. This is a conditional write: if the order already has a payment
    /// attempt, nothing is changed and [`LedgerError::PaymentAlreadyAdded`] is returned.
    async fn attach_payment_attempt(&self, id: OrderId, attempt: PaymentAttempt) -> Result<Order, LedgerError>;

    /// Applies the update to the order and returns the updated record. An empty update is rejected with
    /// [`LedgerError::OrderModificationNoOp`].
    async fn update_order(&self, id: OrderId, update: OrderUpdate) -> Result<Order, LedgerError>;

    /// Tries to take the execution lease for the order on behalf of `holder`.
    ///
    /// Returns `true` if the lease is now held by `holder`, either because it was free, had expired, or was already
    /// held by the same holder (in which case it is extended).
    async fn try_acquire_lease(&self, id: OrderId, holder: &str, ttl: Duration) -> Result<bool, LedgerError>;

    /// Releases the lease if, and only if, it is held by `holder`.
    async fn release_lease(&self, id: OrderId, holder: &str) -> Result<(), LedgerError>;
}

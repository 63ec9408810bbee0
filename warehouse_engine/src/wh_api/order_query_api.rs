use std::fmt::Debug;

use crate::{
    db_types::{Order, OrderId, UserId},
    traits::OrderManagement,
    wh_api::PipelineError,
};

/// Read-only access to orders for buyers and administrators.
pub struct OrderQueryApi<B> {
    db: B,
}

impl<B> Debug for OrderQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderQueryApi")
    }
}

impl<B> OrderQueryApi<B>
where B: OrderManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Fetches one of the user's orders. Orders that do not exist and orders that belong to someone else are
    /// indistinguishable to the caller.
    pub async fn order_for_user(&self, user_id: UserId, order_id: OrderId) -> Result<Order, PipelineError> {
        match self.db.fetch_order(order_id).await? {
            Some(order) if order.creator_id == user_id => Ok(order),
            _ => Err(PipelineError::OrderNotOwned(order_id)),
        }
    }

    /// The user's orders, newest first.
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, PipelineError> {
        Ok(self.db.fetch_orders_for_user(user_id).await?)
    }

    /// Every order, newest first. For administrators.
    pub async fn all_orders(&self) -> Result<Vec<Order>, PipelineError> {
        Ok(self.db.fetch_all_orders().await?)
    }
}

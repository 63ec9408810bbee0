use std::{fmt::Debug, sync::Arc};

use log::*;

use crate::{
    db_types::{items_total, NewOrder, OrderItem, UserId},
    traits::{CartManagement, InventoryManagement, OrderManagement, PaymentGateway},
    wh_api::{order_objects::NewOrderResult, PipelineError},
};

/// `OrderCreationApi` turns a user's cart into an order awaiting payment.
pub struct OrderCreationApi<B, G: ?Sized> {
    db: B,
    gateway: Arc<G>,
    currency: String,
}

impl<B, G: ?Sized> Debug for OrderCreationApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderCreationApi ({})", self.currency)
    }
}

impl<B, G: ?Sized> OrderCreationApi<B, G> {
    pub fn new<S: Into<String>>(db: B, gateway: Arc<G>, currency: S) -> Self {
        Self { db, gateway, currency: currency.into() }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> OrderCreationApi<B, G>
where
    B: OrderManagement + CartManagement + InventoryManagement,
    G: PaymentGateway + ?Sized,
{
    /// Places an order for everything in the user's cart.
    ///
    /// Every line is checked against current availability first. This check is advisory: stock can still run out
    /// before the order is fulfilled, which is handled at delivery time. Once the check passes, the cart is emptied,
    /// a payment order for the total is opened with the gateway, and the order is stored in `AWAITING_PAYMENT` with
    /// the prices and quantities of the cart at this moment.
    ///
    /// A cart whose total does not fit in minor units is refused with `INVALID_QUANTITY` before anything changes.
    ///
    /// None of the later steps are undone if a subsequent one fails.
    pub async fn create_order(&self, user_id: UserId) -> Result<NewOrderResult, PipelineError> {
        let cart = self.db.fetch_cart(user_id).await?;
        if cart.is_empty() {
            debug!("🛒️ User {user_id} tried to place an order with an empty cart");
            return Err(PipelineError::NoProductsInCart);
        }
        for entry in &cart {
            let available = self.db.available_quantity(entry.product.id).await?;
            if !available.satisfies(entry.line.quantity) {
                info!(
                    "🛒️ User {user_id} wants {} of {} but only {available} are available",
                    entry.line.quantity, entry.product.sku
                );
                return Err(PipelineError::ProductUnsatisfiable(entry.product.id));
            }
        }
        let items = cart.iter().map(OrderItem::from).collect::<Vec<_>>();
        let total = items_total(&items).ok_or_else(|| {
            let quantity = items.iter().map(|i| i.quantity).max().unwrap_or_default();
            warn!("🛒️ The cart of user {user_id} adds up to more than can be charged. Largest quantity: {quantity}");
            PipelineError::InvalidQuantity(quantity)
        })?;
        let cleared = self.db.clear_cart(user_id).await?;
        trace!("🛒️ Cleared {cleared} lines from the cart of user {user_id}");
        let gateway_order_id = self.gateway.create_remote_order(total, &self.currency).await.map_err(|e| {
            error!("🛒️ Could not open a payment order for user {user_id}. {e}");
            e
        })?;
        let order = self.db.create_order(NewOrder::new(user_id, items, self.currency.clone(), gateway_order_id)).await?;
        info!("🛒️ Order {} created for user {user_id}. Total {} {}", order.id, order.total, order.currency);
        Ok(NewOrderResult {
            order_id: order.id,
            gateway_order_id: order.gateway_order_id,
            total: order.total,
            currency: order.currency,
        })
    }
}

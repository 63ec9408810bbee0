use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{CartLine, CartLineId, ProductId, UserId},
    traits::CartManagement,
    wh_api::{order_objects::CartSummary, PipelineError},
};

/// Manages a user's shopping cart ahead of order creation.
pub struct CartApi<B> {
    db: B,
}

impl<B> Debug for CartApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CartApi")
    }
}

impl<B> CartApi<B>
where B: CartManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Adds the product to the cart. Adding a product that is already in the cart increases its quantity.
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartLine, PipelineError> {
        let line = self.db.add_to_cart(user_id, product_id, quantity).await?;
        debug!("🛒️ User {user_id} added {quantity} of product {product_id} to their cart");
        Ok(line)
    }

    pub async fn update_quantity(
        &self,
        user_id: UserId,
        line: CartLineId,
        quantity: i64,
    ) -> Result<CartLine, PipelineError> {
        Ok(self.db.update_cart_line(user_id, line, quantity).await?)
    }

    pub async fn remove_line(&self, user_id: UserId, line: CartLineId) -> Result<(), PipelineError> {
        self.db.remove_cart_line(user_id, line).await?;
        debug!("🛒️ User {user_id} removed cart line {line}");
        Ok(())
    }

    pub async fn cart(&self, user_id: UserId) -> Result<CartSummary, PipelineError> {
        let lines = self.db.fetch_cart(user_id).await?;
        let largest = lines.iter().map(|e| e.line.quantity).max().unwrap_or_default();
        CartSummary::new(lines).ok_or(PipelineError::InvalidQuantity(largest))
    }
}

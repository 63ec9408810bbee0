use async_trait::async_trait;

use crate::{
    db_types::{CartEntry, CartLine, CartLineId, ProductId, UserId},
    traits::LedgerError,
};

#[async_trait]
pub trait CartManagement: Clone + Send + Sync + 'static {
    /// The user's cart lines, joined with their products, in the order they were added.
    async fn fetch_cart(&self, user_id: UserId) -> Result<Vec<CartEntry>, LedgerError>;

    /// Adds `quantity` units of the product to the cart. If the user already has a line for this product, its
    /// quantity is incremented instead.
    async fn add_to_cart(&self, user_id: UserId, product_id: ProductId, quantity: i64)
        -> Result<CartLine, LedgerError>;

    /// Sets the quantity of one of the user's cart lines.
    async fn update_cart_line(&self, user_id: UserId, line: CartLineId, quantity: i64)
        -> Result<CartLine, LedgerError>;

    async fn remove_cart_line(&self, user_id: UserId, line: CartLineId) -> Result<(), LedgerError>;

    /// Deletes every line in the user's cart, returning the number of lines removed.
    async fn clear_cart(&self, user_id: UserId) -> Result<u64, LedgerError>;
}

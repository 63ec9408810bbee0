use async_trait::async_trait;

use crate::{
    db_types::{Availability, CodeClaim, CodeId, NewProduct, OrderId, Product, ProductCode, ProductId},
    traits::LedgerError,
};

/// Products and the pool of redeemable codes for automatically delivered products.
#[async_trait]
pub trait InventoryManagement: Clone + Send + Sync + 'static {
    async fn create_product(&self, product: NewProduct) -> Result<Product, LedgerError>;

    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>, LedgerError>;

    /// Adds new codes to an automatically delivered product's pool. Codes that are already stocked for the product
    /// are ignored. Returns the number of codes added.
    async fn add_codes(&self, product_id: ProductId, codes: &[String]) -> Result<u64, LedgerError>;

    /// Manually delivered products are always [`Availability::Unlimited`]. Automatically delivered products have
    /// as many units available as they have codes that are neither redeemed nor claimed by an order.
    async fn available_quantity(&self, product_id: ProductId) -> Result<Availability, LedgerError>;

    /// Atomically allocates `quantity` codes of the product to the order.
    ///
    /// Claims are keyed by order: codes the order already holds for this product count towards `quantity`, so
    /// calling this again for the same order never takes more stock. If the pool cannot cover the shortfall, nothing
    /// new is claimed and [`CodeClaim::Shortfall`] is returned. Concurrent callers never receive the same code.
    async fn claim_codes(&self, order_id: OrderId, product_id: ProductId, quantity: i64)
        -> Result<CodeClaim, LedgerError>;

    /// Returns every unredeemed code held by the order to the pool. Returns the number of codes released.
    async fn release_claims(&self, order_id: OrderId) -> Result<u64, LedgerError>;

    /// Marks the codes as redeemed. Redeemed codes are never handed out again.
    async fn redeem_codes(&self, codes: &[CodeId]) -> Result<u64, LedgerError>;

    async fn fetch_codes(&self, product_id: ProductId) -> Result<Vec<ProductCode>, LedgerError>;
}

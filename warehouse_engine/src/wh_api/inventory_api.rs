use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Availability, ProductId},
    traits::InventoryManagement,
    wh_api::PipelineError,
};

/// Stock administration for automatically delivered products.
pub struct InventoryApi<B> {
    db: B,
}

impl<B> Debug for InventoryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InventoryApi")
    }
}

impl<B> InventoryApi<B>
where B: InventoryManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Stocks the product with new codes. Blank codes and codes that are already stocked are skipped. Returns the
    /// number of codes added.
    pub async fn add_codes_to_product(&self, product_id: ProductId, codes: &[String]) -> Result<u64, PipelineError> {
        let codes = codes.iter().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect::<Vec<_>>();
        let added = self.db.add_codes(product_id, &codes).await?;
        info!("🗃️ {added} codes added to product {product_id}");
        Ok(added)
    }

    pub async fn availability(&self, product_id: ProductId) -> Result<Availability, PipelineError> {
        Ok(self.db.available_quantity(product_id).await?)
    }
}

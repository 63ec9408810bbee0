use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewProduct, Product, ProductId},
    traits::LedgerError,
};

pub async fn insert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, LedgerError> {
    let product: Product = sqlx::query_as(
        r#"
            INSERT INTO products (product_type, name, sku, price)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(product.product_type)
    .bind(product.name)
    .bind(product.sku)
    .bind(product.price)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Product {} ({}) created with id {}", product.sku, product.product_type, product.id);
    Ok(product)
}

pub async fn fetch_product(id: ProductId, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(conn).await
}

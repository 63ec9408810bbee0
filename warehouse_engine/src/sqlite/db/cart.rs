use log::debug;
use sqlx::SqliteConnection;

use super::products;
use crate::{
    db_types::{CartEntry, CartLine, CartLineId, ProductId, UserId},
    traits::LedgerError,
};

pub async fn fetch_cart(user_id: UserId, conn: &mut SqliteConnection) -> Result<Vec<CartEntry>, LedgerError> {
    let lines: Vec<CartLine> = sqlx::query_as("SELECT * FROM cart_lines WHERE user_id = $1 ORDER BY id")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    let mut entries = Vec::with_capacity(lines.len());
    for line in lines {
        let product = products::fetch_product(line.product_id, conn)
            .await?
            .ok_or(LedgerError::ProductNotFound(line.product_id))?;
        entries.push(CartEntry { line, product });
    }
    Ok(entries)
}

/// Adds to the user's line for the product, creating it if necessary.
pub async fn upsert_line(
    user_id: UserId,
    product_id: ProductId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<CartLine, LedgerError> {
    let line: CartLine = sqlx::query_as(
        r#"
            INSERT INTO cart_lines (user_id, product_id, quantity) VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE SET
                quantity = quantity + excluded.quantity,
                updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Cart line {} for user {user_id} now has {} of product {product_id}", line.id, line.quantity);
    Ok(line)
}

pub async fn set_quantity(
    user_id: UserId,
    line_id: CartLineId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<CartLine, LedgerError> {
    let line: Option<CartLine> = sqlx::query_as(
        r#"
            UPDATE cart_lines SET quantity = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND user_id = $3
            RETURNING *;
        "#,
    )
    .bind(quantity)
    .bind(line_id)
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    line.ok_or(LedgerError::CartLineNotFound(line_id))
}

pub async fn delete_line(user_id: UserId, line_id: CartLineId, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result = sqlx::query("DELETE FROM cart_lines WHERE id = $1 AND user_id = $2")
        .bind(line_id)
        .bind(user_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::CartLineNotFound(line_id));
    }
    Ok(())
}

pub async fn clear_cart(user_id: UserId, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM cart_lines WHERE user_id = $1").bind(user_id).execute(conn).await?;
    debug!("🗃️ Cleared {} lines from the cart of user {user_id}", result.rows_affected());
    Ok(result.rows_affected())
}

use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{CodeClaim, CodeId, OrderId, ProductCode, ProductId},
    traits::LedgerError,
};

/// Adds codes to the product's pool. Duplicate codes are skipped.
pub async fn insert_codes(
    product_id: ProductId,
    codes: &[String],
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let mut added = 0;
    for code in codes {
        let result = sqlx::query("INSERT OR IGNORE INTO product_codes (product_id, code) VALUES ($1, $2)")
            .bind(product_id)
            .bind(code)
            .execute(&mut *conn)
            .await?;
        added += result.rows_affected();
    }
    debug!("🗃️ Added {added} of {} codes to product {product_id}", codes.len());
    Ok(added)
}

/// The number of codes that are neither redeemed nor claimed by an order.
pub async fn count_free(product_id: ProductId, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM product_codes WHERE product_id = $1 AND redeemed = FALSE AND claimed_by IS NULL",
    )
    .bind(product_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

/// Tops up the order's holding of the product's codes to `quantity`, then returns the codes the order holds.
///
/// The top-up is a single conditional `UPDATE`, so concurrent claims never pick the same free code. Run this inside a
/// transaction: if the returned holding is short, the caller must roll back.
pub async fn claim_up_to(
    order_id: OrderId,
    product_id: ProductId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ProductCode>, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE product_codes SET claimed_by = $1
            WHERE id IN (
                SELECT id FROM product_codes
                WHERE product_id = $2 AND redeemed = FALSE AND claimed_by IS NULL
                ORDER BY id
                LIMIT MAX(0, $3 - (SELECT COUNT(*) FROM product_codes WHERE product_id = $2 AND claimed_by = $1))
            );
        "#,
    )
    .bind(order_id)
    .bind(product_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;
    trace!("🗃️ Order {order_id} claimed {} new codes for product {product_id}", result.rows_affected());
    held_by(order_id, product_id, conn).await
}

pub async fn held_by(
    order_id: OrderId,
    product_id: ProductId,
    conn: &mut SqliteConnection,
) -> Result<Vec<ProductCode>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM product_codes WHERE product_id = $1 AND claimed_by = $2 ORDER BY id")
        .bind(product_id)
        .bind(order_id)
        .fetch_all(conn)
        .await
}

/// Claims exactly `quantity` codes of the product for the order, or nothing at all.
pub async fn claim_codes(
    order_id: OrderId,
    product_id: ProductId,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<CodeClaim, LedgerError> {
    let mut tx = sqlx::Connection::begin(&mut *conn).await?;
    let held = claim_up_to(order_id, product_id, quantity, &mut *tx).await?;
    let held_count = held.len() as i64;
    if held_count < quantity {
        tx.rollback().await?;
        debug!("🗃️ Order {order_id} needs {quantity} codes for product {product_id}, but only {held_count} exist");
        return Ok(CodeClaim::Shortfall { requested: quantity, available: held_count });
    }
    tx.commit().await?;
    // A holding larger than the request can only come from an earlier request for more units
    let codes = held.into_iter().take(quantity as usize).collect::<Vec<_>>();
    debug!("🗃️ Order {order_id} holds {} codes for product {product_id}", codes.len());
    Ok(CodeClaim::Claimed(codes))
}

pub async fn release_claims(order_id: OrderId, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE product_codes SET claimed_by = NULL WHERE claimed_by = $1 AND redeemed = FALSE")
        .bind(order_id)
        .execute(conn)
        .await?;
    debug!("🗃️ Released {} codes held by order {order_id}", result.rows_affected());
    Ok(result.rows_affected())
}

pub async fn redeem_codes(codes: &[CodeId], conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    if codes.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::new("UPDATE product_codes SET redeemed = TRUE WHERE id IN (");
    let mut ids = builder.separated(", ");
    for id in codes {
        ids.push_bind(*id);
    }
    builder.push(")");
    trace!("🗃️ Executing query: {}", builder.sql());
    let result = builder.build().execute(conn).await?;
    debug!("🗃️ Redeemed {} codes", result.rows_affected());
    Ok(result.rows_affected())
}

pub async fn fetch_codes(product_id: ProductId, conn: &mut SqliteConnection) -> Result<Vec<ProductCode>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM product_codes WHERE product_id = $1 ORDER BY id").bind(product_id).fetch_all(conn).await
}

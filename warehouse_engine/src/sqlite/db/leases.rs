use std::time::Duration;

use log::trace;
use sqlx::SqliteConnection;

use super::{duration_ms, now_ms};
use crate::db_types::OrderId;

/// Takes or extends the order's lease for `holder`. The lease is only taken over from another holder once it has
/// expired. Returns `true` if `holder` now holds the lease.
pub async fn try_acquire(
    order_id: OrderId,
    holder: &str,
    ttl: Duration,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let now = now_ms();
    let result = sqlx::query(
        r#"
            INSERT INTO order_leases (order_id, holder, expires_at) VALUES ($1, $2, $3)
            ON CONFLICT (order_id) DO UPDATE SET
                holder = excluded.holder,
                expires_at = excluded.expires_at
            WHERE order_leases.expires_at < $4 OR order_leases.holder = excluded.holder;
        "#,
    )
    .bind(order_id)
    .bind(holder)
    .bind(now.saturating_add(duration_ms(ttl)))
    .bind(now)
    .execute(conn)
    .await?;
    let acquired = result.rows_affected() == 1;
    trace!("🗃️ Lease on order {order_id} for {holder}: {}", if acquired { "acquired" } else { "busy" });
    Ok(acquired)
}

pub async fn release(order_id: OrderId, holder: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM order_leases WHERE order_id = $1 AND holder = $2")
        .bind(order_id)
        .bind(holder)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

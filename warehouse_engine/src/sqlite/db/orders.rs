use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use super::{products, users};
use crate::{
    db_types::{
        MinorUnits,
        NewOrder,
        Order,
        OrderDetails,
        OrderId,
        OrderItem,
        OrderLine,
        OrderStatusType,
        OrderUpdate,
        PaymentAttempt,
        PaymentStatus,
        Shipment,
        UserId,
    },
    traits::LedgerError,
};

/// An order as it is laid out in the `orders` table. The payment attempt is flattened into nullable columns and
/// shipments are stored as a JSON array.
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: OrderId,
    creator_id: UserId,
    total: MinorUnits,
    currency: String,
    gateway_order_id: String,
    payment_provider: Option<String>,
    payment_id: Option<String>,
    payment_status: Option<String>,
    status: OrderStatusType,
    shipments: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, LedgerError> {
        let shipments = serde_json::from_str::<Vec<Shipment>>(&self.shipments)
            .map_err(|e| LedgerError::DecodeError(format!("Shipments for order {}: {e}", self.id)))?;
        let payment_attempt = match (self.payment_provider, self.payment_id) {
            (Some(provider), Some(payment_id)) => {
                Some(PaymentAttempt { provider, payment_id, status: self.payment_status.map(PaymentStatus::from) })
            },
            _ => None,
        };
        Ok(Order {
            id: self.id,
            creator_id: self.creator_id,
            items,
            total: self.total,
            currency: self.currency,
            gateway_order_id: self.gateway_order_id,
            payment_attempt,
            status: self.status,
            shipments,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Inserts a new order and its line items using the given connection. This is not atomic. Embed this call inside a
/// transaction and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, LedgerError> {
    let total = order.total().ok_or_else(|| {
        LedgerError::InvalidQuantity(order.items.iter().map(|i| i.quantity).max().unwrap_or_default())
    })?;
    let row: OrderRow = sqlx::query_as(
        r#"
            INSERT INTO orders (creator_id, total, currency, gateway_order_id, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(order.creator_id)
    .bind(total)
    .bind(order.currency)
    .bind(order.gateway_order_id)
    .bind(OrderStatusType::AwaitingPayment)
    .fetch_one(&mut *conn)
    .await?;
    for (position, item) in order.items.iter().enumerate() {
        sqlx::query(
            "INSERT INTO order_items (order_id, position, product_id, price, quantity) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(row.id)
        .bind(position as i64)
        .bind(item.product_id)
        .bind(item.price)
        .bind(item.quantity)
        .execute(&mut *conn)
        .await?;
    }
    debug!("🗃️ Order {} inserted with {} items. Total {total}", row.id, order.items.len());
    row.into_order(order.items)
}

async fn fetch_items(id: OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as("SELECT product_id, price, quantity FROM order_items WHERE order_id = $1 ORDER BY position")
        .bind(id)
        .fetch_all(conn)
        .await
}

async fn hydrate(rows: Vec<OrderRow>, conn: &mut SqliteConnection) -> Result<Vec<Order>, LedgerError> {
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let items = fetch_items(row.id, conn).await?;
        orders.push(row.into_order(items)?);
    }
    Ok(orders)
}

pub async fn fetch_order(id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, LedgerError> {
    let row: Option<OrderRow> =
        sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => {
            let items = fetch_items(row.id, conn).await?;
            Ok(Some(row.into_order(items)?))
        },
        None => Ok(None),
    }
}

/// Fetches the order with its creator and every line's product.
pub async fn fetch_order_details(
    id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<OrderDetails>, LedgerError> {
    let Some(order) = fetch_order(id, conn).await? else {
        return Ok(None);
    };
    let creator =
        users::fetch_user(order.creator_id, conn).await?.ok_or(LedgerError::UserNotFound(order.creator_id))?;
    let mut lines = Vec::with_capacity(order.items.len());
    for item in &order.items {
        let product =
            products::fetch_product(item.product_id, conn).await?.ok_or(LedgerError::ProductNotFound(item.product_id))?;
        lines.push(OrderLine { product, price: item.price, quantity: item.quantity });
    }
    Ok(Some(OrderDetails { order, creator, lines }))
}

/// Orders created by the user, newest first.
pub async fn fetch_orders_for_user(user_id: UserId, conn: &mut SqliteConnection) -> Result<Vec<Order>, LedgerError> {
    let rows = sqlx::query_as("SELECT * FROM orders WHERE creator_id = $1 ORDER BY created_at DESC, id DESC")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
    hydrate(rows, conn).await
}

pub async fn fetch_all_orders(conn: &mut SqliteConnection) -> Result<Vec<Order>, LedgerError> {
    let rows = sqlx::query_as("SELECT * FROM orders ORDER BY created_at DESC, id DESC").fetch_all(&mut *conn).await?;
    hydrate(rows, conn).await
}

/// Attaches the payment attempt only if the order does not have one yet. The check and the write are one statement,
/// so of two concurrent callers exactly one succeeds.
pub async fn attach_payment_attempt(
    id: OrderId,
    attempt: PaymentAttempt,
    conn: &mut SqliteConnection,
) -> Result<Order, LedgerError> {
    let row: Option<OrderRow> = sqlx::query_as(
        r#"
            UPDATE orders SET
                payment_provider = $1,
                payment_id = $2,
                payment_status = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4 AND payment_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(attempt.provider)
    .bind(attempt.payment_id)
    .bind(attempt.status.map(String::from))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => {
            debug!("🗃️ Payment attempt attached to order {id}");
            let items = fetch_items(id, conn).await?;
            row.into_order(items)
        },
        None => match fetch_order(id, conn).await? {
            Some(_) => Err(LedgerError::PaymentAlreadyAdded(id)),
            None => Err(LedgerError::OrderNotFound(id)),
        },
    }
}

pub async fn update_order(id: OrderId, update: OrderUpdate, conn: &mut SqliteConnection) -> Result<Order, LedgerError> {
    if update.is_empty() {
        return Err(LedgerError::OrderModificationNoOp);
    }
    let mut builder = QueryBuilder::new("UPDATE orders SET updated_at = CURRENT_TIMESTAMP");
    if let Some(status) = update.new_status {
        builder.push(", status = ");
        builder.push_bind(status);
    }
    if let Some(payment_status) = update.new_payment_status {
        builder.push(", payment_status = ");
        builder.push_bind(String::from(payment_status));
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let row: Option<OrderRow> = builder.build_query_as().fetch_optional(&mut *conn).await?;
    let row = row.ok_or(LedgerError::OrderNotFound(id))?;
    let items = fetch_items(id, conn).await?;
    let order = row.into_order(items)?;
    debug!("🗃️ Order {id} updated. Status: {}", order.status);
    Ok(order)
}

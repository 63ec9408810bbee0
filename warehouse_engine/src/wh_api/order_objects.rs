use serde::{Deserialize, Serialize};
use wh_common::checked_line_total;

use crate::db_types::{CartEntry, MinorUnits, OrderId, OrderStatusType};

/// The result of turning a cart into an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderResult {
    #[serde(rename = "whOrderID")]
    pub order_id: OrderId,
    #[serde(rename = "paymentOrderID")]
    pub gateway_order_id: String,
    /// In minor units of `currency`
    #[serde(rename = "totalPrice")]
    pub total: MinorUnits,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResult {
    #[serde(rename = "newStatus")]
    pub new_status: OrderStatusType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub lines: Vec<CartEntry>,
    pub total: MinorUnits,
}

impl CartSummary {
    /// `None` if the cart total does not fit in [`MinorUnits`].
    pub fn new(lines: Vec<CartEntry>) -> Option<Self> {
        let total = checked_line_total(lines.iter().map(|e| (e.product.price, e.line.quantity)))?;
        Some(Self { lines, total })
    }
}

use std::{
    convert::Infallible,
    fmt::Display,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use wh_common::checked_line_total;
pub use wh_common::MinorUnits;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .trim_start_matches('#')
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|e| ConversionError(format!("{s} is not a valid {}. {e}", stringify!($name))))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

id_type!(
    /// Primary key of an order in the ledger.
    OrderId
);
id_type!(UserId);
id_type!(ProductId);
id_type!(CartLineId);
id_type!(CodeId);

/// Users at or above this privilege level are trusted to fulfil manually delivered orders.
pub const TRUSTED_PRIVILEGE_LEVEL: i64 = 3;
/// The store owner.
pub const OWNER_PRIVILEGE_LEVEL: i64 = 4;

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The order has been created and a remote payment order opened, but the buyer has not reported a payment.
    AwaitingPayment,
    /// A payment was reported, but the gateway has not confirmed it yet. Reconciliation is polling.
    PaymentNotConfirmed,
    /// The gateway has authorized or captured the payment. Delivery is queued.
    PaidAwaitingShipment,
    /// Goods are in transit. Not entered by the automated pipeline.
    Shipped,
    /// The pipeline has finished with this order. Note that this includes orders that were refunded due to a
    /// stockout at fulfilment time.
    Delivered,
    /// Retired by an administrator.
    Archived,
}

impl OrderStatusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatusType::AwaitingPayment => "AWAITING_PAYMENT",
            OrderStatusType::PaymentNotConfirmed => "PAYMENT_NOT_CONFIRMED",
            OrderStatusType::PaidAwaitingShipment => "PAID_AWAITING_SHIPMENT",
            OrderStatusType::Shipped => "SHIPPED",
            OrderStatusType::Delivered => "DELIVERED",
            OrderStatusType::Archived => "ARCHIVED",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWAITING_PAYMENT" => Ok(Self::AwaitingPayment),
            "PAYMENT_NOT_CONFIRMED" => Ok(Self::PaymentNotConfirmed),
            "PAID_AWAITING_SHIPMENT" => Ok(Self::PaidAwaitingShipment),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            "ARCHIVED" => Ok(Self::Archived),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to AWAITING_PAYMENT");
            OrderStatusType::AwaitingPayment
        })
    }
}

//--------------------------------------    PaymentStatus      ---------------------------------------------------------
/// Payment status as reported by the gateway. Statuses the pipeline does not act on are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
    Other(String),
}

impl PaymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Other(s) => s.as_str(),
        }
    }

    /// The funds are secured and the order can be fulfilled.
    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Authorized | PaymentStatus::Captured)
    }

    /// The payment will never be completed. Reconciliation stops polling.
    pub fn is_dead(&self) -> bool {
        matches!(self, PaymentStatus::Refunded | PaymentStatus::Failed)
    }
}

impl FromStr for PaymentStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "created" => Self::Created,
            "authorized" => Self::Authorized,
            "captured" => Self::Captured,
            "refunded" => Self::Refunded,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        };
        Ok(status)
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(status) => status,
            Err(e) => match e {},
        }
    }
}

impl From<PaymentStatus> for String {
    fn from(value: PaymentStatus) -> Self {
        value.as_str().to_string()
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//--------------------------------------    PaymentAttempt     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub provider: String,
    pub payment_id: String,
    /// `None` until the gateway has been asked about the payment for the first time.
    pub status: Option<PaymentStatus>,
}

impl PaymentAttempt {
    pub fn new<S: Into<String>>(provider: S, payment_id: S) -> Self {
        Self { provider: provider.into(), payment_id: payment_id.into(), status: None }
    }
}

//--------------------------------------       Shipment        ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub internal_id: Option<String>,
    pub shipping_company: Option<String>,
    pub tracking_id: Option<String>,
}

//--------------------------------------       OrderItem       ---------------------------------------------------------
/// A snapshot of a cart line at the time the order was placed.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub price: MinorUnits,
    pub quantity: i64,
}

impl OrderItem {
    /// `None` if the line total does not fit in [`MinorUnits`].
    pub fn line_total(&self) -> Option<MinorUnits> {
        self.price.checked_mul(self.quantity)
    }
}

impl From<&CartEntry> for OrderItem {
    fn from(entry: &CartEntry) -> Self {
        Self { product_id: entry.product.id, price: entry.product.price, quantity: entry.line.quantity }
    }
}

/// The sum of the line totals, or `None` if it does not fit in [`MinorUnits`].
pub fn items_total(items: &[OrderItem]) -> Option<MinorUnits> {
    checked_line_total(items.iter().map(|item| (item.price, item.quantity)))
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub creator_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: MinorUnits,
    pub currency: String,
    pub gateway_order_id: String,
    pub payment_attempt: Option<PaymentAttempt>,
    pub status: OrderStatusType,
    pub shipments: Vec<Shipment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn payment_id(&self) -> Option<&str> {
        self.payment_attempt.as_ref().map(|p| p.payment_id.as_str())
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub creator_id: UserId,
    pub items: Vec<OrderItem>,
    pub currency: String,
    /// The id of the payment order opened with the gateway for this order
    pub gateway_order_id: String,
}

impl NewOrder {
    pub fn new<C: Into<String>, G: Into<String>>(
        creator_id: UserId,
        items: Vec<OrderItem>,
        currency: C,
        gateway_order_id: G,
    ) -> Self {
        Self { creator_id, items, currency: currency.into(), gateway_order_id: gateway_order_id.into() }
    }

    /// The order total is always derived from the line items, never supplied separately. `None` if it is out of
    /// range.
    pub fn total(&self) -> Option<MinorUnits> {
        items_total(&self.items)
    }
}

//--------------------------------------      OrderUpdate      ---------------------------------------------------------
/// The subset of order fields that the pipeline is allowed to change after creation.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub new_status: Option<OrderStatusType>,
    pub new_payment_status: Option<PaymentStatus>,
}

impl OrderUpdate {
    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.new_status = Some(status);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.new_payment_status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.new_status.is_none() && self.new_payment_status.is_none()
    }
}

//--------------------------------------         User          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    /// 1 - normal user, 3 - trusted operator, 4 - store owner
    pub privilege_level: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub privilege_level: i64,
}

impl NewUser {
    pub fn new<N: Into<String>, E: Into<String>>(full_name: N, email: E, privilege_level: i64) -> Self {
        Self { full_name: full_name.into(), email: email.into(), privilege_level }
    }
}

//--------------------------------------      ProductType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    /// Fulfilled by a human operator, who is notified by the pipeline. Stock is not tracked.
    ManuallyDelivered,
    /// Fulfilled by sending the buyer redeemable codes from the product's code pool.
    AutomaticallyDelivered,
}

impl Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductType::ManuallyDelivered => f.write_str("MANUALLY_DELIVERED"),
            ProductType::AutomaticallyDelivered => f.write_str("AUTOMATICALLY_DELIVERED"),
        }
    }
}

//--------------------------------------        Product        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub product_type: ProductType,
    pub name: String,
    pub sku: String,
    /// Unit price in minor units of the store currency
    pub price: MinorUnits,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub product_type: ProductType,
    pub name: String,
    pub sku: String,
    pub price: MinorUnits,
}

impl NewProduct {
    pub fn new<S: Into<String>>(product_type: ProductType, name: S, sku: S, price: MinorUnits) -> Self {
        Self { product_type, name: name.into(), sku: sku.into(), price }
    }
}

//--------------------------------------     Availability      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Unlimited,
    Limited(u64),
}

impl Availability {
    pub fn satisfies(&self, quantity: i64) -> bool {
        match self {
            Availability::Unlimited => true,
            Availability::Limited(n) => u64::try_from(quantity).map(|q| q <= *n).unwrap_or(true),
        }
    }
}

impl Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Unlimited => f.write_str("unlimited"),
            Availability::Limited(n) => write!(f, "{n}"),
        }
    }
}

//--------------------------------------      ProductCode      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ProductCode {
    pub id: CodeId,
    pub product_id: ProductId,
    pub code: String,
    pub redeemed: bool,
    /// The order that currently holds this code. Set atomically by the claim at fulfilment time.
    pub claimed_by: Option<OrderId>,
}

/// The outcome of trying to allocate codes to an order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeClaim {
    /// Exactly the requested number of codes, now held by the order.
    Claimed(Vec<ProductCode>),
    /// There were not enough codes. Nothing new was claimed.
    Shortfall { requested: i64, available: i64 },
}

//--------------------------------------       CartLine        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line together with the product it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEntry {
    pub line: CartLine,
    pub product: Product,
}

//--------------------------------------     OrderDetails      ---------------------------------------------------------
/// An order line joined with its product, as needed by fulfilment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub product: Product,
    pub price: MinorUnits,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub order: Order,
    pub creator: User,
    pub lines: Vec<OrderLine>,
}

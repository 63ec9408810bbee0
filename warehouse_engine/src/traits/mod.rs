//! # Collaborator interfaces
//!
//! This module defines the interface contracts that the order pipeline relies on.
//!
//! ## Ledger store
//! The ledger store is the durable record of users, products, carts, orders and product codes. Its behaviour is split
//! across several traits so that callers only need to depend on what they use:
//!
//! * [`OrderManagement`] creates, fetches and updates orders, attaches payment attempts and hands out per-order
//!   execution leases.
//! * [`CartManagement`] maintains the per-user shopping cart.
//! * [`InventoryManagement`] knows about products, their availability and the pool of redeemable product codes.
//! * [`UserDirectory`] answers questions about users, such as who should fulfil a manually delivered product.
//!
//! [`LedgerStore`] is the union of all of these and is what the pipeline APIs are generic over.
//!
//! ## External collaborators
//! * [`PaymentGateway`] talks to the payment processor of record.
//! * [`Notifier`] delivers messages (codes, operator alerts, refund notices) to people.
mod cart_management;
mod inventory_management;
mod ledger_error;
mod notifier;
mod order_management;
mod payment_gateway;
mod user_directory;

pub use cart_management::CartManagement;
pub use inventory_management::InventoryManagement;
pub use ledger_error::LedgerError;
pub use notifier::{Notifier, NotifierError};
pub use order_management::OrderManagement;
pub use payment_gateway::{GatewayError, PaymentGateway, PaymentInfo};
pub use user_directory::UserDirectory;

/// Everything the order pipeline needs from the durable store.
pub trait LedgerStore: OrderManagement + CartManagement + InventoryManagement + UserDirectory {}

impl<T> LedgerStore for T where T: OrderManagement + CartManagement + InventoryManagement + UserDirectory {}

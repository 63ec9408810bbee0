//! Clients for the external services the pipeline talks to.
mod mail_relay;
mod razorpay;

pub use mail_relay::{LogNotifier, MailRelayNotifier};
pub use razorpay::RazorpayGateway;

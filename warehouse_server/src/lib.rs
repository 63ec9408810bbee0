//! # Warehouse pipeline server
//!
//! The daemon that drives the asynchronous half of the Warehouse order pipeline. It connects the engine's worker
//! pools to their production collaborators:
//! * Razorpay, as the payment gateway ([`integrations::RazorpayGateway`]).
//! * An HTTP mail relay for buyer and operator notifications ([`integrations::MailRelayNotifier`]), or the log if
//!   none is configured.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
pub mod cli;
pub mod config;
pub mod errors;
pub mod integrations;
pub mod server;
pub mod workers;

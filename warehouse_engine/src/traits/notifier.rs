use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    #[error("Could not initialize the notifier: {0}")]
    Initialization(String),
    #[error("Could not send the message to {to}: {reason}")]
    SendFailed { to: String, reason: String },
}

/// Delivers a message to a person.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError>;
}

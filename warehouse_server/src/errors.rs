use thiserror::Error;
use warehouse_engine::{job_queue::JobQueueError, GatewayError, NotifierError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
}

impl From<GatewayError> for ServerError {
    fn from(e: GatewayError) -> Self {
        Self::InitializeError(format!("Payment gateway error: {e}"))
    }
}

impl From<NotifierError> for ServerError {
    fn from(e: NotifierError) -> Self {
        Self::InitializeError(format!("Notifier error: {e}"))
    }
}

impl From<JobQueueError> for ServerError {
    fn from(e: JobQueueError) -> Self {
        Self::InitializeError(format!("Job queue error: {e}"))
    }
}

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::*;
use reqwest::Client;
use serde::Serialize;
use warehouse_engine::{Notifier, NotifierError};

use crate::config::MailRelayConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends email by posting each message to an HTTP mail relay.
#[derive(Clone)]
pub struct MailRelayNotifier {
    config: MailRelayConfig,
    client: Arc<Client>,
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl MailRelayNotifier {
    pub fn new(config: MailRelayConfig) -> Result<Self, NotifierError> {
        let client =
            Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(|e| NotifierError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }
}

#[async_trait]
impl Notifier for MailRelayNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError> {
        let message = RelayMessage { from: &self.config.from, to, subject, text: body };
        let send_failed = |reason: String| NotifierError::SendFailed { to: to.to_string(), reason };
        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(self.config.token.reveal())
            .json(&message)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;
        if response.status().is_success() {
            debug!("✉️ \"{subject}\" sent to {to}");
            Ok(())
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Err(send_failed(format!("The mail relay returned {status}. {text}")))
        }
    }
}

/// Writes messages to the log instead of sending them. Used when no mail relay is configured.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError> {
        info!("✉️ [not sent] To: {to}. Subject: {subject}\n{body}");
        Ok(())
    }
}

use std::sync::Arc;

use log::*;
use warehouse_engine::{Notifier, PaymentGateway, SqliteDatabase};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::{LogNotifier, MailRelayNotifier, RazorpayGateway},
    workers::start_workers,
};

/// Runs the pipeline workers until the process receives Ctrl-C.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let mut db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🚀️ Connected to {}", config.database_url);
    let gateway = create_gateway(&config)?;
    let notifier = create_notifier(&config)?;
    let workers = start_workers(db.clone(), gateway, notifier, &config).await?;
    tokio::signal::ctrl_c().await?;
    info!("🚀️ Shutdown requested");
    workers.shutdown().await;
    db.close().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    Ok(())
}

pub fn create_gateway(config: &ServerConfig) -> Result<Arc<dyn PaymentGateway>, ServerError> {
    let gateway = RazorpayGateway::new(config.razorpay.clone())?;
    info!("🚀️ Using Razorpay at {}", config.razorpay.api_url);
    Ok(Arc::new(gateway))
}

pub fn create_notifier(config: &ServerConfig) -> Result<Arc<dyn Notifier>, ServerError> {
    match &config.mail_relay {
        Some(relay) => {
            info!("🚀️ Sending notifications through {} as {}", relay.url, relay.from);
            Ok(Arc::new(MailRelayNotifier::new(relay.clone())?))
        },
        None => {
            warn!("🚀️ No mail relay is configured. Notifications will only be logged");
            Ok(Arc::new(LogNotifier))
        },
    }
}

use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use warehouse_engine::{db_types::TRUSTED_PRIVILEGE_LEVEL, job_queue::WorkerConfig, PipelineSettings};
use wh_common::{helpers::parse_env_or, Secret, DEFAULT_STORE_CURRENCY};

use crate::errors::ServerError;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/warehouse.db";
const DEFAULT_RZP_API_URL: &str = "https://api.razorpay.com/v1";
const DEFAULT_RECONCILE_INTERVAL_MINS: u64 = 20;
const DEFAULT_JOB_ATTEMPTS: u32 = 5;
const DEFAULT_JOB_BACKOFF_MS: u64 = 1_000;
const DEFAULT_DELIVERY_WORKERS: usize = 4;
const DEFAULT_RECONCILE_WORKERS: usize = 2;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_CONNECTIONS: u32 = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// The currency that payment orders are opened in.
    pub store_currency: String,
    pub razorpay: RazorpayConfig,
    /// If `None`, notifications are written to the log instead of being sent.
    pub mail_relay: Option<MailRelayConfig>,
    pub reconcile_interval: Duration,
    pub job_attempts: u32,
    pub job_backoff: Duration,
    pub delivery_workers: usize,
    pub reconcile_workers: usize,
    pub job_timeout: Duration,
    /// Users at or above this privilege level can be asked to fulfil manually delivered products.
    pub trusted_privilege_level: i64,
}

#[derive(Clone, Debug, Default)]
pub struct RazorpayConfig {
    pub api_url: String,
    pub key_id: String,
    pub key_secret: Secret<String>,
}

#[derive(Clone, Debug, Default)]
pub struct MailRelayConfig {
    /// The endpoint that messages are posted to.
    pub url: String,
    pub token: Secret<String>,
    /// The sender address on every message.
    pub from: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            store_currency: DEFAULT_STORE_CURRENCY.to_string(),
            razorpay: RazorpayConfig { api_url: DEFAULT_RZP_API_URL.to_string(), ..Default::default() },
            mail_relay: None,
            reconcile_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_MINS * 60),
            job_attempts: DEFAULT_JOB_ATTEMPTS,
            job_backoff: Duration::from_millis(DEFAULT_JOB_BACKOFF_MS),
            delivery_workers: DEFAULT_DELIVERY_WORKERS,
            reconcile_workers: DEFAULT_RECONCILE_WORKERS,
            job_timeout: Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS),
            trusted_privilege_level: TRUSTED_PRIVILEGE_LEVEL,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("WH_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ WH_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let store_currency = env::var("WH_STORE_CURRENCY").ok().unwrap_or_else(|| {
            info!("🪛️ WH_STORE_CURRENCY is not set. Using {DEFAULT_STORE_CURRENCY}");
            DEFAULT_STORE_CURRENCY.to_string()
        });
        let razorpay = RazorpayConfig::from_env_or_default();
        let mail_relay = MailRelayConfig::try_from_env()
            .map_err(|e| {
                warn!(
                    "🪛️ The mail relay is not configured. {e}. Notifications will be written to the log and NOT sent \
                     to anyone."
                )
            })
            .ok();
        let reconcile_interval =
            Duration::from_secs(env_or("WH_RECONCILE_INTERVAL_MINS", DEFAULT_RECONCILE_INTERVAL_MINS).max(1) * 60);
        let job_attempts = env_or("WH_JOB_ATTEMPTS", DEFAULT_JOB_ATTEMPTS).max(1);
        let job_backoff = Duration::from_millis(env_or("WH_JOB_BACKOFF_MS", DEFAULT_JOB_BACKOFF_MS));
        let delivery_workers = env_or("WH_DELIVERY_WORKERS", DEFAULT_DELIVERY_WORKERS).max(1);
        let reconcile_workers = env_or("WH_RECONCILE_WORKERS", DEFAULT_RECONCILE_WORKERS).max(1);
        let job_timeout = Duration::from_secs(env_or("WH_JOB_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT_SECS).max(1));
        let trusted_privilege_level = env_or("WH_TRUSTED_PRIVILEGE_LEVEL", TRUSTED_PRIVILEGE_LEVEL);
        Self {
            database_url,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            store_currency,
            razorpay,
            mail_relay,
            reconcile_interval,
            job_attempts,
            job_backoff,
            delivery_workers,
            reconcile_workers,
            job_timeout,
            trusted_privilege_level,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let defaults = PipelineSettings::default();
        PipelineSettings {
            store_currency: self.store_currency.clone(),
            reconcile_interval: self.reconcile_interval,
            job_attempts: self.job_attempts,
            job_backoff: self.job_backoff,
            trusted_privilege_level: self.trusted_privilege_level,
            // A lease must outlive any run that holds it
            lease_ttl: defaults.lease_ttl.max(self.job_timeout * 2),
            ..defaults
        }
    }

    pub fn worker_config(&self, concurrency: usize) -> WorkerConfig {
        WorkerConfig::default().with_concurrency(concurrency).with_job_timeout(self.job_timeout)
    }
}

impl RazorpayConfig {
    pub fn from_env_or_default() -> Self {
        let api_url = env::var("WH_RZP_API_URL").ok().unwrap_or_else(|| DEFAULT_RZP_API_URL.to_string());
        let key_id = env::var("RZP_KEY_ID").ok().unwrap_or_else(|| {
            error!("🪛️ RZP_KEY_ID is not set. Please set it to the key id of your Razorpay account.");
            String::default()
        });
        let key_secret = env::var("RZP_KEY_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ RZP_KEY_SECRET is not set. Please set it to the key secret of your Razorpay account.");
            String::default()
        });
        Self { api_url, key_id, key_secret: Secret::new(key_secret) }
    }

    pub fn is_complete(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }
}

impl MailRelayConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        let url = env::var("WH_MAIL_RELAY_URL")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [WH_MAIL_RELAY_URL]")))?;
        let token = env::var("WH_MAIL_RELAY_TOKEN")
            .map_err(|e| ServerError::ConfigurationError(format!("{e} [WH_MAIL_RELAY_TOKEN]")))?;
        let from =
            env::var("WH_MAIL_FROM").map_err(|e| ServerError::ConfigurationError(format!("{e} [WH_MAIL_FROM]")))?;
        if !from.contains('@') {
            return Err(ServerError::ConfigurationError(format!("{from} is not a valid sender address [WH_MAIL_FROM]")));
        }
        Ok(Self { url, token: Secret::new(token), from })
    }
}

/// Reads and parses `name`, logging why the default is used when it is.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let (value, reason) = parse_env_or(name, default);
    match reason {
        Some(reason) if env::var(name).is_ok() => warn!("🪛️ {reason}"),
        Some(reason) => info!("🪛️ {reason}"),
        None => {},
    }
    value
}

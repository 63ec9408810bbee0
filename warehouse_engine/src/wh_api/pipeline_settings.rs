use std::time::Duration;

use wh_common::DEFAULT_STORE_CURRENCY;

use crate::db_types::TRUSTED_PRIVILEGE_LEVEL;

/// Tunables shared by the pipeline APIs and workers.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// The currency that remote payment orders are opened in.
    pub store_currency: String,
    /// How often a pending payment is re-checked with the gateway.
    pub reconcile_interval: Duration,
    /// Attempts a pipeline job gets before it is abandoned.
    pub job_attempts: u32,
    /// Base delay of the exponential retry backoff.
    pub job_backoff: Duration,
    /// Minimum privilege level of the operator who fulfils manually delivered products.
    pub trusted_privilege_level: i64,
    /// How long a job run may hold an order's lease. Must be longer than the job timeout.
    pub lease_ttl: Duration,
    /// How long a job waits before trying again when the order's lease is taken.
    pub lease_retry_delay: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            store_currency: DEFAULT_STORE_CURRENCY.to_string(),
            reconcile_interval: Duration::from_secs(20 * 60),
            job_attempts: 5,
            job_backoff: Duration::from_secs(1),
            trusted_privilege_level: TRUSTED_PRIVILEGE_LEVEL,
            lease_ttl: Duration::from_secs(300),
            lease_retry_delay: Duration::from_secs(5),
        }
    }
}

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use warehouse_engine::{
    db_types::{MinorUnits, PaymentStatus},
    GatewayError,
    PaymentGateway,
    PaymentInfo,
};

use crate::config::RazorpayConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`PaymentGateway`] backed by the Razorpay REST API.
#[derive(Clone)]
pub struct RazorpayGateway {
    config: RazorpayConfig,
    client: Arc<Client>,
}

#[derive(Debug, Deserialize)]
struct RemoteOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RemotePayment {
    id: String,
    status: String,
    amount: Option<i64>,
}

impl From<RemotePayment> for PaymentInfo {
    fn from(p: RemotePayment) -> Self {
        PaymentInfo { id: p.id, status: PaymentStatus::from(p.status), amount: p.amount.map(MinorUnits::from) }
    }
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Result<Self, GatewayError> {
        if !config.is_complete() {
            return Err(GatewayError::Initialization("The Razorpay key id and secret must both be set".into()));
        }
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, GatewayError> {
        let url = self.url(path);
        trace!("💳️ Sending Razorpay query: {method} {url}");
        let mut req = self
            .client
            .request(method, url)
            .basic_auth(&self.config.key_id, Some(self.config.key_secret.reveal()));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| GatewayError::RequestError(e.to_string()))?;
        if response.status().is_success() {
            trace!("💳️ Razorpay query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| GatewayError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| GatewayError::ResponseError(e.to_string()))?;
            Err(GatewayError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn provider_name(&self) -> &'static str {
        "Razorpay"
    }

    async fn create_remote_order(&self, amount: MinorUnits, currency: &str) -> Result<String, GatewayError> {
        let body = json!({ "amount": amount.value(), "currency": currency });
        let order = self.rest_query::<RemoteOrder, Value>(Method::POST, "/orders", Some(body)).await?;
        info!("💳️ Razorpay order {} opened for {amount} {currency}", order.id);
        Ok(order.id)
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentInfo, GatewayError> {
        let path = format!("/payments/{payment_id}");
        let payment = self.rest_query::<RemotePayment, ()>(Method::GET, &path, None).await?;
        debug!("💳️ Razorpay reports payment {payment_id} as {}", payment.status);
        Ok(payment.into())
    }

    async fn refund_payment(&self, payment_id: &str) -> Result<(), GatewayError> {
        let path = format!("/payments/{payment_id}/refund");
        // An empty body refunds the full amount
        let refund = self.rest_query::<Value, Value>(Method::POST, &path, Some(json!({}))).await?;
        info!("💳️ Razorpay refund {} issued for payment {payment_id}", refund["id"].as_str().unwrap_or("(no id)"));
        Ok(())
    }
}

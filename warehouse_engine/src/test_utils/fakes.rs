use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    db_types::{MinorUnits, PaymentStatus},
    traits::{GatewayError, Notifier, NotifierError, PaymentGateway, PaymentInfo},
};

/// A payment gateway whose answers are scripted per payment id.
#[derive(Debug, Default)]
pub struct FakeGateway {
    statuses: Mutex<HashMap<String, VecDeque<PaymentStatus>>>,
    remote_orders: Mutex<Vec<(MinorUnits, String)>>,
    refunds: Mutex<Vec<String>>,
    fail_requests: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The payment reports each status in turn on successive fetches, then keeps reporting the last one.
    pub fn script(&self, payment_id: &str, statuses: &[PaymentStatus]) {
        let mut map = self.statuses.lock().expect("statuses lock poisoned");
        map.insert(payment_id.to_string(), statuses.iter().cloned().collect());
    }

    pub fn set_status(&self, payment_id: &str, status: PaymentStatus) {
        self.script(payment_id, &[status]);
    }

    /// When set, every call fails as if the gateway could not be reached.
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn refunds(&self) -> Vec<String> {
        self.refunds.lock().expect("refunds lock poisoned").clone()
    }

    pub fn remote_orders(&self) -> Vec<(MinorUnits, String)> {
        self.remote_orders.lock().expect("orders lock poisoned").clone()
    }

    fn check_reachable(&self) -> Result<(), GatewayError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(GatewayError::RequestError("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider_name(&self) -> &'static str {
        "FakePay"
    }

    async fn create_remote_order(&self, amount: MinorUnits, currency: &str) -> Result<String, GatewayError> {
        self.check_reachable()?;
        let mut orders = self.remote_orders.lock().expect("orders lock poisoned");
        orders.push((amount, currency.to_string()));
        Ok(format!("order_fake_{}", orders.len()))
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentInfo, GatewayError> {
        self.check_reachable()?;
        let mut map = self.statuses.lock().expect("statuses lock poisoned");
        let status = match map.get_mut(payment_id) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or(PaymentStatus::Created),
            Some(script) => script.front().cloned().unwrap_or(PaymentStatus::Created),
            None => PaymentStatus::Created,
        };
        Ok(PaymentInfo::new(payment_id, status))
    }

    async fn refund_payment(&self, payment_id: &str) -> Result<(), GatewayError> {
        self.check_reachable()?;
        self.refunds.lock().expect("refunds lock poisoned").push(payment_id.to_string());
        self.set_status(payment_id, PaymentStatus::Refunded);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// A notifier that keeps every message it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    fail_sends: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, sending fails and nothing is recorded.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("messages lock poisoned").clone()
    }

    pub fn messages_to(&self, to: &str) -> Vec<SentMessage> {
        self.messages().into_iter().filter(|m| m.to == to).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(NotifierError::SendFailed { to: to.to_string(), reason: "mailbox unavailable".into() });
        }
        let message = SentMessage { to: to.to_string(), subject: subject.to_string(), body: body.to_string() };
        self.sent.lock().expect("messages lock poisoned").push(message);
        Ok(())
    }
}

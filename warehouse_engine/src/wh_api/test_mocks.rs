use async_trait::async_trait;
use mockall::mock;

use crate::{
    db_types::MinorUnits,
    traits::{GatewayError, Notifier, NotifierError, PaymentGateway, PaymentInfo},
};

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        fn provider_name(&self) -> &'static str;
        async fn create_remote_order(&self, amount: MinorUnits, currency: &str) -> Result<String, GatewayError>;
        async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentInfo, GatewayError>;
        async fn refund_payment(&self, payment_id: &str) -> Result<(), GatewayError>;
    }
}

mock! {
    pub Mailer {}

    #[async_trait]
    impl Notifier for Mailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifierError>;
    }
}

use async_trait::async_trait;

use crate::{
    db_types::{NewUser, User, UserId},
    traits::LedgerError,
};

#[async_trait]
pub trait UserDirectory: Clone + Send + Sync + 'static {
    async fn create_user(&self, user: NewUser) -> Result<User, LedgerError>;

    async fn fetch_user(&self, id: UserId) -> Result<Option<User>, LedgerError>;

    /// The operator responsible for manually delivered products: the most recently created user whose privilege
    /// level is at least `min_privilege`.
    async fn fulfillment_operator(&self, min_privilege: i64) -> Result<Option<User>, LedgerError>;
}

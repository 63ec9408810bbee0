//! `SqliteDatabase` is the concrete ledger store and job queue of the warehouse engine.
//!
//! It implements every trait in [`crate::traits`] that describes the ledger, as well as [`JobQueue`].
//!
//! Every write runs in its own transaction and is committed before the method returns, so a read on any other pooled
//! connection sees it straight away.
use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use log::*;
use sqlx::{migrate::MigrateError, SqlitePool};

use super::db::{cart, db_url, jobs, leases, new_pool, orders, product_codes, products, users};
use crate::{
    db_types::{
        Availability,
        CartEntry,
        CartLine,
        CartLineId,
        CodeClaim,
        CodeId,
        NewOrder,
        NewProduct,
        NewUser,
        Order,
        OrderDetails,
        OrderId,
        OrderUpdate,
        PaymentAttempt,
        Product,
        ProductCode,
        ProductId,
        ProductType,
        User,
        UserId,
    },
    job_queue::{Job, JobId, JobOptions, JobQueue, JobQueueError, JobState},
    traits::{CartManagement, InventoryManagement, LedgerError, OrderManagement, UserDirectory},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the `WH_DATABASE_URL` environment variable
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        trace!("🗃️ Created new connection pool for {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&mut self) -> Result<(), sqlx::Error> {
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl OrderManagement for SqliteDatabase {
    async fn create_order(&self, order: NewOrder) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Option<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(id, &mut conn).await
    }

    async fn fetch_order_details(&self, id: OrderId) -> Result<Option<OrderDetails>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_details(id, &mut conn).await
    }

    async fn fetch_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_for_user(user_id, &mut conn).await
    }

    async fn fetch_all_orders(&self) -> Result<Vec<Order>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_all_orders(&mut conn).await
    }

    async fn attach_payment_attempt(&self, id: OrderId, attempt: PaymentAttempt) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::attach_payment_attempt(id, attempt, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn update_order(&self, id: OrderId, update: OrderUpdate) -> Result<Order, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_order(id, update, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn try_acquire_lease(&self, id: OrderId, holder: &str, ttl: Duration) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let acquired = leases::try_acquire(id, holder, ttl, &mut tx).await?;
        tx.commit().await?;
        Ok(acquired)
    }

    async fn release_lease(&self, id: OrderId, holder: &str) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        let released = leases::release(id, holder, &mut tx).await?;
        tx.commit().await?;
        if !released {
            warn!("🗃️ {holder} released the lease on order {id}, but did not hold it");
        }
        Ok(())
    }
}

#[async_trait]
impl CartManagement for SqliteDatabase {
    async fn fetch_cart(&self, user_id: UserId) -> Result<Vec<CartEntry>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        cart::fetch_cart(user_id, &mut conn).await
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartLine, LedgerError> {
        if quantity < 1 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        let mut conn = self.pool.acquire().await?;
        let product =
            products::fetch_product(product_id, &mut conn).await?.ok_or(LedgerError::ProductNotFound(product_id))?;
        if product.price.checked_mul(quantity).is_none() {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        // Products are never deleted. The upsert is the first statement so the transaction starts as a writer
        let mut tx = sqlx::Connection::begin(&mut *conn).await?;
        let line = cart::upsert_line(user_id, product_id, quantity, &mut tx).await?;
        tx.commit().await?;
        Ok(line)
    }

    async fn update_cart_line(
        &self,
        user_id: UserId,
        line: CartLineId,
        quantity: i64,
    ) -> Result<CartLine, LedgerError> {
        if quantity < 1 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        let mut tx = self.pool.begin().await?;
        let line = cart::set_quantity(user_id, line, quantity, &mut tx).await?;
        tx.commit().await?;
        Ok(line)
    }

    async fn remove_cart_line(&self, user_id: UserId, line: CartLineId) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;
        cart::delete_line(user_id, line, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<u64, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let cleared = cart::clear_cart(user_id, &mut tx).await?;
        tx.commit().await?;
        Ok(cleared)
    }
}

#[async_trait]
impl InventoryManagement for SqliteDatabase {
    async fn create_product(&self, product: NewProduct) -> Result<Product, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let product = products::insert_product(product, &mut tx).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn fetch_product(&self, id: ProductId) -> Result<Option<Product>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(products::fetch_product(id, &mut conn).await?)
    }

    async fn add_codes(&self, product_id: ProductId, codes: &[String]) -> Result<u64, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let product =
            products::fetch_product(product_id, &mut tx).await?.ok_or(LedgerError::ProductNotFound(product_id))?;
        if product.product_type != ProductType::AutomaticallyDelivered {
            return Err(LedgerError::NotCodeStocked(product_id));
        }
        let added = product_codes::insert_codes(product_id, codes, &mut tx).await?;
        tx.commit().await?;
        Ok(added)
    }

    async fn available_quantity(&self, product_id: ProductId) -> Result<Availability, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let product =
            products::fetch_product(product_id, &mut conn).await?.ok_or(LedgerError::ProductNotFound(product_id))?;
        match product.product_type {
            ProductType::ManuallyDelivered => Ok(Availability::Unlimited),
            ProductType::AutomaticallyDelivered => {
                let free = product_codes::count_free(product_id, &mut conn).await?;
                Ok(Availability::Limited(u64::try_from(free).unwrap_or_default()))
            },
        }
    }

    async fn claim_codes(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CodeClaim, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        product_codes::claim_codes(order_id, product_id, quantity, &mut conn).await
    }

    async fn release_claims(&self, order_id: OrderId) -> Result<u64, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let released = product_codes::release_claims(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(released)
    }

    async fn redeem_codes(&self, codes: &[CodeId]) -> Result<u64, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let redeemed = product_codes::redeem_codes(codes, &mut tx).await?;
        tx.commit().await?;
        Ok(redeemed)
    }

    async fn fetch_codes(&self, product_id: ProductId) -> Result<Vec<ProductCode>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(product_codes::fetch_codes(product_id, &mut conn).await?)
    }
}

#[async_trait]
impl UserDirectory for SqliteDatabase {
    async fn create_user(&self, user: NewUser) -> Result<User, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let user = users::insert_user(user, &mut tx).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn fetch_user(&self, id: UserId) -> Result<Option<User>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(users::fetch_user(id, &mut conn).await?)
    }

    async fn fulfillment_operator(&self, min_privilege: i64) -> Result<Option<User>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        Ok(users::fetch_most_recent_privileged(min_privilege, &mut conn).await?)
    }
}

#[async_trait]
impl JobQueue for SqliteDatabase {
    async fn enqueue_raw(
        &self,
        queue: &str,
        key: &str,
        payload: String,
        options: JobOptions,
    ) -> Result<Job, JobQueueError> {
        let mut tx = self.pool.begin().await?;
        let job = jobs::insert_job(queue, key, payload, &options, &mut tx).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn remove_repeatable(&self, queue: &str, key: &str) -> Result<bool, JobQueueError> {
        let mut tx = self.pool.begin().await?;
        let removed = jobs::delete_repeatable(queue, key, &mut tx).await?;
        tx.commit().await?;
        debug!("🧰️ Repeatable job {key} on {queue} {}", if removed { "removed" } else { "was not scheduled" });
        Ok(removed)
    }

    async fn claim_next(&self, queue: &str) -> Result<Option<Job>, JobQueueError> {
        let mut tx = self.pool.begin().await?;
        let job = jobs::claim_next(queue, &mut tx).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn complete(&self, job: &Job) -> Result<(), JobQueueError> {
        let mut tx = self.pool.begin().await?;
        let completed = jobs::complete(job.id, &mut tx).await?;
        tx.commit().await?;
        if !completed {
            debug!("🧰️ {} was no longer active when it completed", job.id);
        }
        Ok(())
    }

    async fn fail(&self, job: &Job, reason: &str, permanent: bool) -> Result<JobState, JobQueueError> {
        let mut tx = self.pool.begin().await?;
        let state = jobs::fail(job, reason, permanent, &mut tx).await?;
        tx.commit().await?;
        Ok(state)
    }

    async fn defer(&self, job: &Job, delay: Duration) -> Result<(), JobQueueError> {
        let mut tx = self.pool.begin().await?;
        jobs::defer(job.id, delay, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn recover_stalled(&self, queue: &str, stalled_after: Duration) -> Result<u64, JobQueueError> {
        let mut tx = self.pool.begin().await?;
        let recovered = jobs::recover_stalled(queue, stalled_after, &mut tx).await?;
        tx.commit().await?;
        Ok(recovered)
    }

    async fn fetch_job(&self, id: JobId) -> Result<Option<Job>, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        Ok(jobs::fetch_job(id, &mut conn).await?)
    }

    async fn jobs_for_key(&self, queue: &str, key: &str) -> Result<Vec<Job>, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        Ok(jobs::jobs_for_key(queue, key, &mut conn).await?)
    }

    async fn dead_jobs(&self, queue: &str) -> Result<Vec<Job>, JobQueueError> {
        let mut conn = self.pool.acquire().await?;
        Ok(jobs::dead_jobs(queue, &mut conn).await?)
    }
}

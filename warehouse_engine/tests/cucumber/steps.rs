use std::time::Duration;

use cucumber::{then, when};
use warehouse_engine::{
    db_types::{CodeId, OrderStatusType, PaymentStatus},
    job_queue::{run_next_job, JobQueue},
    wh_api::order_jobs::{job_key, CHECK_PENDING_TX, DELIVER_AFTER_ORDER},
    CartApi,
    InventoryManagement,
    OrderManagement,
};

use crate::cucumber::WarehouseWorld;

const JOB_TIMEOUT: Duration = Duration::from_secs(5);

#[when(expr = "'{word}' adds {int} of '{word}' to their cart")]
async fn add_to_cart(world: &mut WarehouseWorld, email: String, quantity: i64, sku: String) {
    let user_id = world.user(&email).id;
    let product_id = world.product(&sku).id;
    let api = CartApi::new(world.db().clone());
    api.add_to_cart(user_id, product_id, quantity).await.expect("Error adding to cart");
}

#[when(expr = "'{word}' checks out")]
async fn check_out(world: &mut WarehouseWorld, email: String) {
    let user_id = world.user(&email).id;
    match world.system().order_creation().create_order(user_id).await {
        Ok(result) => {
            world.orders.insert(email, result.order_id);
            world.last_error = None;
        },
        Err(e) => world.last_error = Some(e.error_code().to_string()),
    }
}

#[when(expr = "the gateway reports payment [{word}] as {word}")]
async fn gateway_reports(world: &mut WarehouseWorld, payment_id: String, status: String) {
    world.system().gateway.set_status(&payment_id, PaymentStatus::from(status));
}

#[when(expr = "'{word}' pays for their order with payment [{word}]")]
async fn pay_for_order(world: &mut WarehouseWorld, email: String, payment_id: String) {
    let user_id = world.user(&email).id;
    let order_id = world.order_for(&email);
    let api = world.system().payment_capture();
    api.capture_payment(user_id, order_id, &payment_id).await.expect("Error capturing payment");
}

#[when(expr = "all but {int} codes of '{word}' are sold elsewhere")]
async fn sell_codes_elsewhere(world: &mut WarehouseWorld, keep: usize, sku: String) {
    let product_id = world.product(&sku).id;
    let codes = world.db().fetch_codes(product_id).await.expect("Error fetching codes");
    let sold = codes.iter().filter(|c| !c.redeemed).skip(keep).map(|c| c.id).collect::<Vec<CodeId>>();
    world.db().redeem_codes(&sold).await.expect("Error redeeming codes");
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut WarehouseWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[when("the payment checks run")]
async fn run_payment_checks(world: &mut WarehouseWorld) {
    let worker = world.system().reconciliation();
    while run_next_job(world.db(), CHECK_PENDING_TX, &worker, JOB_TIMEOUT).await.expect("Error running job").is_some() {}
}

#[when("the delivery jobs run")]
async fn run_deliveries(world: &mut WarehouseWorld) {
    let worker = world.system().fulfillment();
    while run_next_job(world.db(), DELIVER_AFTER_ORDER, &worker, JOB_TIMEOUT).await.expect("Error running job").is_some()
    {}
}

#[then(expr = "checkout fails with {word}")]
async fn checkout_fails(world: &mut WarehouseWorld, code: String) {
    assert_eq!(world.last_error.as_deref(), Some(code.as_str()), "Checkout did not fail as expected");
}

#[then(expr = "the order for '{word}' totals {int}")]
async fn order_total(world: &mut WarehouseWorld, email: String, total: i64) {
    let order = world.db().fetch_order(world.order_for(&email)).await.expect("Error fetching order").unwrap();
    assert_eq!(order.total.value(), total, "Order total is incorrect");
}

#[then(expr = "the cart for '{word}' is empty")]
async fn cart_is_empty(world: &mut WarehouseWorld, email: String) {
    let api = CartApi::new(world.db().clone());
    let cart = api.cart(world.user(&email).id).await.expect("Error fetching cart");
    assert!(cart.lines.is_empty(), "Cart is not empty");
}

#[then(expr = "the order for '{word}' is {word}")]
async fn order_status(world: &mut WarehouseWorld, email: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not a valid order status");
    let order = world.db().fetch_order(world.order_for(&email)).await.expect("Error fetching order").unwrap();
    assert_eq!(order.status, expected, "Order status is incorrect");
}

#[then(expr = "the payment for '{word}' is {word}")]
async fn payment_status(world: &mut WarehouseWorld, email: String, status: String) {
    let order = world.db().fetch_order(world.order_for(&email)).await.expect("Error fetching order").unwrap();
    let attempt = order.payment_attempt.expect("Order has no payment");
    assert_eq!(attempt.status, Some(PaymentStatus::from(status)), "Payment status is incorrect");
}

#[then(expr = "a payment check is scheduled for the order for '{word}'")]
async fn check_scheduled(world: &mut WarehouseWorld, email: String) {
    let key = job_key(world.order_for(&email));
    let jobs = world.db().jobs_for_key(CHECK_PENDING_TX, &key).await.expect("Error fetching jobs");
    assert_eq!(jobs.len(), 1, "Expected exactly one payment check");
    assert!(jobs[0].is_repeatable(), "Payment check does not repeat");
}

#[then(expr = "no payment check is scheduled for the order for '{word}'")]
async fn check_not_scheduled(world: &mut WarehouseWorld, email: String) {
    let key = job_key(world.order_for(&email));
    let jobs = world.db().jobs_for_key(CHECK_PENDING_TX, &key).await.expect("Error fetching jobs");
    assert!(jobs.is_empty(), "A payment check is still scheduled");
}

#[then(expr = "a delivery is queued for the order for '{word}'")]
async fn delivery_queued(world: &mut WarehouseWorld, email: String) {
    let key = job_key(world.order_for(&email));
    let jobs = world.db().jobs_for_key(DELIVER_AFTER_ORDER, &key).await.expect("Error fetching jobs");
    assert!(!jobs.is_empty(), "No delivery was queued");
}

#[then(expr = "'{word}' receives {int} codes for '{word}'")]
async fn receives_codes(world: &mut WarehouseWorld, email: String, count: usize, sku: String) {
    let messages = world.system().notifier.messages_to(&email);
    let prefix = format!("{sku}-");
    let received = messages.iter().flat_map(|m| m.body.lines()).filter(|l| l.starts_with(&prefix)).count();
    assert_eq!(received, count, "Wrong number of codes received");
}

#[then(expr = "{int} codes of '{word}' are redeemed")]
async fn codes_redeemed(world: &mut WarehouseWorld, count: usize, sku: String) {
    let codes = world.db().fetch_codes(world.product(&sku).id).await.expect("Error fetching codes");
    assert_eq!(codes.iter().filter(|c| c.redeemed).count(), count, "Wrong number of redeemed codes");
}

#[then(expr = "{int} codes of '{word}' are available")]
async fn codes_available(world: &mut WarehouseWorld, count: u64, sku: String) {
    let available = world.db().available_quantity(world.product(&sku).id).await.expect("Error fetching stock");
    assert!(available.satisfies(count as i64) && !available.satisfies(count as i64 + 1), "Availability is {available}");
}

#[then(expr = "payment [{word}] was refunded {int} time(s)")]
async fn refunded(world: &mut WarehouseWorld, payment_id: String, times: usize) {
    let refunds = world.system().gateway.refunds();
    assert_eq!(refunds.iter().filter(|r| **r == payment_id).count(), times, "Wrong number of refunds");
}

#[then(expr = "'{word}' is told their order was refunded")]
async fn told_about_refund(world: &mut WarehouseWorld, email: String) {
    let messages = world.system().notifier.messages_to(&email);
    assert!(messages.iter().any(|m| m.subject.contains("refunded")), "No refund notice was sent");
}

#[then(expr = "'{word}' is asked to deliver {int} x '{word}'")]
async fn operator_asked(world: &mut WarehouseWorld, email: String, quantity: i64, sku: String) {
    let messages = world.system().notifier.messages_to(&email);
    let expected = format!("{quantity} x ");
    assert!(
        messages.iter().any(|m| m.body.contains(&expected) && m.body.contains(&sku)),
        "Operator was not asked to deliver {sku}"
    );
}

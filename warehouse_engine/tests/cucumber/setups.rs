use cucumber::given;
use warehouse_engine::test_utils::fixtures::{
    create_buyer,
    create_code_product,
    create_manual_product,
    create_operator,
};

use crate::cucumber::{warehouse_world::WarehouseSystem, WarehouseWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut WarehouseWorld) {
    let system = WarehouseSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "a buyer '{word}'")]
async fn a_buyer(world: &mut WarehouseWorld, email: String) {
    let user = create_buyer(world.db(), &email).await;
    world.users.insert(email, user);
}

#[given(expr = "a fulfilment operator '{word}'")]
async fn an_operator(world: &mut WarehouseWorld, email: String) {
    let user = create_operator(world.db(), &email).await;
    world.users.insert(email, user);
}

#[given(expr = "a code product '{word}' priced at {int} with {int} codes")]
async fn a_code_product(world: &mut WarehouseWorld, sku: String, price: i64, codes: usize) {
    let product = create_code_product(world.db(), &sku, price, codes).await;
    world.products.insert(sku, product);
}

#[given(expr = "a manual product '{word}' priced at {int}")]
async fn a_manual_product(world: &mut WarehouseWorld, sku: String, price: i64) {
    let product = create_manual_product(world.db(), &sku, price).await;
    world.products.insert(sku, product);
}

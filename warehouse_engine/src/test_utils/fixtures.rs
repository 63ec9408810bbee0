use crate::{
    db_types::{MinorUnits, NewProduct, NewUser, Product, ProductType, User, TRUSTED_PRIVILEGE_LEVEL},
    traits::{InventoryManagement, UserDirectory},
};

pub async fn create_buyer<B: UserDirectory>(db: &B, email: &str) -> User {
    db.create_user(NewUser::new("Test Buyer", email, 1)).await.expect("Error creating buyer")
}

pub async fn create_operator<B: UserDirectory>(db: &B, email: &str) -> User {
    db.create_user(NewUser::new("Test Operator", email, TRUSTED_PRIVILEGE_LEVEL)).await.expect("Error creating operator")
}

pub async fn create_manual_product<B: InventoryManagement>(db: &B, sku: &str, price: i64) -> Product {
    let product = NewProduct::new(ProductType::ManuallyDelivered, sku, sku, MinorUnits::from(price));
    db.create_product(product).await.expect("Error creating product")
}

/// Creates an automatically delivered product stocked with `codes` codes named `{sku}-{n}`.
pub async fn create_code_product<B: InventoryManagement>(db: &B, sku: &str, price: i64, codes: usize) -> Product {
    let product = NewProduct::new(ProductType::AutomaticallyDelivered, sku, sku, MinorUnits::from(price));
    let product = db.create_product(product).await.expect("Error creating product");
    let codes = (1..=codes).map(|n| format!("{sku}-{n}")).collect::<Vec<_>>();
    db.add_codes(product.id, &codes).await.expect("Error adding codes");
    product
}

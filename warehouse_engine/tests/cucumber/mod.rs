mod setups;
mod steps;
mod warehouse_world;

pub use warehouse_world::WarehouseWorld;

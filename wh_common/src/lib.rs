mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{checked_line_total, MinorUnits, MinorUnitsConversionError, DEFAULT_STORE_CURRENCY, MINOR_UNITS_PER_MAJOR};
pub use secret::Secret;

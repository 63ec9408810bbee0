//! SQLite backend for the warehouse engine. The same database holds the ledger and the job queue.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;

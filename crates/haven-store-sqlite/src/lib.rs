//! SQLite backend for the recovery services directory.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Batch loading, lineage and type
//! history are written as synchronous steps inside one transaction.

mod encode;
mod lineage;
mod load;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use schema::{CORE_TABLES_FILE, INDEXES_FILE, SchemaSource, VIEWS_FILE};
pub use store::SqliteStore;

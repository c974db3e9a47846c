//! Migration engine for the recovery services directory.
//!
//! Runs each configured source document through the ingest pipeline and
//! into a [`DirectoryStore`](haven_core::store::DirectoryStore), one
//! extraction run per document.

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod report;

pub use cancel::CancelFlag;
pub use config::{MigrateConfig, SourceSpec};
pub use engine::Engine;
pub use error::{Error, Result};
pub use report::{MigrationReport, RunReport};

#[cfg(test)]
mod tests;

//! Error type for `haven-store-sqlite`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] haven_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A schema file could not be read. Fatal for the whole migration.
  #[error("schema file {path:?} unreadable: {source}")]
  Schema {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("extraction run not found: {0}")]
  RunNotFound(uuid::Uuid),

  #[error("extraction run {0} is already finished")]
  RunAlreadyFinished(uuid::Uuid),

  #[error("cannot complete run {0} with status 'running'")]
  RunStillRunning(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error types for the haven-ingest pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// None of `name`, `organization_name` or `facility_name` is usable.
  #[error("record {position} has no usable name")]
  MissingName { position: usize },

  #[error("unrecognised document shape (top-level keys: {keys:?})")]
  UnknownShape { keys: Vec<String> },

  #[error("invalid pattern: {0}")]
  Pattern(#[from] regex::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

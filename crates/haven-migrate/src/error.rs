//! Error type for `haven-migrate`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("reference data error: {0}")]
  Core(#[from] haven_core::Error),

  #[error("ingest error: {0}")]
  Ingest(#[from] haven_ingest::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// A source is neither in the catalog nor described well enough in the
  /// configuration to be registered.
  #[error("unknown source {0:?}: not in the catalog and no category configured")]
  UnknownSource(String),

  #[error("configuration error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("cannot read source document {path:?}: {source}")]
  Read {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

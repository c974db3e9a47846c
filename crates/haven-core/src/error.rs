//! Error types for `haven-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("organization type {type_id:?} references unknown parent {parent:?}")]
  UnknownParentType { type_id: String, parent: String },

  #[error("organization type taxonomy contains a cycle through {0:?}")]
  TaxonomyCycle(String),

  #[error("duplicate organization type id: {0:?}")]
  DuplicateType(String),

  #[error("certification type {cert_type_id:?} references unknown authority {authority_id:?}")]
  UnknownAuthority {
    cert_type_id: String,
    authority_id: String,
  },

  #[error("certification type {cert_type_id:?} applies to unknown organization type {type_id:?}")]
  UnknownAppliesTo {
    cert_type_id: String,
    type_id:      String,
  },

  #[error("unknown organization type: {0:?}")]
  UnknownType(String),

  #[error("unknown {kind} discriminant: {value:?}")]
  UnknownDiscriminant { kind: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

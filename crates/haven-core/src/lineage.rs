//! Provenance records: per-source version history and type history.
//!
//! Both tables are append-only. A row is never rewritten except to flip its
//! `is_current` flag (and close `valid_to` for type history) when a newer
//! row supersedes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One version of an organization's data as delivered by one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationLineage {
  pub organization_id:   String,
  pub source_id:         String,
  pub extraction_run_id: Uuid,
  pub extracted_at:      DateTime<Utc>,
  /// SHA-256 hex digest of the source's contribution.
  pub data_hash:         String,
  /// Starts at 1 for each `(organization_id, source_id)` pair.
  pub version_number:    u32,
  /// At most one current row per `(organization_id, source_id)`.
  pub is_current:        bool,
}

/// What [`record_lineage`](crate::store::DirectoryStore::record_lineage) did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LineageOutcome {
  /// The hash matched the current row; nothing was written.
  Unchanged { version: u32 },
  /// A new current row was written with this version number.
  Versioned { version: u32 },
}

impl LineageOutcome {
  pub fn version(&self) -> u32 {
    match self {
      Self::Unchanged { version } | Self::Versioned { version } => *version,
    }
  }

  pub fn is_new_version(&self) -> bool { matches!(self, Self::Versioned { .. }) }
}

/// A validity interval during which an organization held a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAssignment {
  pub organization_id:       String,
  pub type_id:               String,
  pub valid_from:            DateTime<Utc>,
  /// `None` while current.
  pub valid_to:              Option<DateTime<Utc>>,
  pub is_current:            bool,
  /// Component that produced the classification, e.g. `classifier`.
  pub classified_by:         String,
  /// Source whose run triggered the classification.
  pub classification_source: Option<String>,
  pub confidence_score:      f64,
}

/// Raw source records behind a lineage version, kept out of the canonical
/// organization row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationPayload {
  pub organization_id:   String,
  pub source_id:         String,
  pub extraction_run_id: Uuid,
  pub payload:           serde_json::Value,
}

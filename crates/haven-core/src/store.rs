//! The `DirectoryStore` trait and the types that cross it.
//!
//! The trait is implemented by storage backends (e.g. `haven-store-sqlite`).
//! The migration engine depends on this abstraction, not on any concrete
//! backend. The store is the sole mutation point of the directory.

use std::{collections::BTreeMap, future::Future};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  catalog::Catalog,
  lineage::{LineageOutcome, OrganizationLineage, TypeAssignment},
  organization::Organization,
  source::{DataSource, ExtractionRun, RunStats, RunStatus},
};

// ─── Load types ──────────────────────────────────────────────────────────────

/// A fully resolved, classified and scored organization ready to persist,
/// together with the provenance of the run that produced it.
#[derive(Debug, Clone)]
pub struct StagedOrganization {
  pub organization:    Organization,
  pub source_id:       String,
  pub run_id:          Uuid,
  /// Hash of this source's contribution; drives lineage versioning.
  pub data_hash:       String,
  /// The raw records behind the contribution.
  pub payload:         serde_json::Value,
  /// Classifier confidence for `organization.organization_type`.
  pub type_confidence: f64,
}

/// Outcome of persisting one or more batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResult {
  pub inserted:         u64,
  pub updated:          u64,
  /// Upserts whose content matched the stored row.
  pub unchanged:        u64,
  /// Records that could not be written even after the retry.
  pub errors:           u64,
  /// Ids of the records counted in `errors`.
  pub quarantined:      Vec<String>,
  pub lineage_versions: u64,
  pub type_changes:     u64,
}

impl LoadResult {
  pub fn absorb(&mut self, other: LoadResult) {
    self.inserted += other.inserted;
    self.updated += other.updated;
    self.unchanged += other.unchanged;
    self.errors += other.errors;
    self.quarantined.extend(other.quarantined);
    self.lineage_versions += other.lineage_versions;
    self.type_changes += other.type_changes;
  }
}

/// Post-load validation figures for the whole directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectorySummary {
  pub total_organizations:    u64,
  pub counts_by_type:         BTreeMap<String, u64>,
  pub complete_addresses:     u64,
  pub with_contact_info:      u64,
  pub average_quality_score:  f64,
  pub state_coverage:         u64,
  pub lineage_rows:           u64,
  pub type_history_rows:      u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a directory store backend.
///
/// Organizations are upserted by id and never deleted. Lineage and type
/// history are append-only apart from their `is_current` flags.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait DirectoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reference data ────────────────────────────────────────────────────

  /// Insert the catalog's taxonomy, authorities and certification types.
  /// Rows that already exist are left untouched.
  fn seed_reference_data<'a>(
    &'a self,
    catalog: &'a Catalog,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Register a data source. Registering an existing `source_id` is a no-op.
  fn register_source(
    &self,
    source: DataSource,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_source(
    &self,
    source_id: String,
  ) -> impl Future<Output = Result<Option<DataSource>, Self::Error>> + Send + '_;

  // ── Extraction runs ───────────────────────────────────────────────────

  /// Open a new run for `source_id` with status `running`.
  fn begin_run(
    &self,
    source_id: String,
  ) -> impl Future<Output = Result<ExtractionRun, Self::Error>> + Send + '_;

  /// Finish a run. Returns an error if the run is unknown or already
  /// finished; finished runs are immutable.
  fn complete_run(
    &self,
    run_id: Uuid,
    status: RunStatus,
    stats: RunStats,
  ) -> impl Future<Output = Result<ExtractionRun, Self::Error>> + Send + '_;

  fn get_run(
    &self,
    run_id: Uuid,
  ) -> impl Future<Output = Result<Option<ExtractionRun>, Self::Error>> + Send + '_;

  // ── Organizations ─────────────────────────────────────────────────────

  fn get_organization(
    &self,
    id: String,
  ) -> impl Future<Output = Result<Option<Organization>, Self::Error>> + Send + '_;

  /// Every stored organization, ordered by id.
  fn list_organizations(
    &self,
  ) -> impl Future<Output = Result<Vec<Organization>, Self::Error>> + Send + '_;

  /// Persist one batch in a single transaction: organization upserts plus
  /// their lineage, payload and type-history rows. A failed transaction is
  /// retried once in halves; halves that fail again are quarantined.
  fn load_batch(
    &self,
    batch: Vec<StagedOrganization>,
  ) -> impl Future<Output = Result<LoadResult, Self::Error>> + Send + '_;

  // ── Lineage ───────────────────────────────────────────────────────────

  /// Append a lineage version unless `data_hash` matches the current row
  /// for `(organization_id, source_id)`.
  fn record_lineage(
    &self,
    organization_id: String,
    source_id: String,
    run_id: Uuid,
    data_hash: String,
    payload: serde_json::Value,
  ) -> impl Future<Output = Result<LineageOutcome, Self::Error>> + Send + '_;

  /// Make `type_id` the organization's current type. Returns `false` when
  /// it already was.
  fn record_type_assignment(
    &self,
    organization_id: String,
    type_id: String,
    confidence: f64,
    classification_source: Option<String>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// All lineage rows for an organization, oldest first.
  fn lineage(
    &self,
    organization_id: String,
  ) -> impl Future<Output = Result<Vec<OrganizationLineage>, Self::Error>> + Send + '_;

  /// All type-history rows for an organization, oldest first.
  fn type_history(
    &self,
    organization_id: String,
  ) -> impl Future<Output = Result<Vec<TypeAssignment>, Self::Error>> + Send + '_;

  // ── Post-load ─────────────────────────────────────────────────────────

  /// Create indexes and views. Run after bulk loading.
  fn finalize(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn summary(
    &self,
  ) -> impl Future<Output = Result<DirectorySummary, Self::Error>> + Send + '_;
}

//! Run and migration reports.

use haven_core::{
  source::ExtractionRun,
  store::{DirectorySummary, LoadResult},
};
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of ingesting one source document.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  /// The finished run record, counters included.
  pub run:       ExtractionRun,
  pub load:      LoadResult,
  /// Why the run failed, when it did.
  pub failure:   Option<String>,
  pub cancelled: bool,
}

impl RunReport {
  pub fn log(&self) {
    let stats = &self.run.stats;
    info!(
      source_id = %self.run.source_id,
      run_id = %self.run.run_id,
      status = self.run.status.as_str(),
      processed = stats.records_extracted,
      added = stats.records_added,
      updated = stats.records_updated,
      unchanged = stats.records_unchanged,
      duplicates = stats.duplicates_merged,
      rejected = stats.records_rejected,
      malformed_fields = stats.malformed_fields,
      "source ingested"
    );
    if !self.load.quarantined.is_empty() {
      warn!(
        source_id = %self.run.source_id,
        quarantined = self.load.quarantined.len(),
        "records quarantined"
      );
    }
  }
}

/// Outcome of a whole migration.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
  pub runs:    Vec<RunReport>,
  pub summary: DirectorySummary,
  /// Sources not attempted because the migration was cancelled.
  pub skipped: Vec<String>,
}

impl MigrationReport {
  /// Log the post-load validation summary.
  pub fn log(&self) {
    let s = &self.summary;
    info!(
      total = s.total_organizations,
      complete_addresses = s.complete_addresses,
      with_contact_info = s.with_contact_info,
      average_quality = format!("{:.3}", s.average_quality_score),
      states = s.state_coverage,
      lineage_rows = s.lineage_rows,
      type_history_rows = s.type_history_rows,
      "directory summary"
    );
    for (type_id, count) in &s.counts_by_type {
      info!(type_id = %type_id, count, "organizations by type");
    }
    if !self.skipped.is_empty() {
      warn!(skipped = ?self.skipped, "migration cancelled before every source ran");
    }
  }

  pub fn failed_runs(&self) -> impl Iterator<Item = &RunReport> {
    self.runs.iter().filter(|r| r.failure.is_some())
  }
}

//! Data sources and the extraction runs that ingest them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, taxonomy::SourceCategory};

// ─── Data sources ────────────────────────────────────────────────────────────

/// How a source's data was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
  Api,
  WebScraping,
  Csv,
  Manual,
}

impl SourceType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Api => "api",
      Self::WebScraping => "web_scraping",
      Self::Csv => "csv",
      Self::Manual => "manual",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "api" => Ok(Self::Api),
      "web_scraping" => Ok(Self::WebScraping),
      "csv" => Ok(Self::Csv),
      "manual" => Ok(Self::Manual),
      other => Err(Error::UnknownDiscriminant {
        kind:  "source type",
        value: other.to_owned(),
      }),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateFrequency {
  Daily,
  Weekly,
  Monthly,
  Quarterly,
}

impl UpdateFrequency {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Daily => "daily",
      Self::Weekly => "weekly",
      Self::Monthly => "monthly",
      Self::Quarterly => "quarterly",
    }
  }
}

/// A scraper or feed identity. Registered once and referenced by every
/// extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
  pub source_id:           String,
  pub source_name:         String,
  pub source_type:         SourceType,
  pub source_url:          Option<String>,
  pub source_organization: Option<String>,
  /// 0.0 – 1.0.
  pub reliability_score:   f64,
  pub update_frequency:    UpdateFrequency,
  pub official_source:     bool,
  pub category:            SourceCategory,
  pub first_accessed:      Option<NaiveDate>,
}

// ─── Extraction runs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
  Running,
  Completed,
  /// Finished, but some batches were quarantined or the run was cancelled.
  Partial,
  /// The source document could not be read or recognised.
  Failed,
}

impl RunStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Running => "running",
      Self::Completed => "completed",
      Self::Partial => "partial",
      Self::Failed => "failed",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "running" => Ok(Self::Running),
      "completed" => Ok(Self::Completed),
      "partial" => Ok(Self::Partial),
      "failed" => Ok(Self::Failed),
      other => Err(Error::UnknownDiscriminant {
        kind:  "run status",
        value: other.to_owned(),
      }),
    }
  }

  pub fn is_finished(&self) -> bool { !matches!(self, Self::Running) }
}

/// Counters accumulated while a run processes one source document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
  /// Raw records found in the document.
  pub records_extracted: u64,
  pub records_added:     u64,
  pub records_updated:   u64,
  pub records_unchanged: u64,
  /// Raw records folded into another record of this run or the store.
  pub duplicates_merged: u64,
  /// Raw records dropped by validation or quarantined by the loader.
  pub records_rejected:  u64,
  /// Optional fields that were present but could not be parsed.
  pub malformed_fields:  u64,
}

/// One ingestion batch from one source. Immutable once finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRun {
  pub run_id:          Uuid,
  pub source_id:       String,
  /// `full` for whole-document loads.
  pub extraction_type: String,
  pub started_at:      DateTime<Utc>,
  pub completed_at:    Option<DateTime<Utc>>,
  pub status:          RunStatus,
  pub stats:           RunStats,
}

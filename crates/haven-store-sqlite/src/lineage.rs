//! Lineage and type-history writes.
//!
//! Synchronous helpers that run inside a caller-owned transaction, so the
//! batch loader can commit an organization together with its provenance.

use haven_core::lineage::LineageOutcome;
use rusqlite::{Connection, OptionalExtension as _, params};

/// Component name recorded in type history rows.
pub const CLASSIFIED_BY: &str = "classifier";

/// One lineage version to record.
pub struct LineageWrite<'a> {
  pub organization_id: &'a str,
  pub source_id:       &'a str,
  pub run_id:          &'a str,
  pub data_hash:       &'a str,
  /// JSON text of the raw source records.
  pub payload:         &'a str,
  pub extracted_at:    &'a str,
}

/// Append a version unless the hash matches the current row for
/// `(organization_id, source_id)`. The payload is written only with a new
/// version.
pub fn record_lineage(conn: &Connection, w: &LineageWrite<'_>) -> rusqlite::Result<LineageOutcome> {
  let current: Option<(u32, String)> = conn
    .query_row(
      "SELECT version_number, data_hash FROM organization_lineage
        WHERE organization_id = ?1 AND source_id = ?2 AND is_current = 1",
      params![w.organization_id, w.source_id],
      |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?;

  if let Some((version, hash)) = &current
    && hash == w.data_hash
  {
    return Ok(LineageOutcome::Unchanged { version: *version });
  }

  let version = current.map_or(1, |(v, _)| v + 1);

  conn.execute(
    "UPDATE organization_lineage SET is_current = 0
      WHERE organization_id = ?1 AND source_id = ?2 AND is_current = 1",
    params![w.organization_id, w.source_id],
  )?;
  conn.execute(
    "INSERT INTO organization_lineage (
       organization_id, source_id, extraction_run_id, extracted_at,
       data_hash, version_number, is_current
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
    params![
      w.organization_id,
      w.source_id,
      w.run_id,
      w.extracted_at,
      w.data_hash,
      version,
    ],
  )?;
  conn.execute(
    "INSERT INTO organization_payloads (
       organization_id, source_id, extraction_run_id, payload
     ) VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (organization_id, source_id, extraction_run_id)
     DO UPDATE SET payload = excluded.payload",
    params![w.organization_id, w.source_id, w.run_id, w.payload],
  )?;

  Ok(LineageOutcome::Versioned { version })
}

/// One type assignment to record.
pub struct TypeWrite<'a> {
  pub organization_id:       &'a str,
  pub type_id:               &'a str,
  pub confidence:            f64,
  pub classification_source: Option<&'a str>,
  pub at:                    &'a str,
}

/// Make `type_id` current. Returns `false` when it already was.
pub fn record_type_assignment(conn: &Connection, w: &TypeWrite<'_>) -> rusqlite::Result<bool> {
  let current: Option<String> = conn
    .query_row(
      "SELECT type_id FROM organization_type_history
        WHERE organization_id = ?1 AND is_current = 1",
      params![w.organization_id],
      |row| row.get(0),
    )
    .optional()?;

  if current.as_deref() == Some(w.type_id) {
    return Ok(false);
  }

  conn.execute(
    "UPDATE organization_type_history SET valid_to = ?2, is_current = 0
      WHERE organization_id = ?1 AND is_current = 1",
    params![w.organization_id, w.at],
  )?;
  conn.execute(
    "INSERT INTO organization_type_history (
       organization_id, type_id, valid_from, valid_to, is_current,
       classified_by, classification_source, confidence_score
     ) VALUES (?1, ?2, ?3, NULL, 1, ?4, ?5, ?6)",
    params![
      w.organization_id,
      w.type_id,
      w.at,
      CLASSIFIED_BY,
      w.classification_source,
      w.confidence.clamp(0.0, 1.0),
    ],
  )?;
  Ok(true)
}

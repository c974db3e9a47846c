//! Transactional batch loading.
//!
//! A batch is written in one transaction: organization upserts followed by
//! their lineage, payload and type-history rows. If the transaction fails
//! it rolls back and each half is retried once in its own transaction. A
//! half that fails again is quarantined.

use haven_core::store::{LoadResult, StagedOrganization};
use rusqlite::{Connection, OptionalExtension as _, Transaction, params};
use tracing::{error, warn};

use crate::{
  Result,
  encode::{OrganizationRow, encode_uuid},
  lineage::{self, LineageWrite, TypeWrite},
};

/// A staged organization encoded for writing.
pub struct PreparedRecord {
  pub row:             OrganizationRow,
  pub source_id:       String,
  pub run_id:          String,
  pub data_hash:       String,
  pub payload:         String,
  pub type_confidence: f64,
}

impl PreparedRecord {
  pub fn prepare(staged: &StagedOrganization) -> Result<Self> {
    Ok(Self {
      row:             OrganizationRow::encode(&staged.organization)?,
      source_id:       staged.source_id.clone(),
      run_id:          encode_uuid(staged.run_id),
      data_hash:       staged.data_hash.clone(),
      payload:         serde_json::to_string(&staged.payload)?,
      type_confidence: staged.type_confidence,
    })
  }
}

const UPSERT_ORGANIZATION: &str = "
  INSERT INTO organizations (
    id, name, organization_type,
    address_street, address_city, address_state, address_zip,
    latitude, longitude, phone, email, website, description,
    services, certifications, capacity, facility_type, level_of_care,
    demographics, operator, funding_sources, data_source, extraction_date,
    is_narr_certified, certification_type, certification_type_id,
    certification_authority_id, certification_level, data_quality_score,
    has_complete_address, has_contact_info, content_hash,
    created_at, updated_at
  ) VALUES (
    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
    ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
    ?31, ?32, ?33, ?33
  )
  ON CONFLICT(id) DO UPDATE SET
    name                       = excluded.name,
    organization_type          = excluded.organization_type,
    address_street             = excluded.address_street,
    address_city               = excluded.address_city,
    address_state              = excluded.address_state,
    address_zip                = excluded.address_zip,
    latitude                   = excluded.latitude,
    longitude                  = excluded.longitude,
    phone                      = excluded.phone,
    email                      = excluded.email,
    website                    = excluded.website,
    description                = excluded.description,
    services                   = excluded.services,
    certifications             = excluded.certifications,
    capacity                   = excluded.capacity,
    facility_type              = excluded.facility_type,
    level_of_care              = excluded.level_of_care,
    demographics               = excluded.demographics,
    operator                   = excluded.operator,
    funding_sources            = excluded.funding_sources,
    data_source                = excluded.data_source,
    extraction_date            = excluded.extraction_date,
    is_narr_certified          = excluded.is_narr_certified,
    certification_type         = excluded.certification_type,
    certification_type_id      = excluded.certification_type_id,
    certification_authority_id = excluded.certification_authority_id,
    certification_level        = excluded.certification_level,
    data_quality_score         = excluded.data_quality_score,
    has_complete_address       = excluded.has_complete_address,
    has_contact_info           = excluded.has_contact_info,
    content_hash               = excluded.content_hash,
    updated_at                 = excluded.updated_at";

/// Write `records`, retrying once in halves on failure. Never fails as a
/// whole; unwritable records are reported in `LoadResult::quarantined`.
pub fn load_batch(conn: &mut Connection, records: &[PreparedRecord], now: &str) -> LoadResult {
  let first_error = match write_all(conn, records, now) {
    Ok(result) => return result,
    Err(e) => e,
  };
  warn!(size = records.len(), error = %first_error, "batch rolled back; retrying in halves");

  let mid = records.len() / 2;
  let mut result = LoadResult::default();
  for half in [&records[..mid], &records[mid..]] {
    if half.is_empty() {
      continue;
    }
    match write_all(conn, half, now) {
      Ok(written) => result.absorb(written),
      Err(e) => {
        for record in half {
          error!(organization_id = %record.row.id, error = %e, "record quarantined");
          result.errors += 1;
          result.quarantined.push(record.row.id.clone());
        }
      }
    }
  }
  result
}

fn write_all(conn: &mut Connection, records: &[PreparedRecord], now: &str) -> rusqlite::Result<LoadResult> {
  let tx = conn.transaction()?;
  let mut result = LoadResult::default();
  for record in records {
    write_one(&tx, record, now, &mut result)?;
  }
  tx.commit()?;
  Ok(result)
}

fn write_one(
  tx: &Transaction<'_>,
  record: &PreparedRecord,
  now: &str,
  result: &mut LoadResult,
) -> rusqlite::Result<()> {
  let row = &record.row;
  let stored_hash: Option<String> = tx
    .query_row(
      "SELECT content_hash FROM organizations WHERE id = ?1",
      params![row.id],
      |r| r.get(0),
    )
    .optional()?;

  match stored_hash {
    Some(hash) if hash == row.content_hash => result.unchanged += 1,
    stored => {
      tx.prepare_cached(UPSERT_ORGANIZATION)?.execute(params![
        row.id,
        row.name,
        row.organization_type,
        row.address_street,
        row.address_city,
        row.address_state,
        row.address_zip,
        row.latitude,
        row.longitude,
        row.phone,
        row.email,
        row.website,
        row.description,
        row.services,
        row.certifications,
        row.capacity,
        row.facility_type,
        row.level_of_care,
        row.demographics,
        row.operator,
        row.funding_sources,
        row.data_source,
        row.extraction_date,
        row.is_narr_certified,
        row.certification_type,
        row.certification_type_id,
        row.certification_authority_id,
        row.certification_level,
        row.data_quality_score,
        row.has_complete_address,
        row.has_contact_info,
        row.content_hash,
        now,
      ])?;
      if stored.is_some() {
        result.updated += 1;
      } else {
        result.inserted += 1;
      }
    }
  }

  let outcome = lineage::record_lineage(tx, &LineageWrite {
    organization_id: &row.id,
    source_id:       &record.source_id,
    run_id:          &record.run_id,
    data_hash:       &record.data_hash,
    payload:         &record.payload,
    extracted_at:    now,
  })?;
  if outcome.is_new_version() {
    result.lineage_versions += 1;
  }

  let changed = lineage::record_type_assignment(tx, &TypeWrite {
    organization_id:       &row.id,
    type_id:               &row.organization_type,
    confidence:            record.type_confidence,
    classification_source: Some(&record.source_id),
    at:                    now,
  })?;
  if changed {
    result.type_changes += 1;
  }
  Ok(())
}

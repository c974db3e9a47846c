//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates `YYYY-MM-DD`. List
//! fields, capacity and demographics are compact JSON. UUIDs are hyphenated
//! lowercase strings.

use chrono::{DateTime, NaiveDate, Utc};
use haven_core::{
  lineage::{OrganizationLineage, TypeAssignment},
  organization::{Address, Capacity, Coordinates, Organization},
  source::{DataSource, ExtractionRun, RunStats, RunStatus, SourceType, UpdateFrequency},
  taxonomy::SourceCategory,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_list(list: &[String]) -> Result<String> {
  Ok(serde_json::to_string(list)?)
}

pub fn decode_list(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

fn decode_json<T: serde::de::DeserializeOwned>(s: Option<String>) -> Result<Option<T>> {
  s.as_deref().map(serde_json::from_str).transpose().map_err(Error::from)
}

fn decode_update_frequency(s: &str) -> Result<UpdateFrequency> {
  match s {
    "daily" => Ok(UpdateFrequency::Daily),
    "weekly" => Ok(UpdateFrequency::Weekly),
    "monthly" => Ok(UpdateFrequency::Monthly),
    "quarterly" => Ok(UpdateFrequency::Quarterly),
    other => Err(
      haven_core::Error::UnknownDiscriminant {
        kind:  "update frequency",
        value: other.to_owned(),
      }
      .into(),
    ),
  }
}

// ─── Organizations ───────────────────────────────────────────────────────────

/// Column list shared by every organization SELECT, in `RawOrganization`
/// field order.
pub const ORGANIZATION_COLUMNS: &str = "
  id, name, organization_type,
  address_street, address_city, address_state, address_zip,
  latitude, longitude, phone, email, website, description,
  services, certifications, capacity, facility_type, level_of_care,
  demographics, operator, funding_sources, data_source, extraction_date,
  is_narr_certified, certification_type, certification_type_id,
  certification_authority_id, certification_level, data_quality_score,
  has_complete_address, has_contact_info";

/// An organization encoded for binding, plus its content hash.
#[derive(Debug, Clone)]
pub struct OrganizationRow {
  pub id:                         String,
  pub name:                       String,
  pub organization_type:          String,
  pub address_street:             Option<String>,
  pub address_city:               Option<String>,
  pub address_state:              Option<String>,
  pub address_zip:                Option<String>,
  pub latitude:                   Option<f64>,
  pub longitude:                  Option<f64>,
  pub phone:                      Option<String>,
  pub email:                      Option<String>,
  pub website:                    Option<String>,
  pub description:                Option<String>,
  pub services:                   String,
  pub certifications:             String,
  pub capacity:                   Option<String>,
  pub facility_type:              Option<String>,
  pub level_of_care:              Option<String>,
  pub demographics:               Option<String>,
  pub operator:                   Option<String>,
  pub funding_sources:            String,
  pub data_source:                String,
  pub extraction_date:            String,
  pub is_narr_certified:          bool,
  pub certification_type:         Option<String>,
  pub certification_type_id:      Option<String>,
  pub certification_authority_id: Option<String>,
  pub certification_level:        Option<String>,
  pub data_quality_score:         f64,
  pub has_complete_address:       bool,
  pub has_contact_info:           bool,
  /// SHA-256 over the organization's JSON form.
  pub content_hash:               String,
}

impl OrganizationRow {
  pub fn encode(org: &Organization) -> Result<Self> {
    let content_hash = hex::encode(Sha256::digest(serde_json::to_vec(org)?));
    Ok(Self {
      id: org.id.clone(),
      name: org.name.clone(),
      organization_type: org.organization_type.clone(),
      address_street: org.address.street.clone(),
      address_city: org.address.city.clone(),
      address_state: org.address.state.clone(),
      address_zip: org.address.zip.clone(),
      latitude: org.coordinates.map(|c| c.latitude),
      longitude: org.coordinates.map(|c| c.longitude),
      phone: org.phone.clone(),
      email: org.email.clone(),
      website: org.website.clone(),
      description: org.description.clone(),
      services: encode_list(&org.services)?,
      certifications: encode_list(&org.certifications)?,
      capacity: org.capacity.as_ref().map(serde_json::to_string).transpose()?,
      facility_type: org.facility_type.clone(),
      level_of_care: org.level_of_care.clone(),
      demographics: org.demographics.as_ref().map(serde_json::to_string).transpose()?,
      operator: org.operator.clone(),
      funding_sources: encode_list(&org.funding_sources)?,
      data_source: encode_list(&org.data_source)?,
      extraction_date: encode_date(org.extraction_date),
      is_narr_certified: org.is_narr_certified,
      certification_type: org.certification_type.clone(),
      certification_type_id: org.certification_type_id.clone(),
      certification_authority_id: org.certification_authority_id.clone(),
      certification_level: org.certification_level.clone(),
      data_quality_score: org.data_quality_score,
      has_complete_address: org.has_complete_address,
      has_contact_info: org.has_contact_info,
      content_hash,
    })
  }
}

/// Raw values read directly from an `organizations` row.
pub struct RawOrganization {
  pub id:                         String,
  pub name:                       String,
  pub organization_type:          String,
  pub address_street:             Option<String>,
  pub address_city:               Option<String>,
  pub address_state:              Option<String>,
  pub address_zip:                Option<String>,
  pub latitude:                   Option<f64>,
  pub longitude:                  Option<f64>,
  pub phone:                      Option<String>,
  pub email:                      Option<String>,
  pub website:                    Option<String>,
  pub description:                Option<String>,
  pub services:                   String,
  pub certifications:             String,
  pub capacity:                   Option<String>,
  pub facility_type:              Option<String>,
  pub level_of_care:              Option<String>,
  pub demographics:               Option<String>,
  pub operator:                   Option<String>,
  pub funding_sources:            String,
  pub data_source:                String,
  pub extraction_date:            String,
  pub is_narr_certified:          bool,
  pub certification_type:         Option<String>,
  pub certification_type_id:      Option<String>,
  pub certification_authority_id: Option<String>,
  pub certification_level:        Option<String>,
  pub data_quality_score:         f64,
  pub has_complete_address:       bool,
  pub has_contact_info:           bool,
}

impl RawOrganization {
  /// Read a row selected with [`ORGANIZATION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                         row.get(0)?,
      name:                       row.get(1)?,
      organization_type:          row.get(2)?,
      address_street:             row.get(3)?,
      address_city:               row.get(4)?,
      address_state:              row.get(5)?,
      address_zip:                row.get(6)?,
      latitude:                   row.get(7)?,
      longitude:                  row.get(8)?,
      phone:                      row.get(9)?,
      email:                      row.get(10)?,
      website:                    row.get(11)?,
      description:                row.get(12)?,
      services:                   row.get(13)?,
      certifications:             row.get(14)?,
      capacity:                   row.get(15)?,
      facility_type:              row.get(16)?,
      level_of_care:              row.get(17)?,
      demographics:               row.get(18)?,
      operator:                   row.get(19)?,
      funding_sources:            row.get(20)?,
      data_source:                row.get(21)?,
      extraction_date:            row.get(22)?,
      is_narr_certified:          row.get(23)?,
      certification_type:         row.get(24)?,
      certification_type_id:      row.get(25)?,
      certification_authority_id: row.get(26)?,
      certification_level:        row.get(27)?,
      data_quality_score:         row.get(28)?,
      has_complete_address:       row.get(29)?,
      has_contact_info:           row.get(30)?,
    })
  }

  pub fn into_organization(self) -> Result<Organization> {
    let coordinates = match (self.latitude, self.longitude) {
      (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
      _ => None,
    };
    Ok(Organization {
      id: self.id,
      name: self.name,
      organization_type: self.organization_type,
      address: Address {
        street: self.address_street,
        city:   self.address_city,
        state:  self.address_state,
        zip:    self.address_zip,
      },
      coordinates,
      phone: self.phone,
      email: self.email,
      website: self.website,
      description: self.description,
      services: decode_list(&self.services)?,
      certifications: decode_list(&self.certifications)?,
      capacity: decode_json::<Capacity>(self.capacity)?,
      facility_type: self.facility_type,
      level_of_care: self.level_of_care,
      demographics: decode_json(self.demographics)?,
      operator: self.operator,
      funding_sources: decode_list(&self.funding_sources)?,
      data_source: decode_list(&self.data_source)?,
      extraction_date: decode_date(&self.extraction_date)?,
      is_narr_certified: self.is_narr_certified,
      certification_type: self.certification_type,
      certification_type_id: self.certification_type_id,
      certification_authority_id: self.certification_authority_id,
      certification_level: self.certification_level,
      data_quality_score: self.data_quality_score,
      has_complete_address: self.has_complete_address,
      has_contact_info: self.has_contact_info,
    })
  }
}

// ─── Sources and runs ────────────────────────────────────────────────────────

pub struct RawSource {
  pub source_id:           String,
  pub source_name:         String,
  pub source_type:         String,
  pub source_url:          Option<String>,
  pub source_organization: Option<String>,
  pub reliability_score:   f64,
  pub update_frequency:    String,
  pub official_source:     bool,
  pub category:            String,
  pub first_accessed:      Option<String>,
}

impl RawSource {
  pub fn into_source(self) -> Result<DataSource> {
    Ok(DataSource {
      source_id:           self.source_id,
      source_name:         self.source_name,
      source_type:         SourceType::parse(&self.source_type)?,
      source_url:          self.source_url,
      source_organization: self.source_organization,
      reliability_score:   self.reliability_score,
      update_frequency:    decode_update_frequency(&self.update_frequency)?,
      official_source:     self.official_source,
      category:            SourceCategory::parse(&self.category)?,
      first_accessed:      self.first_accessed.as_deref().map(decode_date).transpose()?,
    })
  }
}

pub const RUN_COLUMNS: &str = "
  run_id, source_id, extraction_type, started_at, completed_at,
  records_extracted, records_added, records_updated, records_unchanged,
  duplicates_merged, records_rejected, malformed_fields, status";

pub struct RawRun {
  pub run_id:          String,
  pub source_id:       String,
  pub extraction_type: String,
  pub started_at:      String,
  pub completed_at:    Option<String>,
  pub counts:          [u64; 7],
  pub status:          String,
}

impl RawRun {
  /// Read a row selected with [`RUN_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    let mut counts = [0u64; 7];
    for (i, slot) in counts.iter_mut().enumerate() {
      *slot = row.get::<_, i64>(5 + i)?.max(0) as u64;
    }
    Ok(Self {
      run_id: row.get(0)?,
      source_id: row.get(1)?,
      extraction_type: row.get(2)?,
      started_at: row.get(3)?,
      completed_at: row.get(4)?,
      counts,
      status: row.get(12)?,
    })
  }

  pub fn into_run(self) -> Result<ExtractionRun> {
    let [
      records_extracted,
      records_added,
      records_updated,
      records_unchanged,
      duplicates_merged,
      records_rejected,
      malformed_fields,
    ] = self.counts;
    Ok(ExtractionRun {
      run_id:          decode_uuid(&self.run_id)?,
      source_id:       self.source_id,
      extraction_type: self.extraction_type,
      started_at:      decode_dt(&self.started_at)?,
      completed_at:    self.completed_at.as_deref().map(decode_dt).transpose()?,
      status:          RunStatus::parse(&self.status)?,
      stats:           RunStats {
        records_extracted,
        records_added,
        records_updated,
        records_unchanged,
        duplicates_merged,
        records_rejected,
        malformed_fields,
      },
    })
  }
}

/// Counters in `RUN_COLUMNS` order, ready for binding.
pub fn encode_stats(stats: &RunStats) -> [i64; 7] {
  [
    stats.records_extracted,
    stats.records_added,
    stats.records_updated,
    stats.records_unchanged,
    stats.duplicates_merged,
    stats.records_rejected,
    stats.malformed_fields,
  ]
  .map(|n| i64::try_from(n).unwrap_or(i64::MAX))
}

// ─── Provenance ──────────────────────────────────────────────────────────────

pub struct RawLineage {
  pub organization_id:   String,
  pub source_id:         String,
  pub extraction_run_id: String,
  pub extracted_at:      String,
  pub data_hash:         String,
  pub version_number:    u32,
  pub is_current:        bool,
}

impl RawLineage {
  pub fn into_lineage(self) -> Result<OrganizationLineage> {
    Ok(OrganizationLineage {
      organization_id:   self.organization_id,
      source_id:         self.source_id,
      extraction_run_id: decode_uuid(&self.extraction_run_id)?,
      extracted_at:      decode_dt(&self.extracted_at)?,
      data_hash:         self.data_hash,
      version_number:    self.version_number,
      is_current:        self.is_current,
    })
  }
}

pub struct RawTypeAssignment {
  pub organization_id:       String,
  pub type_id:               String,
  pub valid_from:            String,
  pub valid_to:              Option<String>,
  pub is_current:            bool,
  pub classified_by:         String,
  pub classification_source: Option<String>,
  pub confidence_score:      f64,
}

impl RawTypeAssignment {
  pub fn into_assignment(self) -> Result<TypeAssignment> {
    Ok(TypeAssignment {
      organization_id:       self.organization_id,
      type_id:               self.type_id,
      valid_from:            decode_dt(&self.valid_from)?,
      valid_to:              self.valid_to.as_deref().map(decode_dt).transpose()?,
      is_current:            self.is_current,
      classified_by:         self.classified_by,
      classification_source: self.classification_source,
      confidence_score:      self.confidence_score,
    })
  }
}

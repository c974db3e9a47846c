//! Source normalizer: shape detection and field mapping.
//!
//! Pipeline:
//!   serde_json::Value
//!     └─ detect_shape()          → RawBatch
//!          └─ into_records()     → Vec<RawRecord>
//!               └─ to_draft()    → Draft
//!                    └─ into_organization() → Organization

use chrono::NaiveDate;
use haven_core::{
  organization::{
    Address, Capacity, Coordinates, Organization, canonical_set, insert_sorted,
  },
  taxonomy::SourceCategory,
};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
  Error, Result,
  address::{AddressParser, normalize_state},
};

// ─── Shapes ──────────────────────────────────────────────────────────────────

/// A recognised source document, one variant per known container layout.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBatch {
  /// `{"organizations_by_state": {"Texas": [...], ...}}`
  OrganizationsByState(Vec<(String, Vec<Value>)>),
  AllFacilities(Vec<Value>),
  Facilities(Vec<Value>),
  AllCenters(Vec<Value>),
  RecoveryCommunityCenters(Vec<Value>),
  RecoveryCommunityOrganizations(Vec<Value>),
  Houses(Vec<Value>),
  /// A bare top-level array.
  List(Vec<Value>),
}

/// Single-list container keys in detection priority order.
const LIST_SHAPES: &[(&str, fn(Vec<Value>) -> RawBatch)] = &[
  ("all_facilities", RawBatch::AllFacilities),
  ("facilities", RawBatch::Facilities),
  ("all_centers", RawBatch::AllCenters),
  ("recovery_community_centers", RawBatch::RecoveryCommunityCenters),
  (
    "recovery_community_organizations",
    RawBatch::RecoveryCommunityOrganizations,
  ),
  ("houses", RawBatch::Houses),
];

/// Identify the layout of a source document.
///
/// `organizations_by_state` wins over every list key; a key whose value has
/// the wrong JSON type is ignored and detection moves on.
pub fn detect_shape(document: Value) -> Result<RawBatch> {
  let mut map = match document {
    Value::Array(items) => return Ok(RawBatch::List(items)),
    Value::Object(map) => map,
    other => {
      return Err(Error::UnknownShape {
        keys: vec![format!("<{}>", json_kind(&other))],
      });
    }
  };
  let keys: Vec<String> = map.keys().cloned().collect();

  if let Some(Value::Object(buckets)) = map.remove("organizations_by_state") {
    let buckets = buckets
      .into_iter()
      .filter_map(|(state, orgs)| match orgs {
        Value::Array(items) => Some((state, items)),
        other => {
          warn!(bucket = %state, kind = json_kind(&other), "skipping non-list state bucket");
          None
        }
      })
      .collect();
    return Ok(RawBatch::OrganizationsByState(buckets));
  }

  for (key, variant) in LIST_SHAPES {
    if let Some(Value::Array(items)) = map.remove(*key) {
      return Ok(variant(items));
    }
  }

  Err(Error::UnknownShape { keys })
}

impl RawBatch {
  pub fn shape_name(&self) -> &'static str {
    match self {
      Self::OrganizationsByState(_) => "organizations_by_state",
      Self::AllFacilities(_) => "all_facilities",
      Self::Facilities(_) => "facilities",
      Self::AllCenters(_) => "all_centers",
      Self::RecoveryCommunityCenters(_) => "recovery_community_centers",
      Self::RecoveryCommunityOrganizations(_) => {
        "recovery_community_organizations"
      }
      Self::Houses(_) => "houses",
      Self::List(_) => "list",
    }
  }

  /// Flatten into object records. Non-object elements are skipped with a
  /// warning but still consume a position.
  pub fn into_records(self) -> Vec<RawRecord> {
    let mut records = Vec::new();
    let mut position = 0;
    match self {
      Self::OrganizationsByState(buckets) => {
        for (state, items) in buckets {
          push_objects(&mut records, &mut position, items, Some(&state));
        }
      }
      Self::AllFacilities(items)
      | Self::Facilities(items)
      | Self::AllCenters(items)
      | Self::RecoveryCommunityCenters(items)
      | Self::RecoveryCommunityOrganizations(items)
      | Self::Houses(items)
      | Self::List(items) => {
        push_objects(&mut records, &mut position, items, None)
      }
    }
    records
  }
}

fn push_objects(
  out: &mut Vec<RawRecord>,
  position: &mut usize,
  items: Vec<Value>,
  bucket: Option<&str>,
) {
  for item in items {
    match item {
      Value::Object(fields) => out.push(RawRecord {
        position: *position,
        bucket: bucket.map(str::to_owned),
        fields,
      }),
      other => {
        warn!(position = *position, kind = json_kind(&other), "skipping non-object record");
      }
    }
    *position += 1;
  }
}

/// Detect and flatten in one step. An unrecognised shape yields no records
/// and a warning.
pub fn normalize(document: Value, source_id: &str) -> Vec<RawRecord> {
  match detect_shape(document) {
    Ok(batch) => batch.into_records(),
    Err(e) => {
      warn!(source = source_id, error = %e, "no records extracted");
      Vec::new()
    }
  }
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

// ─── Field extraction ────────────────────────────────────────────────────────

/// An optional field that was present but unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed field {field:?}: {reason}")]
pub struct FieldError {
  pub field:  String,
  pub reason: String,
}

impl FieldError {
  fn new(field: &str, reason: impl Into<String>) -> Self {
    Self { field: field.to_owned(), reason: reason.into() }
  }
}

fn text(value: Option<&Value>, field: &str) -> Result<Option<String>, FieldError> {
  match value {
    None | Some(Value::Null) => Ok(None),
    Some(Value::String(s)) => {
      let s = s.trim();
      Ok((!s.is_empty()).then(|| s.to_owned()))
    }
    Some(Value::Number(n)) => Ok(Some(n.to_string())),
    Some(other) => Err(FieldError::new(
      field,
      format!("expected text, found {}", json_kind(other)),
    )),
  }
}

fn list(value: Option<&Value>, field: &str) -> Result<Vec<String>, FieldError> {
  match value {
    None | Some(Value::Null) => Ok(Vec::new()),
    Some(Value::String(s)) => Ok(canonical_set(
      s.split([',', ';']).map(str::to_owned).collect(),
    )),
    Some(Value::Array(items)) => {
      let mut out = Vec::with_capacity(items.len());
      for item in items {
        match item {
          Value::String(s) => out.push(s.clone()),
          Value::Number(n) => out.push(n.to_string()),
          Value::Null => {}
          other => {
            return Err(FieldError::new(
              field,
              format!("list element is {}", json_kind(other)),
            ));
          }
        }
      }
      Ok(canonical_set(out))
    }
    Some(other) => Err(FieldError::new(
      field,
      format!("expected list, found {}", json_kind(other)),
    )),
  }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

fn date(value: Option<&Value>, field: &str) -> Result<Option<NaiveDate>, FieldError> {
  let Some(raw) = text(value, field)? else {
    return Ok(None);
  };
  // Timestamps carry the date in their first ten bytes.
  let candidate = match raw.as_bytes().get(10) {
    Some(b'T' | b' ') => &raw[..10],
    _ => raw.as_str(),
  };
  DATE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
    .map(Some)
    .ok_or_else(|| FieldError::new(field, format!("unrecognised date {raw:?}")))
}

fn number(value: Option<&Value>, field: &str) -> Result<Option<f64>, FieldError> {
  match value {
    None | Some(Value::Null) => Ok(None),
    Some(Value::Number(n)) => Ok(n.as_f64()),
    Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
    Some(Value::String(s)) => s
      .trim()
      .parse::<f64>()
      .map(Some)
      .map_err(|_| FieldError::new(field, format!("not a number: {s:?}"))),
    Some(other) => Err(FieldError::new(
      field,
      format!("expected number, found {}", json_kind(other)),
    )),
  }
}

fn flag(value: Option<&Value>, field: &str) -> Result<Option<bool>, FieldError> {
  match value {
    None | Some(Value::Null) => Ok(None),
    Some(Value::Bool(b)) => Ok(Some(*b)),
    Some(Value::Number(n)) => Ok(Some(n.as_f64().is_some_and(|n| n != 0.0))),
    Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
      "" => Ok(None),
      "true" | "yes" | "y" | "1" => Ok(Some(true)),
      "false" | "no" | "n" | "0" => Ok(Some(false)),
      _ => Err(FieldError::new(field, format!("not a boolean: {s:?}"))),
    },
    Some(other) => Err(FieldError::new(
      field,
      format!("expected boolean, found {}", json_kind(other)),
    )),
  }
}

fn capacity(value: Option<&Value>, field: &str) -> Result<Option<Capacity>, FieldError> {
  match value {
    None | Some(Value::Null) => Ok(None),
    Some(Value::Object(map)) if map.is_empty() => Ok(None),
    Some(Value::Object(map)) => Ok(Some(Capacity::Structured(map.clone()))),
    Some(Value::String(_) | Value::Number(_)) => {
      Ok(text(value, field)?.map(Capacity::Text))
    }
    Some(other) => Err(FieldError::new(
      field,
      format!("expected object or text, found {}", json_kind(other)),
    )),
  }
}

fn external_id(value: Option<&Value>) -> Result<Option<String>, FieldError> {
  match value {
    Some(Value::Number(n)) if !n.is_i64() && !n.is_u64() => {
      Err(FieldError::new("id", "expected string or integer"))
    }
    _ => text(value, "id"),
  }
}

fn coordinate(
  value: Option<&Value>,
  field: &str,
  limit: f64,
) -> Result<Option<f64>, FieldError> {
  match number(value, field)? {
    Some(v) if !(-limit..=limit).contains(&v) => {
      Err(FieldError::new(field, format!("{v} is out of range")))
    }
    other => Ok(other),
  }
}

/// Collects malformed optional fields while a record is mapped.
struct FieldReader {
  position:  usize,
  malformed: Vec<FieldError>,
}

impl FieldReader {
  fn take<T: Default>(&mut self, result: Result<T, FieldError>) -> T {
    result.unwrap_or_else(|e| {
      warn!(position = self.position, field = %e.field, reason = %e.reason, "treating malformed field as absent");
      self.malformed.push(e);
      T::default()
    })
  }
}

fn nested<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
  fields.get(key).and_then(Value::as_object)
}

// ─── Records and drafts ──────────────────────────────────────────────────────

/// One object from a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
  /// Index in document order.
  pub position: usize,
  /// State bucket for `organizations_by_state` documents.
  pub bucket:   Option<String>,
  pub fields:   Map<String, Value>,
}

/// A canonical record before identity has been assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
  pub external_id:         Option<String>,
  pub name:                String,
  pub address:             Address,
  pub coordinates:         Option<Coordinates>,
  pub phone:               Option<String>,
  pub email:               Option<String>,
  pub website:             Option<String>,
  pub description:         Option<String>,
  pub services:            Vec<String>,
  pub certifications:      Vec<String>,
  pub funding_sources:     Vec<String>,
  pub capacity:            Option<Capacity>,
  pub facility_type:       Option<String>,
  pub level_of_care:       Option<String>,
  pub demographics:        Option<Value>,
  pub operator:            Option<String>,
  pub certification_type:  Option<String>,
  pub certification_level: Option<String>,
  pub is_narr_certified:   bool,
  pub extraction_date:     Option<NaiveDate>,
  /// The source object, kept for the lineage payload.
  pub raw:                 Value,
  pub malformed:           Vec<FieldError>,
}

impl RawRecord {
  /// Map this record onto the canonical field set.
  ///
  /// Only a missing name is an error; unusable optional fields are recorded
  /// in [`Draft::malformed`] and treated as absent.
  pub fn to_draft(&self, parser: &AddressParser) -> Result<Draft> {
    let f = &self.fields;
    let mut r = FieldReader { position: self.position, malformed: Vec::new() };

    let mut name = None;
    for key in ["name", "organization_name", "facility_name"] {
      if let Some(n) = r.take(text(f.get(key), key)) {
        name = Some(n);
        break;
      }
    }
    let name = name.ok_or(Error::MissingName { position: self.position })?;

    let address = self.address(parser, &mut r);
    let coordinates = Self::coordinates(f, &mut r);

    let contact = nested(f, "contact");
    let mut contact_field = |key: &str| {
      let flat = r.take(text(f.get(key), key));
      flat.or_else(|| r.take(text(contact.and_then(|c| c.get(key)), key)))
    };
    let phone = contact_field("phone");
    let email = contact_field("email");
    let website = contact_field("website");

    let extraction_date = match r.take(date(f.get("extraction_date"), "extraction_date")) {
      Some(d) => Some(d),
      None => r.take(date(
        nested(f, "data_source").and_then(|d| d.get("extraction_date")),
        "data_source.extraction_date",
      )),
    };

    let demographics = match f.get("demographics") {
      None | Some(Value::Null) => None,
      Some(Value::Object(m)) if m.is_empty() => None,
      Some(v) => Some(v.clone()),
    };

    Ok(Draft {
      external_id: r.take(external_id(f.get("id"))),
      name,
      address,
      coordinates,
      phone,
      email,
      website,
      description: r.take(text(f.get("description"), "description")),
      services: r.take(list(f.get("services"), "services")),
      certifications: r.take(list(f.get("certifications"), "certifications")),
      funding_sources: r.take(list(f.get("funding_sources"), "funding_sources")),
      capacity: r.take(capacity(f.get("capacity"), "capacity")),
      facility_type: r.take(text(f.get("facility_type"), "facility_type")),
      level_of_care: r.take(text(f.get("level_of_care"), "level_of_care")),
      demographics,
      operator: r.take(text(f.get("operator"), "operator")),
      certification_type: r.take(text(f.get("certification_type"), "certification_type")),
      certification_level: r.take(text(f.get("certification_level"), "certification_level")),
      is_narr_certified: r
        .take(flag(f.get("is_narr_certified"), "is_narr_certified"))
        .unwrap_or(false),
      extraction_date,
      raw: Value::Object(self.fields.clone()),
      malformed: r.malformed,
    })
  }

  fn address(&self, parser: &AddressParser, r: &mut FieldReader) -> Address {
    let f = &self.fields;
    let mut address = match nested(f, "address") {
      Some(a) => Address {
        street: first_text(a, &["street", "address_line1", "street_address"], r),
        city:   r.take(text(a.get("city"), "address.city")),
        state:  r.take(text(a.get("state"), "address.state")),
        zip:    first_text(a, &["zip", "zip_code", "postal_code"], r),
      },
      None => Address {
        street: first_text(f, &["address", "address_line1", "street"], r),
        city:   r.take(text(f.get("city"), "city")),
        state:  r.take(text(f.get("state"), "state")),
        zip:    first_text(f, &["zip", "zip_code", "postal_code"], r),
      },
    };

    // A one-line street may carry the rest of the address.
    if let Some(street) = &address.street
      && (address.city.is_none() || address.state.is_none() || address.zip.is_none())
    {
      let parsed = parser.parse(street);
      if parsed.state.is_some() {
        address.street = parsed.street;
        address.city = address.city.or(parsed.city);
        address.state = address.state.or(parsed.state);
      }
      address.zip = address.zip.or(parsed.zip);
    }

    let fallback = r
      .take(text(f.get("extracted_state"), "extracted_state"))
      .or_else(|| self.bucket.clone());
    address.state = address
      .state
      .or(fallback)
      .and_then(|s| normalize_state(&s));
    address
  }

  fn coordinates(f: &Map<String, Value>, r: &mut FieldReader) -> Option<Coordinates> {
    let source = nested(f, "coordinates").unwrap_or(f);
    let latitude = r.take(coordinate(source.get("latitude"), "latitude", 90.0));
    let longitude = r.take(coordinate(source.get("longitude"), "longitude", 180.0));
    match (latitude, longitude) {
      (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
      _ => None,
    }
  }
}

fn first_text(
  fields: &Map<String, Value>,
  keys: &[&str],
  r: &mut FieldReader,
) -> Option<String> {
  keys.iter().find_map(|key| r.take(text(fields.get(*key), key)))
}

impl Draft {
  /// Fill in what a source category implies but its feed omits.
  pub fn apply_category_defaults(&mut self, category: SourceCategory) {
    if category == SourceCategory::OxfordHouses {
      insert_sorted(
        &mut self.certifications,
        "Oxford House Charter",
      );
      self.operator.get_or_insert_with(|| "Oxford House Inc.".to_owned());
    }
  }

  /// Build the canonical record. Type, certification and quality fields
  /// stay empty until the classifier and scorer run.
  pub fn into_organization(
    self,
    id: String,
    source_id: &str,
    run_date: NaiveDate,
  ) -> Organization {
    let has_complete_address = self.address.is_complete();
    // A source-supplied label is kept as a certification entry.
    let mut certifications = self.certifications;
    if let Some(label) = &self.certification_type {
      insert_sorted(&mut certifications, label);
    }
    let mut org = Organization {
      id,
      name: self.name,
      organization_type: String::new(),
      address: self.address,
      coordinates: self.coordinates,
      phone: self.phone,
      email: self.email,
      website: self.website,
      description: self.description,
      services: self.services,
      certifications,
      capacity: self.capacity,
      facility_type: self.facility_type,
      level_of_care: self.level_of_care,
      demographics: self.demographics,
      operator: self.operator,
      funding_sources: self.funding_sources,
      data_source: vec![source_id.to_owned()],
      extraction_date: self.extraction_date.unwrap_or(run_date),
      is_narr_certified: self.is_narr_certified,
      certification_type: None,
      certification_type_id: None,
      certification_authority_id: None,
      certification_level: self.certification_level,
      data_quality_score: 0.0,
      has_complete_address,
      has_contact_info: false,
    };
    org.has_contact_info = org.has_contact();
    org
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn parser() -> AddressParser { AddressParser::new().unwrap() }

  fn record(fields: Value) -> RawRecord {
    RawRecord {
      position: 0,
      bucket:   None,
      fields:   fields.as_object().unwrap().clone(),
    }
  }

  #[test]
  fn by_state_wins_over_list_keys() {
    let doc = json!({
      "facilities": [{"name": "ignored"}],
      "organizations_by_state": {"Texas": [{"name": "A"}], "Ohio": [{"name": "B"}]},
    });
    let batch = detect_shape(doc).unwrap();
    assert_eq!(batch.shape_name(), "organizations_by_state");
    let records = batch.into_records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|r| r.bucket.as_deref() == Some("Texas")));
  }

  #[test]
  fn list_key_priority() {
    let doc = json!({"houses": [{"name": "H"}], "all_facilities": [{"name": "F"}]});
    assert_eq!(detect_shape(doc).unwrap().shape_name(), "all_facilities");

    let doc = json!([{"name": "L"}]);
    assert_eq!(detect_shape(doc).unwrap().shape_name(), "list");
  }

  #[test]
  fn unknown_shape_is_an_error_but_normalize_is_soft() {
    let doc = json!({"metadata": {"count": 0}});
    assert!(matches!(
      detect_shape(doc.clone()),
      Err(Error::UnknownShape { .. })
    ));
    assert!(normalize(doc, "test").is_empty());
  }

  #[test]
  fn non_object_elements_are_skipped() {
    let records = detect_shape(json!({"facilities": [1, {"name": "A"}, "x"]}))
      .unwrap()
      .into_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].position, 1);
  }

  #[test]
  fn name_fallbacks_and_missing_name() {
    let d = record(json!({"name": " ", "facility_name": "Sunrise"}))
      .to_draft(&parser())
      .unwrap();
    assert_eq!(d.name, "Sunrise");

    let err = record(json!({"organization_name": ""}))
      .to_draft(&parser())
      .unwrap_err();
    assert!(matches!(err, Error::MissingName { position: 0 }));
  }

  #[test]
  fn nested_address_and_contact() {
    let d = record(json!({
      "name": "Serenity House",
      "address": {"street": "1 Oak Ave", "city": "Atlanta", "state": "georgia", "zip": 30301},
      "contact": {"phone": "555-0100"},
      "coordinates": {"latitude": "33.75", "longitude": -84.39},
    }))
    .to_draft(&parser())
    .unwrap();
    assert_eq!(d.address.state.as_deref(), Some("GA"));
    assert_eq!(d.address.zip.as_deref(), Some("30301"));
    assert_eq!(d.phone.as_deref(), Some("555-0100"));
    assert_eq!(d.coordinates.unwrap().latitude, 33.75);
  }

  #[test]
  fn flat_address_with_bucket_state() {
    let mut r = record(json!({
      "name": "Hope House",
      "address": "12 Elm St",
      "city": "Boston",
      "zip_code": "02110",
    }));
    r.bucket = Some("Massachusetts Mash".into());
    let d = r.to_draft(&parser()).unwrap();
    assert_eq!(d.address.street.as_deref(), Some("12 Elm St"));
    assert_eq!(d.address.state.as_deref(), Some("MA"));
    assert_eq!(d.address.zip.as_deref(), Some("02110"));
  }

  #[test]
  fn one_line_address_is_split() {
    let d = record(json!({"name": "X", "address": "12 Elm St, Austin, TX 78701"}))
      .to_draft(&parser())
      .unwrap();
    assert_eq!(d.address.street.as_deref(), Some("12 Elm St"));
    assert_eq!(d.address.city.as_deref(), Some("Austin"));
    assert_eq!(d.address.state.as_deref(), Some("TX"));
  }

  #[test]
  fn malformed_optional_fields_are_recorded() {
    let d = record(json!({
      "name": "X",
      "latitude": 123.0,
      "longitude": 10.0,
      "extraction_date": "yesterday",
      "services": {"a": 1},
      "phone": ["555"],
    }))
    .to_draft(&parser())
    .unwrap();
    assert!(d.coordinates.is_none());
    assert!(d.extraction_date.is_none());
    assert!(d.services.is_empty());
    assert!(d.phone.is_none());
    assert_eq!(d.malformed.len(), 4);
  }

  #[test]
  fn dates_lists_and_capacity() {
    let d = record(json!({
      "name": "X",
      "data_source": {"extraction_date": "07/30/2025"},
      "services": "Peer Support; MAT, Peer Support",
      "capacity": 12,
    }))
    .to_draft(&parser())
    .unwrap();
    assert_eq!(d.extraction_date, NaiveDate::from_ymd_opt(2025, 7, 30));
    assert_eq!(d.services, vec!["MAT", "Peer Support"]);
    assert_eq!(d.capacity, Some(Capacity::Text("12".into())));

    let d = record(json!({"name": "X", "extraction_date": "2025-07-30T10:00:00"}))
      .to_draft(&parser())
      .unwrap();
    assert_eq!(d.extraction_date, NaiveDate::from_ymd_opt(2025, 7, 30));
  }

  #[test]
  fn oxford_defaults_and_organization() {
    let mut d = record(json!({"name": "Oxford House Elm", "id": 42}))
      .to_draft(&parser())
      .unwrap();
    assert_eq!(d.external_id.as_deref(), Some("42"));
    d.apply_category_defaults(SourceCategory::OxfordHouses);
    assert_eq!(d.certifications, vec!["Oxford House Charter"]);
    assert_eq!(d.operator.as_deref(), Some("Oxford House Inc."));

    let run_date = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
    let org = d.into_organization("oxford:42".into(), "oxford", run_date);
    assert_eq!(org.extraction_date, run_date);
    assert_eq!(org.data_source, vec!["oxford"]);
    assert!(!org.has_contact_info);
  }
}

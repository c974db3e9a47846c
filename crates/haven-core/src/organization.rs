//! Organization, the canonical unit of the directory.
//!
//! An organization is created the first time a source record fails to match
//! anything already known, and afterwards only ever gains data: merges fill
//! empty fields and union list fields, they never blank out populated ones.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ─── Address ─────────────────────────────────────────────────────────────────

/// A postal address. Every component is optional because sources routinely
/// publish only a city and state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
  pub street: Option<String>,
  pub city:   Option<String>,
  /// Two-letter USPS code when the source value could be recognised.
  pub state:  Option<String>,
  pub zip:    Option<String>,
}

impl Address {
  /// Street, city and state are all present.
  pub fn is_complete(&self) -> bool {
    self.street.is_some() && self.city.is_some() && self.state.is_some()
  }

  /// City and state are present (street may be missing).
  pub fn has_locality(&self) -> bool {
    self.city.is_some() && self.state.is_some()
  }
}

/// WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
  pub latitude:  f64,
  pub longitude: f64,
}

// ─── Capacity ────────────────────────────────────────────────────────────────

/// Bed/house capacity. Some feeds publish structured counts
/// (`{"total_beds": 12, "mens_beds": 8}`), others a free-text note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Capacity {
  Structured(serde_json::Map<String, serde_json::Value>),
  Text(String),
}

// ─── Organization ────────────────────────────────────────────────────────────

/// The canonical, deduplicated record for one real-world organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
  /// Stable identity; never changes once assigned.
  pub id:                         String,
  pub name:                       String,
  /// Current leaf type from the taxonomy.
  pub organization_type:          String,
  pub address:                    Address,
  pub coordinates:                Option<Coordinates>,
  pub phone:                      Option<String>,
  pub email:                      Option<String>,
  pub website:                    Option<String>,
  pub description:                Option<String>,
  pub services:                   Vec<String>,
  pub certifications:             Vec<String>,
  pub capacity:                   Option<Capacity>,
  pub facility_type:              Option<String>,
  pub level_of_care:              Option<String>,
  pub demographics:               Option<serde_json::Value>,
  pub operator:                   Option<String>,
  pub funding_sources:            Vec<String>,
  /// Every source that has contributed to this record.
  pub data_source:                Vec<String>,
  pub extraction_date:            NaiveDate,
  pub is_narr_certified:          bool,
  /// Classifier label, e.g. `narr_certified`, `oxford_house`, `unknown`.
  pub certification_type:         Option<String>,
  /// Matching [`crate::certification::CertificationType`], when one applies.
  pub certification_type_id:      Option<String>,
  pub certification_authority_id: Option<String>,
  pub certification_level:        Option<String>,
  pub data_quality_score:         f64,
  pub has_complete_address:       bool,
  pub has_contact_info:           bool,
}

impl Organization {
  /// Phone, email or website is present.
  pub fn has_contact(&self) -> bool {
    self.phone.is_some() || self.email.is_some() || self.website.is_some()
  }
}

/// Insert `value` into a sorted, de-duplicated list, keeping it sorted.
pub fn insert_sorted(list: &mut Vec<String>, value: &str) {
  if let Err(pos) = list.binary_search_by(|item| item.as_str().cmp(value)) {
    list.insert(pos, value.to_owned());
  }
}

/// Sort and de-duplicate a list field into its canonical set form.
pub fn canonical_set(mut list: Vec<String>) -> Vec<String> {
  list.retain(|s| !s.trim().is_empty());
  for s in list.iter_mut() {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
      *s = trimmed.to_owned();
    }
  }
  list.sort();
  list.dedup();
  list
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn address_completeness() {
    let mut a = Address {
      street: None,
      city:   Some("Austin".into()),
      state:  Some("TX".into()),
      zip:    None,
    };
    assert!(a.has_locality());
    assert!(!a.is_complete());

    a.street = Some("12 Elm St".into());
    assert!(a.is_complete());
  }

  #[test]
  fn canonical_set_sorts_trims_and_dedups() {
    let set = canonical_set(vec![
      "Peer Support".into(),
      " MAT ".into(),
      "".into(),
      "MAT".into(),
    ]);
    assert_eq!(set, vec!["MAT".to_string(), "Peer Support".to_string()]);
  }

  #[test]
  fn insert_sorted_keeps_order_and_skips_duplicates() {
    let mut list = vec!["a".to_string(), "c".to_string()];
    insert_sorted(&mut list, "b");
    insert_sorted(&mut list, "c");
    assert_eq!(list, vec!["a", "b", "c"]);
  }

  #[test]
  fn capacity_deserializes_either_shape() {
    let s: Capacity = serde_json::from_str(r#"{"total_beds": 12}"#).unwrap();
    assert!(matches!(s, Capacity::Structured(_)));
    let t: Capacity = serde_json::from_str(r#""8 beds""#).unwrap();
    assert_eq!(t, Capacity::Text("8 beds".into()));
  }
}

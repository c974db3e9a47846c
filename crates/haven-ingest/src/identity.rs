//! Identity resolution and deduplication.
//!
//! Every draft resolves to exactly one organization id: an existing one when
//! the draft matches something already known, otherwise a fresh candidate.

use std::collections::HashMap;

use haven_core::organization::{Organization, canonical_set};
use sha2::{Digest, Sha256};

use crate::normalize::Draft;

// ─── Ids ─────────────────────────────────────────────────────────────────────

/// Deterministic id for a record without a stable external id:
/// `GEN_` + the first 16 upper-hex digits of SHA-256 over
/// `lowercase(name|street)`.
pub fn derive_id(name: &str, street: Option<&str>) -> String {
  let content = format!("{}|{}", name, street.unwrap_or("")).to_lowercase();
  let digest = hex::encode_upper(Sha256::digest(content.as_bytes()));
  format!("GEN_{}", &digest[..16])
}

/// The id a draft would receive if it matches nothing. External ids are
/// namespaced by source so feeds cannot collide.
pub fn candidate_id(draft: &Draft, source_id: &str) -> String {
  match &draft.external_id {
    Some(external) => format!("{source_id}:{external}"),
    None => derive_id(&draft.name, draft.address.street.as_deref()),
  }
}

/// Lowercase, drop punctuation, treat separators as spaces and collapse
/// whitespace. `"Hope House - Austin"` becomes `"hope house austin"`.
pub fn normalize_name(name: &str) -> String {
  let mapped: String = name
    .chars()
    .filter_map(|c| {
      if c.is_alphanumeric() {
        Some(c.to_lowercase().next().unwrap_or(c))
      } else if c.is_whitespace() || matches!(c, '-' | '_' | '/' | '&' | '+') {
        Some(' ')
      } else {
        None
      }
    })
    .collect();
  mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ─── Index ───────────────────────────────────────────────────────────────────

/// Where an index entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
  /// Already in the store before this run.
  Persisted,
  /// Created earlier in this run.
  Staged,
}

#[derive(Debug, Clone)]
struct Entry {
  id:     String,
  name:   String,
  state:  Option<String>,
  origin: Origin,
}

/// Known organizations keyed for duplicate detection, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
  entries: Vec<Entry>,
  by_id:   HashMap<String, usize>,
}

impl DedupIndex {
  pub fn new() -> Self { Self::default() }

  /// Seed the index with the store's contents.
  pub fn from_persisted<'a>(orgs: impl IntoIterator<Item = &'a Organization>) -> Self {
    let mut index = Self::new();
    for org in orgs {
      index.insert(&org.id, &org.name, org.address.state.as_deref(), Origin::Persisted);
    }
    index
  }

  /// Add an entry. An id that is already present keeps its position and
  /// origin.
  pub fn insert(&mut self, id: &str, name: &str, state: Option<&str>, origin: Origin) {
    if self.by_id.contains_key(id) {
      return;
    }
    self.by_id.insert(id.to_owned(), self.entries.len());
    self.entries.push(Entry {
      id: id.to_owned(),
      name: normalize_name(name),
      state: state.map(str::to_owned),
      origin,
    });
  }

  /// Replace a staged entry's id and name in place, keeping its position.
  pub fn rekey(&mut self, old_id: &str, new_id: &str, name: &str) {
    if let Some(pos) = self.by_id.remove(old_id) {
      let entry = &mut self.entries[pos];
      entry.id = new_id.to_owned();
      entry.name = normalize_name(name);
      self.by_id.insert(new_id.to_owned(), pos);
    }
  }

  pub fn origin(&self, id: &str) -> Option<Origin> {
    self.by_id.get(id).map(|&i| self.entries[i].origin)
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// First entry that looks like the same organization.
  ///
  /// Names are compared after [`normalize_name`] and only within the same
  /// state. With a known state either name containing the other is a
  /// match; with no state only identical names match. Names that normalize
  /// to nothing never match in either direction.
  pub fn find_duplicate(&self, name: &str, state: Option<&str>) -> Option<(&str, Origin)> {
    let wanted = normalize_name(name);
    if wanted.is_empty() {
      return None;
    }
    self
      .entries
      .iter()
      .filter(|e| !e.name.is_empty() && e.state.as_deref() == state)
      .find(|e| match state {
        Some(_) => e.name.contains(&wanted) || wanted.contains(&e.name),
        None => e.name == wanted,
      })
      .map(|e| (e.id.as_str(), e.origin))
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// The existing entry a draft matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
  pub id:     String,
  pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  /// The id the merged record carries from now on.
  pub organization_id: String,
  /// The id the draft would have had on its own.
  pub candidate_id:    String,
  /// Nothing matched; a new organization is created.
  pub is_new:          bool,
  pub matched:         Option<Match>,
}

impl Resolution {
  /// A staged record was matched and must move to `organization_id`.
  pub fn renames_staged(&self) -> Option<&str> {
    self
      .matched
      .as_ref()
      .filter(|m| m.origin == Origin::Staged && m.id != self.organization_id)
      .map(|m| m.id.as_str())
  }
}

/// Decide which organization a draft belongs to.
///
/// A persisted match keeps its id. Between two records staged in the same
/// run the lexicographically smaller id survives, so the outcome does not
/// depend on processing order.
pub fn resolve_identity(draft: &Draft, source_id: &str, index: &DedupIndex) -> Resolution {
  let candidate = candidate_id(draft, source_id);

  let matched = match index.origin(&candidate) {
    Some(origin) => Some(Match { id: candidate.clone(), origin }),
    None => index
      .find_duplicate(&draft.name, draft.address.state.as_deref())
      .map(|(id, origin)| Match { id: id.to_owned(), origin }),
  };

  let organization_id = match &matched {
    None => candidate.clone(),
    Some(m) if m.origin == Origin::Persisted => m.id.clone(),
    Some(m) => m.id.clone().min(candidate.clone()),
  };

  Resolution {
    organization_id,
    candidate_id: candidate,
    is_new: matched.is_none(),
    matched,
  }
}

// ─── Merge ───────────────────────────────────────────────────────────────────

fn fill<T>(slot: &mut Option<T>, incoming: Option<T>) {
  if slot.is_none() {
    *slot = incoming;
  }
}

fn union(slot: &mut Vec<String>, incoming: Vec<String>) {
  let mut all = std::mem::take(slot);
  all.extend(incoming);
  *slot = canonical_set(all);
}

/// Fold `incoming` into `existing`.
///
/// `existing` is authoritative: its populated scalars are kept and only
/// empty ones are filled. List fields are unioned and the earliest
/// extraction date wins. Classification and quality fields are left for
/// the classifier and scorer to recompute.
pub fn merge(existing: &mut Organization, incoming: Organization) {
  let Organization {
    address,
    coordinates,
    phone,
    email,
    website,
    description,
    services,
    certifications,
    capacity,
    facility_type,
    level_of_care,
    demographics,
    operator,
    funding_sources,
    data_source,
    extraction_date,
    is_narr_certified,
    certification_level,
    ..
  } = incoming;

  fill(&mut existing.address.street, address.street);
  fill(&mut existing.address.city, address.city);
  fill(&mut existing.address.state, address.state);
  fill(&mut existing.address.zip, address.zip);
  fill(&mut existing.coordinates, coordinates);
  fill(&mut existing.phone, phone);
  fill(&mut existing.email, email);
  fill(&mut existing.website, website);
  fill(&mut existing.description, description);
  fill(&mut existing.capacity, capacity);
  fill(&mut existing.facility_type, facility_type);
  fill(&mut existing.level_of_care, level_of_care);
  fill(&mut existing.demographics, demographics);
  fill(&mut existing.operator, operator);
  fill(&mut existing.certification_level, certification_level);

  union(&mut existing.services, services);
  union(&mut existing.certifications, certifications);
  union(&mut existing.funding_sources, funding_sources);
  union(&mut existing.data_source, data_source);

  existing.extraction_date = existing.extraction_date.min(extraction_date);
  existing.is_narr_certified |= is_narr_certified;
  existing.has_complete_address = existing.address.is_complete();
  existing.has_contact_info = existing.has_contact();
}

/// Merge two records staged in the same run. The one with the smaller id
/// is authoritative and its id is kept.
pub fn merge_staged(a: Organization, b: Organization) -> Organization {
  let (mut survivor, other) = if a.id <= b.id { (a, b) } else { (b, a) };
  merge(&mut survivor, other);
  survivor
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use haven_core::organization::Address;

  use super::*;

  fn org(id: &str, name: &str, state: Option<&str>) -> Organization {
    Organization {
      id: id.into(),
      name: name.into(),
      organization_type: "sober_living".into(),
      address: Address {
        street: Some("12 Elm St".into()),
        city:   Some("Austin".into()),
        state:  state.map(Into::into),
        zip:    None,
      },
      coordinates: None,
      phone: None,
      email: None,
      website: None,
      description: None,
      services: vec![],
      certifications: vec![],
      capacity: None,
      facility_type: None,
      level_of_care: None,
      demographics: None,
      operator: None,
      funding_sources: vec![],
      data_source: vec!["src".into()],
      extraction_date: NaiveDate::from_ymd_opt(2025, 7, 30).unwrap(),
      is_narr_certified: false,
      certification_type: None,
      certification_type_id: None,
      certification_authority_id: None,
      certification_level: None,
      data_quality_score: 0.0,
      has_complete_address: true,
      has_contact_info: false,
    }
  }

  fn draft(name: &str, state: Option<&str>, external_id: Option<&str>) -> Draft {
    Draft {
      external_id:         external_id.map(Into::into),
      name:                name.into(),
      address:             Address {
        street: Some("12 Elm St".into()),
        city:   None,
        state:  state.map(Into::into),
        zip:    None,
      },
      coordinates:         None,
      phone:               None,
      email:               None,
      website:             None,
      description:         None,
      services:            vec![],
      certifications:      vec![],
      funding_sources:     vec![],
      capacity:            None,
      facility_type:       None,
      level_of_care:       None,
      demographics:        None,
      operator:            None,
      certification_type:  None,
      certification_level: None,
      is_narr_certified:   false,
      extraction_date:     None,
      raw:                 serde_json::Value::Null,
      malformed:           vec![],
    }
  }

  #[test]
  fn derived_ids_are_stable_and_case_insensitive() {
    let a = derive_id("Hope House", Some("12 Elm St"));
    let b = derive_id("HOPE HOUSE", Some("12 elm st"));
    assert_eq!(a, b);
    assert!(a.starts_with("GEN_"));
    assert_eq!(a.len(), 20);
    assert_ne!(a, derive_id("Hope House", None));
  }

  #[test]
  fn external_ids_are_namespaced() {
    let d = draft("X", None, Some("17"));
    assert_eq!(candidate_id(&d, "garr_directory"), "garr_directory:17");
  }

  #[test]
  fn name_normalisation() {
    assert_eq!(normalize_name("Hope House - Austin"), "hope house austin");
    assert_eq!(normalize_name("St. Mary's  Recovery, Inc."), "st marys recovery inc");
  }

  #[test]
  fn containment_matches_within_state_only() {
    let mut index = DedupIndex::new();
    index.insert("A", "Hope House", Some("TX"), Origin::Persisted);

    assert_eq!(
      index.find_duplicate("Hope House - Austin", Some("TX")),
      Some(("A", Origin::Persisted))
    );
    assert_eq!(index.find_duplicate("Hope House - Austin", Some("OK")), None);
  }

  #[test]
  fn unknown_state_requires_exact_name() {
    let mut index = DedupIndex::new();
    index.insert("A", "Hope House", None, Origin::Staged);
    assert!(index.find_duplicate("hope house", None).is_some());
    assert!(index.find_duplicate("Hope House Austin", None).is_none());
  }

  #[test]
  fn punctuation_only_names_match_nothing() {
    let mut index = DedupIndex::new();
    index.insert("A", "***", Some("TX"), Origin::Staged);
    index.insert("B", "...", None, Origin::Persisted);

    assert_eq!(index.find_duplicate("Hope House", Some("TX")), None);
    assert_eq!(index.find_duplicate("--", Some("TX")), None);
    assert_eq!(index.find_duplicate("Hope House", None), None);
    assert_eq!(index.origin("A"), Some(Origin::Staged));
  }

  #[test]
  fn persisted_match_keeps_its_id() {
    let mut index = DedupIndex::new();
    index.insert("zzz", "Hope House", Some("TX"), Origin::Persisted);
    let r = resolve_identity(&draft("Hope House", Some("TX"), Some("1")), "s", &index);
    assert_eq!(r.organization_id, "zzz");
    assert!(!r.is_new);
    assert_eq!(r.renames_staged(), None);
  }

  #[test]
  fn staged_match_takes_smaller_id() {
    let mut index = DedupIndex::new();
    index.insert("s:9", "Hope House", Some("TX"), Origin::Staged);
    let r = resolve_identity(&draft("Hope House", Some("TX"), Some("1")), "s", &index);
    assert_eq!(r.organization_id, "s:1");
    assert_eq!(r.renames_staged(), Some("s:9"));

    index.rekey("s:9", "s:1", "Hope House");
    assert_eq!(index.origin("s:1"), Some(Origin::Staged));
    assert_eq!(index.origin("s:9"), None);
  }

  #[test]
  fn same_candidate_id_matches_directly() {
    let mut index = DedupIndex::new();
    index.insert("s:1", "Completely Different", Some("TX"), Origin::Persisted);
    let r = resolve_identity(&draft("Hope House", Some("TX"), Some("1")), "s", &index);
    assert_eq!(r.organization_id, "s:1");
  }

  #[test]
  fn merge_fills_without_overwriting() {
    let mut existing = org("A", "Hope House", Some("TX"));
    existing.email = Some("a@example.org".into());
    existing.services = vec!["MAT".into()];

    let mut incoming = org("B", "Hope House - Austin", Some("TX"));
    incoming.email = Some("b@example.org".into());
    incoming.phone = Some("555-0100".into());
    incoming.services = vec!["Peer Support".into(), "MAT".into()];
    incoming.data_source = vec!["other".into()];
    incoming.extraction_date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

    merge(&mut existing, incoming);
    assert_eq!(existing.id, "A");
    assert_eq!(existing.name, "Hope House");
    assert_eq!(existing.email.as_deref(), Some("a@example.org"));
    assert_eq!(existing.phone.as_deref(), Some("555-0100"));
    assert_eq!(existing.services, vec!["MAT", "Peer Support"]);
    assert_eq!(existing.data_source, vec!["other", "src"]);
    assert_eq!(existing.extraction_date, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    assert!(existing.has_contact_info);
  }

  #[test]
  fn staged_merge_is_order_independent() {
    let mut a = org("GEN_A", "Hope House", Some("TX"));
    a.phone = Some("555-0100".into());
    let mut b = org("GEN_B", "Hope House - Austin", Some("TX"));
    b.email = Some("b@example.org".into());
    b.phone = Some("555-9999".into());

    let ab = merge_staged(a.clone(), b.clone());
    let ba = merge_staged(b, a);
    assert_eq!(ab, ba);
    assert_eq!(ab.id, "GEN_A");
    assert_eq!(ab.phone.as_deref(), Some("555-0100"));
  }
}

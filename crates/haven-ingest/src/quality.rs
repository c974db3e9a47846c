//! Data-quality scoring.

use haven_core::organization::Organization;

/// Number of equally weighted factor groups.
const FACTORS: f64 = 5.0;

/// Completeness score in `[0, 1]`.
///
/// Factor groups: name; address (complete = 1, city and state only = 0.5);
/// contact (phone, email and website each a third); services; coordinates.
/// Adding a field never lowers the score.
pub fn score(org: &Organization) -> f64 {
  let name = if org.name.trim().is_empty() { 0.0 } else { 1.0 };

  let address = if org.address.is_complete() {
    1.0
  } else if org.address.has_locality() {
    0.5
  } else {
    0.0
  };

  let contact = [&org.phone, &org.email, &org.website]
    .iter()
    .filter(|c| c.is_some())
    .count() as f64
    / 3.0;

  let services = if org.services.is_empty() { 0.0 } else { 1.0 };
  let coordinates = if org.coordinates.is_some() { 1.0 } else { 0.0 };

  (name + address + contact + services + coordinates) / FACTORS
}

/// Set the score and the derived completeness flags.
pub fn apply(org: &mut Organization) {
  org.data_quality_score = score(org);
  org.has_complete_address = org.address.is_complete();
  org.has_contact_info = org.has_contact();
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use haven_core::organization::{Address, Coordinates};

  use super::*;

  fn bare() -> Organization {
    Organization {
      id: "X".into(),
      name: "Hope House".into(),
      organization_type: "sober_living".into(),
      address: Address::default(),
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
      data_source: vec![],
      extraction_date: NaiveDate::from_ymd_opt(2025, 7, 30).unwrap(),
      is_narr_certified: false,
      certification_type: None,
      certification_type_id: None,
      certification_authority_id: None,
      certification_level: None,
      data_quality_score: 0.0,
      has_complete_address: false,
      has_contact_info: false,
    }
  }

  #[test]
  fn name_only_scores_one_fifth() {
    assert!((score(&bare()) - 0.2).abs() < 1e-9);
  }

  #[test]
  fn fully_populated_scores_one() {
    let mut o = bare();
    o.address = Address {
      street: Some("12 Elm St".into()),
      city:   Some("Austin".into()),
      state:  Some("TX".into()),
      zip:    None,
    };
    o.phone = Some("555".into());
    o.email = Some("a@b.org".into());
    o.website = Some("https://b.org".into());
    o.services = vec!["MAT".into()];
    o.coordinates = Some(Coordinates { latitude: 30.0, longitude: -97.0 });
    assert!((score(&o) - 1.0).abs() < 1e-9);

    apply(&mut o);
    assert!(o.has_complete_address);
    assert!(o.has_contact_info);
  }

  #[test]
  fn adding_fields_is_monotonic() {
    let mut o = bare();
    let mut previous = score(&o);

    let steps: Vec<Box<dyn Fn(&mut Organization)>> = vec![
      Box::new(|o: &mut Organization| o.address.city = Some("Austin".into())),
      Box::new(|o: &mut Organization| o.address.state = Some("TX".into())),
      Box::new(|o: &mut Organization| o.address.street = Some("12 Elm St".into())),
      Box::new(|o: &mut Organization| o.phone = Some("555".into())),
      Box::new(|o: &mut Organization| o.email = Some("a@b.org".into())),
      Box::new(|o: &mut Organization| o.services = vec!["MAT".into()]),
      Box::new(|o: &mut Organization| {
        o.coordinates = Some(Coordinates { latitude: 1.0, longitude: 1.0 })
      }),
      Box::new(|o: &mut Organization| o.website = Some("https://b.org".into())),
    ];
    for step in steps {
      step(&mut o);
      let next = score(&o);
      assert!(next >= previous);
      previous = next;
    }
    assert!((previous - 1.0).abs() < 1e-9);
  }
}

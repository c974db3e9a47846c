//! Certification authorities and the certificate classes they grant.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, taxonomy::Taxonomy};

/// An issuing body such as NARR, a NARR state affiliate, or CARF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationAuthority {
  pub authority_id:        String,
  pub authority_name:      String,
  /// `nonprofit` or `government`.
  pub authority_type:      String,
  /// `national`, `state`, `federal` or `international`.
  pub jurisdiction_level:  String,
  pub jurisdiction_states: Vec<String>,
  pub website:             Option<String>,
  /// Name of the body that accredits this authority, e.g. `NARR`.
  pub accreditation_body:  Option<String>,
  pub is_narr_affiliate:   bool,
}

/// A certificate class granted by an authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationType {
  pub cert_type_id:          String,
  pub authority_id:          String,
  pub cert_type_name:        String,
  /// Roman numeral level for NARR certificates.
  pub certification_level:   Option<String>,
  /// Taxonomy types this certificate can be held by.
  pub applies_to_org_types:  Vec<String>,
  pub renewal_period_months: Option<u32>,
}

/// Authorities and certificate types, validated against each other.
#[derive(Debug, Clone)]
pub struct CertificationRegistry {
  authorities: Vec<CertificationAuthority>,
  types:       Vec<CertificationType>,
  by_type:     HashMap<String, usize>,
}

impl CertificationRegistry {
  /// Build the registry. Every certificate type must reference an existing
  /// authority and only known taxonomy types.
  pub fn new(
    authorities: Vec<CertificationAuthority>,
    types: Vec<CertificationType>,
    taxonomy: &Taxonomy,
  ) -> Result<Self> {
    for t in &types {
      if !authorities.iter().any(|a| a.authority_id == t.authority_id) {
        return Err(Error::UnknownAuthority {
          cert_type_id: t.cert_type_id.clone(),
          authority_id: t.authority_id.clone(),
        });
      }
      if let Some(missing) = t
        .applies_to_org_types
        .iter()
        .find(|id| taxonomy.get(id).is_none())
      {
        return Err(Error::UnknownAppliesTo {
          cert_type_id: t.cert_type_id.clone(),
          type_id:      missing.clone(),
        });
      }
    }

    let by_type = types
      .iter()
      .enumerate()
      .map(|(i, t)| (t.cert_type_id.clone(), i))
      .collect();

    Ok(Self { authorities, types, by_type })
  }

  pub fn authorities(&self) -> &[CertificationAuthority] { &self.authorities }

  pub fn types(&self) -> &[CertificationType] { &self.types }

  pub fn authority(&self, authority_id: &str) -> Option<&CertificationAuthority> {
    self.authorities.iter().find(|a| a.authority_id == authority_id)
  }

  pub fn cert_type(&self, cert_type_id: &str) -> Option<&CertificationType> {
    self.by_type.get(cert_type_id).map(|&i| &self.types[i])
  }

  /// The NARR certificate type for a Roman-numeral level, e.g. `II`.
  pub fn narr_level(&self, level: &str) -> Option<&CertificationType> {
    self.types.iter().find(|t| {
      t.authority_id == "narr" && t.certification_level.as_deref() == Some(level)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::Catalog;

  #[test]
  fn type_must_reference_existing_authority() {
    let catalog = Catalog::standard().unwrap();
    let bogus = CertificationType {
      cert_type_id:          "ghost".into(),
      authority_id:          "nobody".into(),
      cert_type_name:        "Ghost".into(),
      certification_level:   None,
      applies_to_org_types:  vec![],
      renewal_period_months: None,
    };
    let err = CertificationRegistry::new(
      catalog.certifications().authorities().to_vec(),
      vec![bogus],
      catalog.taxonomy(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownAuthority { .. }));
  }

  #[test]
  fn narr_levels_resolve() {
    let catalog = Catalog::standard().unwrap();
    let registry = catalog.certifications();
    assert_eq!(registry.narr_level("II").unwrap().cert_type_id, "narr_level_2");
    assert!(registry.narr_level("V").is_none());
    assert!(registry.authority("oxford_house_inc").is_some());
  }
}

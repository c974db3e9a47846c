//! The hierarchical organization-type taxonomy.
//!
//! Types form a forest: roots such as `recovery_residence` with leaves such
//! as `narr_certified` beneath them. Every organization is assigned exactly
//! one current leaf.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Nodes ───────────────────────────────────────────────────────────────────

/// One node of the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationType {
  pub type_id:        String,
  pub type_name:      String,
  pub parent_type_id: Option<String>,
  /// Coarse grouping: `recovery`, `treatment` or `support`.
  pub category:       String,
  pub level_of_care:  Option<String>,
  pub description:    String,
}

/// Which master directory a source feeds. Used to pick a leaf type when
/// the classifier finds no certification evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
  NarrResidences,
  OxfordHouses,
  Rccs,
  Rcos,
  TreatmentCenters,
}

impl SourceCategory {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::NarrResidences => "narr_residences",
      Self::OxfordHouses => "oxford_houses",
      Self::Rccs => "rccs",
      Self::Rcos => "rcos",
      Self::TreatmentCenters => "treatment_centers",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "narr_residences" => Ok(Self::NarrResidences),
      "oxford_houses" => Ok(Self::OxfordHouses),
      "rccs" => Ok(Self::Rccs),
      "rcos" => Ok(Self::Rcos),
      "treatment_centers" => Ok(Self::TreatmentCenters),
      other => Err(Error::UnknownDiscriminant {
        kind:  "source category",
        value: other.to_owned(),
      }),
    }
  }
}

// ─── Taxonomy ────────────────────────────────────────────────────────────────

/// A validated taxonomy. Construction fails unless the nodes form a forest.
#[derive(Debug, Clone)]
pub struct Taxonomy {
  types: Vec<OrganizationType>,
  index: HashMap<String, usize>,
}

impl Taxonomy {
  /// Validate `types` and build the taxonomy.
  ///
  /// Rejects duplicate ids, parents that do not exist, and cycles.
  pub fn new(types: Vec<OrganizationType>) -> Result<Self> {
    let mut index = HashMap::with_capacity(types.len());
    for (i, t) in types.iter().enumerate() {
      if index.insert(t.type_id.clone(), i).is_some() {
        return Err(Error::DuplicateType(t.type_id.clone()));
      }
    }

    for t in &types {
      if let Some(parent) = &t.parent_type_id
        && !index.contains_key(parent)
      {
        return Err(Error::UnknownParentType {
          type_id: t.type_id.clone(),
          parent:  parent.clone(),
        });
      }
    }

    let taxonomy = Self { types, index };
    for t in &taxonomy.types {
      taxonomy.check_acyclic(&t.type_id)?;
    }
    Ok(taxonomy)
  }

  fn check_acyclic(&self, start: &str) -> Result<()> {
    let mut seen = HashSet::new();
    let mut cursor = Some(start);
    while let Some(id) = cursor {
      if !seen.insert(id) {
        return Err(Error::TaxonomyCycle(start.to_owned()));
      }
      cursor = self.get(id).and_then(|t| t.parent_type_id.as_deref());
    }
    Ok(())
  }

  pub fn get(&self, type_id: &str) -> Option<&OrganizationType> {
    self.index.get(type_id).map(|&i| &self.types[i])
  }

  pub fn types(&self) -> &[OrganizationType] { &self.types }

  /// Nodes without a parent.
  pub fn roots(&self) -> impl Iterator<Item = &OrganizationType> {
    self.types.iter().filter(|t| t.parent_type_id.is_none())
  }

  /// Direct children of `type_id`.
  pub fn children<'a>(
    &'a self,
    type_id: &'a str,
  ) -> impl Iterator<Item = &'a OrganizationType> + 'a {
    self
      .types
      .iter()
      .filter(move |t| t.parent_type_id.as_deref() == Some(type_id))
  }

  /// A type with no children.
  pub fn is_leaf(&self, type_id: &str) -> bool {
    self.get(type_id).is_some() && self.children(type_id).next().is_none()
  }

  /// `type_id` followed by each ancestor up to its root.
  pub fn lineage(&self, type_id: &str) -> Vec<&OrganizationType> {
    let mut chain = Vec::new();
    let mut cursor = self.get(type_id);
    while let Some(t) = cursor {
      chain.push(t);
      cursor = t.parent_type_id.as_deref().and_then(|p| self.get(p));
    }
    chain
  }

  /// Pick the leaf for an organization with no certification evidence.
  ///
  /// Treatment centers are split by level of care; anything unrecognised
  /// falls back to `outpatient`, the most common treatment leaf.
  pub fn fallback_leaf(
    &self,
    category: SourceCategory,
    level_of_care: Option<&str>,
  ) -> Result<&OrganizationType> {
    let type_id = match category {
      SourceCategory::NarrResidences => "sober_living",
      SourceCategory::OxfordHouses => "oxford_house",
      SourceCategory::Rccs => "rcc",
      SourceCategory::Rcos => "rco",
      SourceCategory::TreatmentCenters => level_of_care
        .and_then(|level| self.leaf_for_level_of_care(level))
        .unwrap_or("outpatient"),
    };
    self
      .get(type_id)
      .ok_or_else(|| Error::UnknownType(type_id.to_owned()))
  }

  fn leaf_for_level_of_care(&self, level: &str) -> Option<&str> {
    let wanted = level.trim().to_lowercase().replace([' ', '-'], "_");
    let wanted = match wanted.as_str() {
      "iop" => "intensive_outpatient".to_owned(),
      "hospital" | "detox" => "inpatient".to_owned(),
      _ => wanted,
    };
    self
      .types
      .iter()
      .find(|t| {
        t.level_of_care.as_deref() == Some(wanted.as_str())
          && self.is_leaf(&t.type_id)
      })
      .map(|t| t.type_id.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::Catalog;

  fn node(id: &str, parent: Option<&str>) -> OrganizationType {
    OrganizationType {
      type_id:        id.into(),
      type_name:      id.into(),
      parent_type_id: parent.map(Into::into),
      category:       "recovery".into(),
      level_of_care:  None,
      description:    String::new(),
    }
  }

  #[test]
  fn rejects_unknown_parent() {
    let err = Taxonomy::new(vec![node("a", Some("missing"))]).unwrap_err();
    assert!(matches!(err, Error::UnknownParentType { .. }));
  }

  #[test]
  fn rejects_cycles() {
    let err = Taxonomy::new(vec![node("a", Some("b")), node("b", Some("a"))])
      .unwrap_err();
    assert!(matches!(err, Error::TaxonomyCycle(_)));
  }

  #[test]
  fn rejects_duplicate_ids() {
    let err = Taxonomy::new(vec![node("a", None), node("a", None)]).unwrap_err();
    assert!(matches!(err, Error::DuplicateType(_)));
  }

  #[test]
  fn standard_taxonomy_leaves_and_roots() {
    let catalog = Catalog::standard().unwrap();
    let taxonomy = catalog.taxonomy();
    assert_eq!(taxonomy.roots().count(), 3);
    assert!(taxonomy.is_leaf("narr_certified"));
    assert!(!taxonomy.is_leaf("recovery_residence"));

    let chain: Vec<_> = taxonomy
      .lineage("oxford_house")
      .into_iter()
      .map(|t| t.type_id.as_str())
      .collect();
    assert_eq!(chain, vec!["oxford_house", "recovery_residence"]);
  }

  #[test]
  fn fallback_leaf_uses_level_of_care() {
    let catalog = Catalog::standard().unwrap();
    let taxonomy = catalog.taxonomy();

    let leaf = taxonomy
      .fallback_leaf(SourceCategory::TreatmentCenters, Some("Residential"))
      .unwrap();
    assert_eq!(leaf.type_id, "residential");

    let leaf = taxonomy
      .fallback_leaf(SourceCategory::TreatmentCenters, Some("IOP"))
      .unwrap();
    assert_eq!(leaf.type_id, "intensive_outpatient");

    let leaf = taxonomy
      .fallback_leaf(SourceCategory::TreatmentCenters, None)
      .unwrap();
    assert_eq!(leaf.type_id, "outpatient");

    let leaf = taxonomy.fallback_leaf(SourceCategory::Rccs, None).unwrap();
    assert_eq!(leaf.type_id, "rcc");
  }
}

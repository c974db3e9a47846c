//! Certification and type classification.
//!
//! The classifier reads free text (name, description, services and
//! certifications) and looks for indicator phrases. NARR indicators are
//! checked first; one or more hits make the organization NARR certified
//! regardless of any other evidence.

use haven_core::{
  catalog::Catalog, organization::Organization, taxonomy::SourceCategory,
};
use regex::Regex;

use crate::Result;

// ─── Rules ───────────────────────────────────────────────────────────────────

/// A non-NARR phrase and what it implies.
#[derive(Debug, Clone, PartialEq)]
pub struct Indicator {
  pub phrase:        String,
  /// Classifier label, e.g. `oxford_house`.
  pub certification: String,
  pub authority_id:  Option<String>,
  pub cert_type_id:  Option<String>,
}

impl Indicator {
  fn new(
    phrase: &str,
    certification: &str,
    authority_id: Option<&str>,
    cert_type_id: Option<&str>,
  ) -> Self {
    Self {
      phrase:        phrase.to_owned(),
      certification: certification.to_owned(),
      authority_id:  authority_id.map(str::to_owned),
      cert_type_id:  cert_type_id.map(str::to_owned),
    }
  }
}

/// Immutable indicator tables handed to [`classify`].
#[derive(Debug, Clone)]
pub struct ClassifierRules {
  pub narr_indicators:     Vec<String>,
  /// Checked in order; the first hit wins.
  pub other_indicators:    Vec<Indicator>,
  pub other_confidence:    f64,
  pub fallback_confidence: f64,
  level:                   Regex,
}

impl ClassifierRules {
  /// The built-in indicator tables.
  pub fn standard() -> Result<Self> {
    Ok(Self {
      narr_indicators:     [
        "narr certified",
        "narr accredited",
        "narr member",
        "narr standards",
        "narr level",
        "narr affiliate",
      ]
      .map(str::to_owned)
      .to_vec(),
      other_indicators:    vec![
        Indicator::new(
          "oxford house",
          "oxford_house",
          Some("oxford_house_inc"),
          Some("oxford_charter"),
        ),
        Indicator::new("garr certified", "garr_certified", Some("garr"), None),
        Indicator::new("farr certified", "farr_certified", Some("farr"), None),
        Indicator::new("carf", "carf", Some("carf"), Some("carf_behavioral")),
        Indicator::new(
          "joint commission",
          "joint_commission",
          Some("joint_commission"),
          Some("jcaho_behavioral"),
        ),
        Indicator::new(
          "jcaho",
          "joint_commission",
          Some("joint_commission"),
          Some("jcaho_behavioral"),
        ),
        Indicator::new(
          "state licensed",
          "state_licensed",
          Some("samhsa"),
          Some("state_licensed"),
        ),
        Indicator::new(
          "independent certification",
          "independent_certification",
          None,
          None,
        ),
      ],
      other_confidence:    0.8,
      fallback_confidence: 0.5,
      level:               Regex::new(r"(?i)\blevel\s*(iv|iii|ii|i|[1-4])\b")?,
    })
  }

  /// Roman-numeral NARR level from a raw level value (`"II"`, `"2"`,
  /// `"Level 2"`) or from a `level N` phrase in free text.
  fn narr_level(&self, raw: Option<&str>, haystack: &str) -> Option<&'static str> {
    if let Some(raw) = raw
      && let Some(level) = roman(raw.trim())
    {
      return Some(level);
    }
    self
      .level
      .captures(raw.unwrap_or(""))
      .or_else(|| self.level.captures(haystack))
      .and_then(|caps| caps.get(1))
      .and_then(|m| roman(m.as_str()))
  }
}

fn roman(s: &str) -> Option<&'static str> {
  match s.to_ascii_lowercase().as_str() {
    "i" | "1" => Some("I"),
    "ii" | "2" => Some("II"),
    "iii" | "3" => Some("III"),
    "iv" | "4" => Some("IV"),
    _ => None,
  }
}

// ─── Classification ──────────────────────────────────────────────────────────

pub const NARR_CERTIFIED: &str = "narr_certified";
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
  /// `narr_certified`, a non-NARR label such as `oxford_house`, or `unknown`.
  pub certification:       String,
  pub confidence:          f64,
  /// The indicator phrases that matched.
  pub evidence:            Vec<String>,
  pub authority_id:        Option<String>,
  pub cert_type_id:        Option<String>,
  /// Roman numeral, NARR only.
  pub certification_level: Option<String>,
}

fn haystack(org: &Organization) -> String {
  let mut parts = vec![org.name.as_str()];
  parts.extend(org.description.as_deref());
  parts.extend(org.certifications.iter().map(String::as_str));
  parts.extend(org.services.iter().map(String::as_str));
  parts.extend(org.certification_level.as_deref());
  if org.is_narr_certified {
    parts.push("narr certified");
  }
  parts.join(" ").to_lowercase()
}

/// Classify an organization from its text fields.
pub fn classify(org: &Organization, rules: &ClassifierRules) -> Classification {
  let text = haystack(org);

  let evidence: Vec<String> = rules
    .narr_indicators
    .iter()
    .filter(|phrase| text.contains(phrase.as_str()))
    .cloned()
    .collect();
  if !evidence.is_empty() {
    let total = rules.narr_indicators.len().max(1) as f64;
    let level = rules.narr_level(org.certification_level.as_deref(), &text);
    return Classification {
      certification: NARR_CERTIFIED.to_owned(),
      confidence: (evidence.len() as f64 / total).min(1.0),
      evidence,
      authority_id: Some("narr".to_owned()),
      cert_type_id: None,
      certification_level: level.map(str::to_owned),
    };
  }

  if let Some(hit) = rules
    .other_indicators
    .iter()
    .find(|i| text.contains(i.phrase.as_str()))
  {
    return Classification {
      certification:       hit.certification.clone(),
      confidence:          rules.other_confidence,
      evidence:            vec![hit.phrase.clone()],
      authority_id:        hit.authority_id.clone(),
      cert_type_id:        hit.cert_type_id.clone(),
      certification_level: None,
    };
  }

  Classification {
    certification:       UNKNOWN.to_owned(),
    confidence:          rules.fallback_confidence,
    evidence:            Vec::new(),
    authority_id:        None,
    cert_type_id:        None,
    certification_level: None,
  }
}

impl Classification {
  pub fn is_narr(&self) -> bool { self.certification == NARR_CERTIFIED }

  /// The leaf type this classification implies.
  ///
  /// NARR evidence maps to `narr_certified`; a certificate type that
  /// applies to exactly one leaf maps to that leaf; everything else falls
  /// back to the source category's default.
  pub fn type_id(
    &self,
    catalog: &Catalog,
    category: SourceCategory,
    level_of_care: Option<&str>,
  ) -> haven_core::Result<String> {
    let taxonomy = catalog.taxonomy();
    if self.is_narr() && taxonomy.is_leaf(NARR_CERTIFIED) {
      return Ok(NARR_CERTIFIED.to_owned());
    }

    let certified_leaf = self
      .cert_type_id
      .as_deref()
      .and_then(|id| catalog.certifications().cert_type(id))
      .and_then(|t| match t.applies_to_org_types.as_slice() {
        [only] if taxonomy.is_leaf(only) => Some(only.clone()),
        _ => None,
      });
    if let Some(leaf) = certified_leaf {
      return Ok(leaf);
    }

    Ok(taxonomy.fallback_leaf(category, level_of_care)?.type_id.clone())
  }

  /// Write the classification and its leaf type onto the organization.
  /// Ids unknown to the catalog are dropped. A NARR level resolves to its
  /// certificate type through the catalog.
  pub fn apply(&self, org: &mut Organization, catalog: &Catalog, type_id: String) {
    let registry = catalog.certifications();
    org.organization_type = type_id;
    org.is_narr_certified = self.is_narr();
    org.certification_type = Some(self.certification.clone());
    org.certification_type_id = match (&self.cert_type_id, &self.certification_level) {
      (Some(id), _) => registry.cert_type(id).map(|t| t.cert_type_id.clone()),
      (None, Some(level)) if self.is_narr() => {
        registry.narr_level(level).map(|t| t.cert_type_id.clone())
      }
      _ => None,
    };
    org.certification_authority_id = self
      .authority_id
      .clone()
      .filter(|id| registry.authority(id).is_some());
    if self.certification_level.is_some() {
      org.certification_level = self.certification_level.clone();
    }
  }
}

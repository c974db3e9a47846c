//! Reference data: taxonomy, certification registry and known sources.
//!
//! The catalog is an immutable value handed to every component that needs
//! reference data, so tests can substitute their own.

use chrono::NaiveDate;

use crate::{
  Result,
  certification::{CertificationAuthority, CertificationRegistry, CertificationType},
  source::{DataSource, SourceType, UpdateFrequency},
  taxonomy::{OrganizationType, SourceCategory, Taxonomy},
};

/// Validated reference data.
#[derive(Debug, Clone)]
pub struct Catalog {
  taxonomy:       Taxonomy,
  certifications: CertificationRegistry,
  sources:        Vec<DataSource>,
}

impl Catalog {
  /// Validate and assemble a catalog.
  pub fn new(
    types: Vec<OrganizationType>,
    authorities: Vec<CertificationAuthority>,
    cert_types: Vec<CertificationType>,
    sources: Vec<DataSource>,
  ) -> Result<Self> {
    let taxonomy = Taxonomy::new(types)?;
    let certifications =
      CertificationRegistry::new(authorities, cert_types, &taxonomy)?;
    Ok(Self { taxonomy, certifications, sources })
  }

  /// The built-in reference data for U.S. recovery services.
  pub fn standard() -> Result<Self> {
    Self::new(
      standard_types(),
      standard_authorities(),
      standard_cert_types(),
      standard_sources(),
    )
  }

  pub fn taxonomy(&self) -> &Taxonomy { &self.taxonomy }

  pub fn certifications(&self) -> &CertificationRegistry { &self.certifications }

  pub fn sources(&self) -> &[DataSource] { &self.sources }

  pub fn source(&self, source_id: &str) -> Option<&DataSource> {
    self.sources.iter().find(|s| s.source_id == source_id)
  }
}

// ─── Built-in data ───────────────────────────────────────────────────────────

fn org_type(
  type_id: &str,
  type_name: &str,
  parent: Option<&str>,
  category: &str,
  level_of_care: Option<&str>,
  description: &str,
) -> OrganizationType {
  OrganizationType {
    type_id:        type_id.to_owned(),
    type_name:      type_name.to_owned(),
    parent_type_id: parent.map(str::to_owned),
    category:       category.to_owned(),
    level_of_care:  level_of_care.map(str::to_owned),
    description:    description.to_owned(),
  }
}

fn standard_types() -> Vec<OrganizationType> {
  vec![
    org_type(
      "recovery_residence",
      "Recovery Residence",
      None,
      "recovery",
      None,
      "Alcohol and drug-free living environment for individuals in recovery",
    ),
    org_type(
      "treatment_center",
      "Treatment Center",
      None,
      "treatment",
      None,
      "Licensed facility providing addiction treatment services",
    ),
    org_type(
      "recovery_support",
      "Recovery Support Organization",
      None,
      "support",
      None,
      "Organization providing non-clinical recovery support services",
    ),
    org_type(
      "narr_certified",
      "NARR Certified Recovery Residence",
      Some("recovery_residence"),
      "recovery",
      None,
      "Recovery residence certified by NARR or a NARR affiliate",
    ),
    org_type(
      "oxford_house",
      "Oxford House",
      Some("recovery_residence"),
      "recovery",
      None,
      "Democratically self-run recovery house following the Oxford House model",
    ),
    org_type(
      "sober_living",
      "Sober Living Home",
      Some("recovery_residence"),
      "recovery",
      None,
      "General sober living environment without specific certification",
    ),
    org_type(
      "outpatient",
      "Outpatient Treatment",
      Some("treatment_center"),
      "treatment",
      Some("outpatient"),
      "Non-residential treatment services",
    ),
    org_type(
      "intensive_outpatient",
      "Intensive Outpatient (IOP)",
      Some("treatment_center"),
      "treatment",
      Some("intensive_outpatient"),
      "Structured outpatient treatment, typically 9+ hours per week",
    ),
    org_type(
      "residential",
      "Residential Treatment",
      Some("treatment_center"),
      "treatment",
      Some("residential"),
      "Live-in treatment facility with 24/7 care",
    ),
    org_type(
      "inpatient",
      "Inpatient/Hospital",
      Some("treatment_center"),
      "treatment",
      Some("inpatient"),
      "Medical facility providing detox and stabilization",
    ),
    org_type(
      "rcc",
      "Recovery Community Center",
      Some("recovery_support"),
      "support",
      None,
      "Peer-run center offering recovery support services",
    ),
    org_type(
      "rco",
      "Recovery Community Organization",
      Some("recovery_support"),
      "support",
      None,
      "Advocacy and organizing focused on the recovery community",
    ),
  ]
}

#[allow(clippy::too_many_arguments)]
fn authority(
  authority_id: &str,
  authority_name: &str,
  authority_type: &str,
  jurisdiction_level: &str,
  states: &[&str],
  website: &str,
  accreditation_body: Option<&str>,
  is_narr_affiliate: bool,
) -> CertificationAuthority {
  CertificationAuthority {
    authority_id:        authority_id.to_owned(),
    authority_name:      authority_name.to_owned(),
    authority_type:      authority_type.to_owned(),
    jurisdiction_level:  jurisdiction_level.to_owned(),
    jurisdiction_states: states.iter().map(|s| (*s).to_owned()).collect(),
    website:             Some(website.to_owned()),
    accreditation_body:  accreditation_body.map(str::to_owned),
    is_narr_affiliate,
  }
}

fn standard_authorities() -> Vec<CertificationAuthority> {
  vec![
    authority(
      "narr",
      "National Alliance for Recovery Residences",
      "nonprofit",
      "national",
      &[],
      "https://narr.org",
      None,
      true,
    ),
    authority(
      "farr",
      "Florida Association of Recovery Residences",
      "nonprofit",
      "state",
      &["FL"],
      "https://www.farronline.org",
      Some("NARR"),
      true,
    ),
    authority(
      "garr",
      "Georgia Association of Recovery Residences",
      "nonprofit",
      "state",
      &["GA"],
      "https://www.garronline.org",
      Some("NARR"),
      true,
    ),
    authority(
      "marr",
      "Michigan Association of Recovery Residences",
      "nonprofit",
      "state",
      &["MI"],
      "https://michiganarr.org",
      Some("NARR"),
      true,
    ),
    authority(
      "parr",
      "Pennsylvania Association of Recovery Residences",
      "nonprofit",
      "state",
      &["PA"],
      "https://parronline.org",
      Some("NARR"),
      true,
    ),
    authority(
      "oxford_house_inc",
      "Oxford House Inc.",
      "nonprofit",
      "national",
      &[],
      "https://www.oxfordhouse.org",
      None,
      false,
    ),
    authority(
      "carf",
      "Commission on Accreditation of Rehabilitation Facilities",
      "nonprofit",
      "international",
      &[],
      "https://www.carf.org",
      None,
      false,
    ),
    authority(
      "joint_commission",
      "The Joint Commission",
      "nonprofit",
      "national",
      &[],
      "https://www.jointcommission.org",
      None,
      false,
    ),
    authority(
      "samhsa",
      "Substance Abuse and Mental Health Services Administration",
      "government",
      "federal",
      &[],
      "https://www.samhsa.gov",
      None,
      false,
    ),
  ]
}

fn cert_type(
  cert_type_id: &str,
  authority_id: &str,
  cert_type_name: &str,
  level: Option<&str>,
  applies_to: &[&str],
  renewal_period_months: Option<u32>,
) -> CertificationType {
  CertificationType {
    cert_type_id: cert_type_id.to_owned(),
    authority_id: authority_id.to_owned(),
    cert_type_name: cert_type_name.to_owned(),
    certification_level: level.map(str::to_owned),
    applies_to_org_types: applies_to.iter().map(|s| (*s).to_owned()).collect(),
    renewal_period_months,
  }
}

fn standard_cert_types() -> Vec<CertificationType> {
  vec![
    cert_type("narr_level_1", "narr", "NARR Level I - Peer-Run", Some("I"), &["narr_certified"], Some(12)),
    cert_type("narr_level_2", "narr", "NARR Level II - Monitored", Some("II"), &["narr_certified"], Some(12)),
    cert_type("narr_level_3", "narr", "NARR Level III - Supervised", Some("III"), &["narr_certified"], Some(12)),
    cert_type("narr_level_4", "narr", "NARR Level IV - Service Provider", Some("IV"), &["narr_certified"], Some(12)),
    cert_type("oxford_charter", "oxford_house_inc", "Oxford House Charter", None, &["oxford_house"], None),
    cert_type("carf_behavioral", "carf", "CARF Behavioral Health", None, &["treatment_center"], Some(36)),
    cert_type("jcaho_behavioral", "joint_commission", "Joint Commission Behavioral Health", None, &["treatment_center"], Some(36)),
    cert_type("state_licensed", "samhsa", "State Licensed Treatment Facility", None, &["treatment_center"], Some(12)),
  ]
}

#[allow(clippy::too_many_arguments)]
fn source(
  source_id: &str,
  source_name: &str,
  source_type: SourceType,
  source_url: Option<&str>,
  source_organization: &str,
  reliability_score: f64,
  update_frequency: UpdateFrequency,
  category: SourceCategory,
) -> DataSource {
  DataSource {
    source_id: source_id.to_owned(),
    source_name: source_name.to_owned(),
    source_type,
    source_url: source_url.map(str::to_owned),
    source_organization: Some(source_organization.to_owned()),
    reliability_score,
    update_frequency,
    official_source: true,
    category,
    first_accessed: NaiveDate::from_ymd_opt(2025, 7, 30),
  }
}

fn standard_sources() -> Vec<DataSource> {
  vec![
    source(
      "narr_master",
      "NARR Master Directory",
      SourceType::WebScraping,
      Some("https://narr.org"),
      "National Alliance for Recovery Residences",
      0.9,
      UpdateFrequency::Monthly,
      SourceCategory::NarrResidences,
    ),
    source(
      "mash_api",
      "Massachusetts MASH API",
      SourceType::Api,
      Some("https://www.masshousingregistry.org"),
      "MASH",
      0.95,
      UpdateFrequency::Daily,
      SourceCategory::NarrResidences,
    ),
    source(
      "garr_directory",
      "Georgia GARR Directory",
      SourceType::WebScraping,
      Some("https://www.garronline.org"),
      "Georgia Association of Recovery Residences",
      0.85,
      UpdateFrequency::Monthly,
      SourceCategory::NarrResidences,
    ),
    source(
      "samhsa_locator",
      "SAMHSA Treatment Locator",
      SourceType::Api,
      Some("https://findtreatment.samhsa.gov"),
      "SAMHSA",
      0.95,
      UpdateFrequency::Weekly,
      SourceCategory::Rccs,
    ),
    source(
      "samhsa_csv",
      "SAMHSA CSV Export",
      SourceType::Csv,
      None,
      "SAMHSA",
      0.95,
      UpdateFrequency::Quarterly,
      SourceCategory::TreatmentCenters,
    ),
    source(
      "oxford_vacancies",
      "Oxford House Vacancies",
      SourceType::WebScraping,
      Some("https://www.oxfordvacancies.com"),
      "Oxford House Inc.",
      0.9,
      UpdateFrequency::Daily,
      SourceCategory::OxfordHouses,
    ),
    source(
      "state_websites",
      "State Government Websites",
      SourceType::Manual,
      None,
      "Various State Agencies",
      0.8,
      UpdateFrequency::Quarterly,
      SourceCategory::Rcos,
    ),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn standard_catalog_is_consistent() {
    let catalog = Catalog::standard().unwrap();
    assert_eq!(catalog.taxonomy().types().len(), 12);
    assert_eq!(catalog.certifications().authorities().len(), 9);
    assert_eq!(catalog.certifications().types().len(), 8);
    assert_eq!(
      catalog.source("oxford_vacancies").unwrap().category,
      SourceCategory::OxfordHouses
    );
  }

  #[test]
  fn new_validates_inputs() {
    let result = Catalog::new(
      standard_types(),
      vec![],
      standard_cert_types(),
      vec![],
    );
    assert!(result.is_err());
  }
}

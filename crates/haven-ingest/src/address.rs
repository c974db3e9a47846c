//! Free-text address parsing and state normalisation.

use haven_core::organization::Address;
use regex::Regex;

use crate::Result;

const STATES: &[(&str, &str)] = &[
  ("alabama", "AL"),
  ("alaska", "AK"),
  ("arizona", "AZ"),
  ("arkansas", "AR"),
  ("california", "CA"),
  ("colorado", "CO"),
  ("connecticut", "CT"),
  ("delaware", "DE"),
  ("district of columbia", "DC"),
  ("florida", "FL"),
  ("georgia", "GA"),
  ("hawaii", "HI"),
  ("idaho", "ID"),
  ("illinois", "IL"),
  ("indiana", "IN"),
  ("iowa", "IA"),
  ("kansas", "KS"),
  ("kentucky", "KY"),
  ("louisiana", "LA"),
  ("maine", "ME"),
  ("maryland", "MD"),
  ("massachusetts", "MA"),
  ("michigan", "MI"),
  ("minnesota", "MN"),
  ("mississippi", "MS"),
  ("missouri", "MO"),
  ("montana", "MT"),
  ("nebraska", "NE"),
  ("nevada", "NV"),
  ("new hampshire", "NH"),
  ("new jersey", "NJ"),
  ("new mexico", "NM"),
  ("new york", "NY"),
  ("north carolina", "NC"),
  ("north dakota", "ND"),
  ("ohio", "OH"),
  ("oklahoma", "OK"),
  ("oregon", "OR"),
  ("pennsylvania", "PA"),
  ("puerto rico", "PR"),
  ("rhode island", "RI"),
  ("south carolina", "SC"),
  ("south dakota", "SD"),
  ("tennessee", "TN"),
  ("texas", "TX"),
  ("utah", "UT"),
  ("vermont", "VT"),
  ("virginia", "VA"),
  ("washington", "WA"),
  ("west virginia", "WV"),
  ("wisconsin", "WI"),
  ("wyoming", "WY"),
];

/// Map a state value to its USPS code.
///
/// Accepts two-letter codes in any case and full names, including bucket
/// labels that start with a state name (`"Massachusetts Mash"`,
/// `"new_york_oasas"`).
pub fn state_code(raw: &str) -> Option<&'static str> {
  let trimmed = raw.trim();
  if trimmed.len() == 2 {
    let upper = trimmed.to_ascii_uppercase();
    return STATES
      .iter()
      .find(|(_, code)| *code == upper)
      .map(|(_, code)| *code);
  }

  let cleaned: String = trimmed
    .to_lowercase()
    .chars()
    .map(|c| if c.is_ascii_alphabetic() { c } else { ' ' })
    .collect();
  let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

  // Longest name first so "west virginia" wins over "virginia".
  STATES
    .iter()
    .filter(|(name, _)| {
      cleaned == *name
        || cleaned
          .strip_prefix(name)
          .is_some_and(|rest| rest.starts_with(' '))
    })
    .max_by_key(|(name, _)| name.len())
    .map(|(_, code)| *code)
}

/// The USPS code when recognised, otherwise the trimmed input. Blank input
/// yields `None`.
pub fn normalize_state(raw: &str) -> Option<String> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(
    state_code(trimmed)
      .map(str::to_owned)
      .unwrap_or_else(|| trimmed.to_owned()),
  )
}

/// Best-effort parser for single-line addresses such as
/// `"12 Elm St, Austin, TX 78701"`.
#[derive(Debug, Clone)]
pub struct AddressParser {
  locality: Regex,
  zip:      Regex,
}

impl AddressParser {
  pub fn new() -> Result<Self> {
    Ok(Self {
      locality: Regex::new(
        r"(?i),\s*(?P<city>[^,]+?)\s*,\s*(?P<state>[a-z]{2}|[a-z][a-z ]+?)\.?(?:\s+(?P<zip>\d{5}(?:-\d{4})?))?\s*$",
      )?,
      zip:      Regex::new(r"\b(?P<zip>\d{5}(?:-\d{4})?)\s*$")?,
    })
  }

  /// Split a free-text address into components.
  ///
  /// When a trailing `City, ST 12345` is found the street is the text before
  /// it. Otherwise the whole string is the street and only a trailing ZIP
  /// code is extracted.
  pub fn parse(&self, text: &str) -> Address {
    let text = text.trim();
    if text.is_empty() {
      return Address::default();
    }

    if let Some(caps) = self.locality.captures(text)
      && let Some(whole) = caps.get(0)
      && let Some(state) = caps.name("state").and_then(|m| state_code(m.as_str()))
    {
      return Address {
        street: non_blank(&text[..whole.start()]),
        city:   caps.name("city").and_then(|m| non_blank(m.as_str())),
        state:  Some(state.to_owned()),
        zip:    caps.name("zip").map(|m| m.as_str().to_owned()),
      };
    }

    let zip = self
      .zip
      .captures(text)
      .and_then(|caps| caps.name("zip"))
      .map(|m| m.as_str().to_owned());
    Address {
      street: Some(text.to_owned()),
      city: None,
      state: None,
      zip,
    }
  }
}

fn non_blank(s: &str) -> Option<String> {
  let s = s.trim().trim_end_matches(',').trim();
  (!s.is_empty()).then(|| s.to_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn state_codes_from_codes_and_names() {
    assert_eq!(state_code("tx"), Some("TX"));
    assert_eq!(state_code("Texas"), Some("TX"));
    assert_eq!(state_code("Massachusetts Mash"), Some("MA"));
    assert_eq!(state_code("west_virginia"), Some("WV"));
    assert_eq!(state_code("Virginia"), Some("VA"));
    assert_eq!(state_code("Ontario"), None);
    assert_eq!(state_code("ZZ"), None);
  }

  #[test]
  fn normalize_state_keeps_unrecognised_values() {
    assert_eq!(normalize_state(" ga "), Some("GA".into()));
    assert_eq!(normalize_state("Ontario"), Some("Ontario".into()));
    assert_eq!(normalize_state("  "), None);
  }

  #[test]
  fn parses_full_single_line_address() {
    let parser = AddressParser::new().unwrap();
    let a = parser.parse("12 Elm St, Austin, TX 78701");
    assert_eq!(a.street.as_deref(), Some("12 Elm St"));
    assert_eq!(a.city.as_deref(), Some("Austin"));
    assert_eq!(a.state.as_deref(), Some("TX"));
    assert_eq!(a.zip.as_deref(), Some("78701"));
  }

  #[test]
  fn parses_state_name_without_zip() {
    let parser = AddressParser::new().unwrap();
    let a = parser.parse("400 Main Street, Suite 2, Boston, Massachusetts");
    assert_eq!(a.street.as_deref(), Some("400 Main Street, Suite 2"));
    assert_eq!(a.city.as_deref(), Some("Boston"));
    assert_eq!(a.state.as_deref(), Some("MA"));
    assert_eq!(a.zip, None);
  }

  #[test]
  fn street_only_keeps_whole_text() {
    let parser = AddressParser::new().unwrap();
    let a = parser.parse("12 Elm St 78701");
    assert_eq!(a.street.as_deref(), Some("12 Elm St 78701"));
    assert_eq!(a.zip.as_deref(), Some("78701"));
    assert_eq!(a.city, None);
  }
}

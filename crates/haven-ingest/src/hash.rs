//! Content hashing for lineage versioning.

use haven_core::organization::Organization;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::Result;

/// SHA-256 hex digest of a source's contribution to an organization.
///
/// The digest covers the canonical JSON form with object keys sorted and
/// `extraction_date` removed, so re-scraping identical data on another day
/// produces the same hash.
pub fn data_hash(contribution: &Organization) -> Result<String> {
  let mut value = serde_json::to_value(contribution)?;
  if let Value::Object(map) = &mut value {
    map.remove("extraction_date");
  }
  value_hash(&value)
}

/// SHA-256 hex digest of any JSON value in canonical form.
pub fn value_hash(value: &Value) -> Result<String> {
  let bytes = serde_json::to_vec(&canonical(value))?;
  Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Rebuild objects with their keys in sorted order.
fn canonical(value: &Value) -> Value {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort();
      let mut out = Map::with_capacity(map.len());
      for key in keys {
        out.insert(key.clone(), canonical(&map[key]));
      }
      Value::Object(out)
    }
    Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
    other => other.clone(),
  }
}

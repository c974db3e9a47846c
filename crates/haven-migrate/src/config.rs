//! Migration configuration.
//!
//! Read from an optional TOML file layered with `HAVEN_`-prefixed
//! environment variables. Command-line flags are applied on top by the
//! binary.

use std::path::{Path, PathBuf};

use haven_core::taxonomy::SourceCategory;
use serde::Deserialize;

use crate::Result;

pub const DEFAULT_CONFIG_FILE: &str = "haven.toml";

/// Runtime configuration for one migration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
  pub db_path:    PathBuf,
  /// Default `tracing` directive; `RUST_LOG` still overrides it.
  pub log_level:  String,
  /// Also write logs, without ANSI colours, to this file.
  pub log_file:   Option<PathBuf>,
  /// Organizations per load transaction.
  pub batch_size: usize,
  /// Replace the embedded schema scripts with the files in this directory.
  pub schema_dir: Option<PathBuf>,
  /// Source documents, ingested in order.
  pub sources:    Vec<SourceSpec>,
}

impl Default for MigrateConfig {
  fn default() -> Self {
    Self {
      db_path:    PathBuf::from("haven.db"),
      log_level:  "info".to_owned(),
      log_file:   None,
      batch_size: 100,
      schema_dir: None,
      sources:    Vec::new(),
    }
  }
}

/// One source document to ingest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceSpec {
  /// Catalog source id, or a new id when `category` is given.
  pub source_id:   String,
  pub path:        PathBuf,
  /// Required for sources the catalog does not know; overrides the
  /// catalog's category otherwise.
  #[serde(default)]
  pub category:    Option<SourceCategory>,
  #[serde(default)]
  pub source_name: Option<String>,
  #[serde(default)]
  pub source_url:  Option<String>,
}

impl MigrateConfig {
  /// Load `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("HAVEN"))
      .build()?;
    let mut cfg: Self = settings.try_deserialize()?;
    cfg.expand_paths();
    Ok(cfg)
  }

  fn expand_paths(&mut self) {
    self.db_path = expand_tilde(&self.db_path);
    self.log_file = self.log_file.as_deref().map(expand_tilde);
    self.schema_dir = self.schema_dir.as_deref().map(expand_tilde);
    for source in &mut self.sources {
      source.path = expand_tilde(&source.path);
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_gives_defaults() {
    let cfg = MigrateConfig::load(Path::new("/nonexistent/haven.toml")).unwrap();
    assert_eq!(cfg.batch_size, 100);
    assert!(cfg.sources.is_empty());
    assert!(cfg.schema_dir.is_none());
  }

  #[test]
  fn reads_sources_from_toml() {
    let dir = std::env::temp_dir().join(format!("haven-config-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("haven.toml");
    std::fs::write(
      &path,
      r#"
        db_path = "out/directory.db"
        batch_size = 25

        [[sources]]
        source_id = "narr_master"
        path = "data/narr.json"

        [[sources]]
        source_id = "county_list"
        path = "data/county.json"
        category = "rcos"
      "#,
    )
    .unwrap();

    let cfg = MigrateConfig::load(&path).unwrap();
    assert_eq!(cfg.db_path, PathBuf::from("out/directory.db"));
    assert_eq!(cfg.batch_size, 25);
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.sources.len(), 2);
    assert_eq!(cfg.sources[0].category, None);
    assert_eq!(cfg.sources[1].category, Some(SourceCategory::Rcos));

    std::fs::remove_dir_all(dir).unwrap();
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/db.sqlite")), PathBuf::from(home).join("db.sqlite"));
    assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
  }
}

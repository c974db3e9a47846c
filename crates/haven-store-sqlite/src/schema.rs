//! SQL schema for the directory store.
//!
//! Three scripts: core tables (run at open), indexes and views (run by
//! `finalize` after bulk loading). The scripts are embedded at build time
//! and can be replaced by a directory holding files of the same names.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const CORE_TABLES_FILE: &str = "01_core_tables.sql";
pub const INDEXES_FILE: &str = "02_indexes.sql";
pub const VIEWS_FILE: &str = "03_views.sql";

const CORE_TABLES: &str = include_str!("../schema/01_core_tables.sql");
const INDEXES: &str = include_str!("../schema/02_indexes.sql");
const VIEWS: &str = include_str!("../schema/03_views.sql");

/// Where schema scripts come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemaSource {
  #[default]
  Embedded,
  /// A directory containing `01_core_tables.sql`, `02_indexes.sql` and
  /// `03_views.sql`. Every file must exist.
  Directory(PathBuf),
}

/// Loaded schema scripts.
#[derive(Debug, Clone)]
pub struct Schema {
  pub core_tables: String,
  pub indexes:     String,
  pub views:       String,
}

impl SchemaSource {
  pub fn load(&self) -> Result<Schema> {
    match self {
      Self::Embedded => Ok(Schema {
        core_tables: CORE_TABLES.to_owned(),
        indexes:     INDEXES.to_owned(),
        views:       VIEWS.to_owned(),
      }),
      Self::Directory(dir) => Ok(Schema {
        core_tables: read(dir, CORE_TABLES_FILE)?,
        indexes:     read(dir, INDEXES_FILE)?,
        views:       read(dir, VIEWS_FILE)?,
      }),
    }
  }
}

fn read(dir: &Path, file: &str) -> Result<String> {
  let path = dir.join(file);
  std::fs::read_to_string(&path).map_err(|source| Error::Schema { path, source })
}

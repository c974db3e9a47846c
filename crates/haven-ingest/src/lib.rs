//! Source normalisation, identity resolution, classification and scoring.
//!
//! Pure synchronous; no database or network dependencies. Every function
//! here is deterministic for a given input and reference data.
//!
//! # Quick start
//!
//! ```no_run
//! use haven_ingest::{AddressParser, normalize::detect_shape};
//!
//! let doc = serde_json::json!({"houses": [{"name": "Oxford House Elm"}]});
//! let parser = AddressParser::new().unwrap();
//! for record in detect_shape(doc).unwrap().into_records() {
//!   let draft = record.to_draft(&parser).unwrap();
//!   println!("{}", draft.name);
//! }
//! ```

pub mod address;
pub mod classify;
pub mod error;
pub mod hash;
pub mod identity;
pub mod normalize;
pub mod quality;

pub use address::AddressParser;
pub use classify::{Classification, ClassifierRules, classify};
pub use error::{Error, Result};
pub use identity::{DedupIndex, Resolution, resolve_identity};
pub use normalize::{Draft, RawBatch, RawRecord, detect_shape, normalize};

//! Core types and trait definitions for the recovery services directory.
//!
//! This crate is deliberately free of parsing and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod certification;
pub mod error;
pub mod lineage;
pub mod organization;
pub mod source;
pub mod store;
pub mod taxonomy;

pub use error::{Error, Result};

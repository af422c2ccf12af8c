//! # SPARC Search Core
//!
//! Pure logic for turning raw search-index documents into flat, versioned
//! dataset records, and for building the boolean query bodies sent to the
//! index from facet selections.
//!
//! This crate performs no network or filesystem I/O. The application crate
//! owns the index transport (see [`index::SearchIndex`]) and hands already
//! parsed JSON to the functions here.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`path`] | Nested key-path extraction over JSON |
//! | [`taxonomy`] | MIME type → file category tables, skip list, path renames |
//! | [`schema`] | Per-version attribute tables and pass-through keys |
//! | [`classify`] | File object bucketing by category |
//! | [`normalize`] | Hit and response normalization, DOI conversion |
//! | [`query`] | Facet query-string construction |
//! | [`index`] | Search index collaborator trait |

pub mod classify;
pub mod error;
pub mod index;
pub mod normalize;
pub mod path;
pub mod query;
pub mod schema;
pub mod taxonomy;

pub use error::{NormalizeError, Result};

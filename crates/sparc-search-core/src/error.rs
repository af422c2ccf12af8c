//! Structural errors raised while normalizing hits.
//!
//! Missing optional fields, unknown schema versions and unmapped MIME types
//! are all expected input variability and never surface here. Only hits that
//! lack the minimum skeleton every schema version relies on are rejected.

use thiserror::Error;

/// Result type for normalization.
pub type Result<T> = std::result::Result<T, NormalizeError>;

/// A hit violated the upstream document contract.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The hit (or its `_source`) is not a JSON object.
    #[error("hit is not a keyed document (found {found})")]
    NotAnObject {
        /// JSON type that was found instead
        found: &'static str,
    },

    /// A path every document of this schema version must carry is absent.
    #[error("hit {id} is missing mandatory field '{path}' for schema version {version}")]
    MissingField {
        /// Index document id, or `<unknown>`
        id: String,
        /// Dotted path of the missing field
        path: String,
        /// Resolved schema version tag
        version: &'static str,
    },

    /// A search response did not contain a `hits.hits` array.
    #[error("search response has no hits array")]
    MissingHits,
}

/// JSON type name, for error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

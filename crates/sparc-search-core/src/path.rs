//! Attribute path extraction.
//!
//! Index documents are deep, schema-less JSON whose shape drifts between
//! dataset versions. Attributes are located by an ordered sequence of keys,
//! walked one step at a time. A path that does not fully resolve is normal
//! input variability, not an error: the walk simply yields `None`.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use sparc_search_core::path::path_get;
//!
//! let doc = json!({"item": {"name": "Heart scaffold", "published": false}});
//! assert_eq!(path_get(&doc, &["item", "name"]), Some(&json!("Heart scaffold")));
//! // A stored `false` is found; a missing key is not.
//! assert_eq!(path_get(&doc, &["item", "published"]), Some(&json!(false)));
//! assert_eq!(path_get(&doc, &["item", "curie"]), None);
//! ```

use serde_json::Value;

/// Something that can be indexed by a string key.
///
/// Returns `None` when `self` is not a keyed mapping or has no such key.
pub trait KeyedLookup {
    fn lookup(&self, key: &str) -> Option<&Self>;
}

impl KeyedLookup for Value {
    fn lookup(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }
}

/// Walk `path` through `root`, descending one key at a time.
///
/// An empty path resolves to `root` itself.
pub fn path_get<'a, T, S>(root: &'a T, path: &[S]) -> Option<&'a T>
where
    T: KeyedLookup + ?Sized,
    S: AsRef<str>,
{
    let mut current = root;
    for key in path {
        current = current.lookup(key.as_ref())?;
    }
    Some(current)
}

/// The value surfaced for an attribute whose path did not resolve.
///
/// Output records carry `false` for absent attributes, which keeps "absent"
/// distinguishable from a stored `null`, empty string or empty list.
pub const NOT_FOUND: Value = Value::Bool(false);

/// Extract a cloned value, or [`NOT_FOUND`] when the path does not resolve.
pub fn extract_or_sentinel<S: AsRef<str>>(root: &Value, path: &[S]) -> Value {
    path_get(root, path).cloned().unwrap_or(NOT_FOUND)
}

/// Render a key path as `a.b.c`, for diagnostics.
pub fn dotted<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(".")
}

/// JavaScript-style truthiness of a JSON value.
///
/// `false`, `null`, `0`, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_walks_nested_objects() {
        let doc = json!({"a": {"b": {"c": 3}}});
        assert_eq!(path_get(&doc, &["a", "b", "c"]), Some(&json!(3)));
        assert_eq!(path_get(&doc, &["a", "b"]), Some(&json!({"c": 3})));
    }

    #[test]
    fn test_empty_path_is_root() {
        let doc = json!({"a": 1});
        let empty: [&str; 0] = [];
        assert_eq!(path_get(&doc, &empty), Some(&doc));
    }

    #[test]
    fn test_missing_key_is_none() {
        let doc = json!({"a": {"b": 1}});
        assert_eq!(path_get(&doc, &["a", "x"]), None);
        assert_eq!(path_get(&doc, &["x", "b"]), None);
    }

    #[test]
    fn test_stops_at_non_object() {
        let doc = json!({"a": [ {"b": 1} ], "s": "text"});
        assert_eq!(path_get(&doc, &["a", "b"]), None);
        assert_eq!(path_get(&doc, &["s", "len"]), None);
    }

    #[test]
    fn test_sentinel_distinct_from_stored_falsy() {
        let doc = json!({"a": null, "b": "", "c": 0});
        assert_eq!(extract_or_sentinel(&doc, &["a"]), Value::Null);
        assert_eq!(extract_or_sentinel(&doc, &["b"]), json!(""));
        assert_eq!(extract_or_sentinel(&doc, &["c"]), json!(0));
        assert_eq!(extract_or_sentinel(&doc, &["d"]), NOT_FOUND);
    }

    #[test]
    fn test_does_not_mutate_input() {
        let doc = json!({"a": {"b": [1, 2]}});
        let before = doc.clone();
        let _ = extract_or_sentinel(&doc, &["a", "b"]);
        assert_eq!(doc, before);
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!("DOI:10.1/x")));
        assert!(is_truthy(&json!([1])));
    }

    #[test]
    fn test_dotted() {
        assert_eq!(dotted(&["item", "version", "keyword"]), "item.version.keyword");
    }
}

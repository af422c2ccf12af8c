//! Result normalization.
//!
//! Turns raw index hits into flat [`NormalizedResult`] records.
//!
//! # Algorithm
//!
//! 1. Take the hit's `_source` (or the hit itself when it has none).
//! 2. Resolve the schema version and check the mandatory paths.
//! 3. Extract every attribute of the version's attribute table.
//! 4. Convert the DOI from `DOI:xxxx` to `https://doi.org/xxxx`.
//! 5. Classify the `files` attribute with the version's MIME table.
//! 6. Emit exactly the version's pass-through keys: attributes always
//!    (with `false` when absent), categories only when non-empty.
//!
//! Hits are independent and every table is read-only, so batches are
//! normalized in parallel with `rayon`; output order matches input order.

use rayon::prelude::*;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use crate::classify::{classify, CategoryBuckets};
use crate::error::{json_type_name, NormalizeError, Result};
use crate::path::{dotted, extract_or_sentinel, is_truthy, path_get};
use crate::query::FacetTypeMap;
use crate::schema::{SchemaRegistry, SchemaVersion};
use crate::taxonomy::{CategoryTag, Taxonomy};

const DOI_URL_PREFIX: &str = "https://doi.org/";
const DOI_CURIE_PREFIX: &str = "DOI:";

/// Convert a compact `DOI:xxxx` identifier into a resolvable URL.
///
/// Already-converted URLs and falsy values are returned unchanged, so
/// `convert_doi(&convert_doi(x)) == convert_doi(x)`.
pub fn convert_doi(doi: &Value) -> Value {
    match doi {
        Value::String(s) => Value::String(convert_doi_str(s)),
        other => other.clone(),
    }
}

/// String form of [`convert_doi`].
pub fn convert_doi_str(doi: &str) -> String {
    let trimmed = doi.trim();
    if trimmed.len() >= DOI_CURIE_PREFIX.len()
        && trimmed.is_char_boundary(DOI_CURIE_PREFIX.len())
        && trimmed[..DOI_CURIE_PREFIX.len()].eq_ignore_ascii_case(DOI_CURIE_PREFIX)
    {
        format!("{}{}", DOI_URL_PREFIX, &trimmed[DOI_CURIE_PREFIX.len()..])
    } else {
        doi.to_string()
    }
}

/// One normalized hit.
///
/// Serializes as a JSON object holding exactly the pass-through fields of
/// its schema version, in pass-through order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResult {
    version: SchemaVersion,
    fields: Vec<(&'static str, Value)>,
    attributes: Vec<(&'static str, Value)>,
    files: CategoryBuckets,
}

impl NormalizedResult {
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// An output field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Output field names, in order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(k, _)| *k)
    }

    /// Any extracted attribute, including internal ones that are not
    /// passed through (`organs`, `samples`, `updated`, ...).
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    /// Every classified file bucket, whether or not it is passed through.
    pub fn files(&self) -> &CategoryBuckets {
        &self.files
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }
}

impl Serialize for NormalizedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// A normalized search response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    #[serde(rename = "numberOfHits")]
    pub number_of_hits: u64,
    pub results: Vec<NormalizedResult>,
}

/// Normalizes hits against a schema registry and taxonomy.
///
/// Holds only shared references; cheap to construct per request.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer<'a> {
    registry: &'a SchemaRegistry,
    taxonomy: &'a Taxonomy,
}

impl<'a> Normalizer<'a> {
    pub fn new(registry: &'a SchemaRegistry, taxonomy: &'a Taxonomy) -> Self {
        Self { registry, taxonomy }
    }

    /// Normalize one hit.
    pub fn normalize(&self, hit: &Value) -> Result<NormalizedResult> {
        let source = match hit.get("_source") {
            Some(src) => src,
            None => hit,
        };
        if !source.is_object() {
            return Err(NormalizeError::NotAnObject {
                found: json_type_name(source),
            });
        }

        let schema = self.registry.resolve(source);

        for path in schema.mandatory.iter().copied() {
            if !matches!(path_get(source, path), Some(Value::Object(_))) {
                return Err(NormalizeError::MissingField {
                    id: hit_id(hit, source),
                    path: dotted(path),
                    version: schema.version.as_str(),
                });
            }
        }

        let mut attributes: Vec<(&'static str, Value)> = schema
            .attributes
            .iter()
            .map(|(name, path)| (*name, extract_or_sentinel(source, *path)))
            .collect();

        for (name, value) in attributes.iter_mut() {
            if *name == "doi" && is_truthy(value) {
                *value = convert_doi(value);
            }
        }

        let files = if schema.classifies_files {
            match attributes.iter().find(|(name, _)| *name == "files") {
                Some((_, Value::Array(objects))) => {
                    classify(objects, &schema.mime_table, self.taxonomy)
                }
                _ => CategoryBuckets::new(),
            }
        } else {
            CategoryBuckets::new()
        };

        let mut fields = Vec::with_capacity(schema.pass_through.len());
        for key in schema.pass_through {
            match key.parse::<CategoryTag>() {
                Ok(tag) => {
                    if let Some(objects) = files.get(tag) {
                        fields.push((*key, Value::Array(objects.to_vec())));
                    }
                }
                Err(()) => {
                    let value = attributes
                        .iter()
                        .find(|(name, _)| name == key)
                        .map(|(_, v)| v.clone())
                        .unwrap_or(crate::path::NOT_FOUND);
                    fields.push((*key, value));
                }
            }
        }

        Ok(NormalizedResult {
            version: schema.version,
            fields,
            attributes,
            files,
        })
    }

    /// Normalize many hits in parallel. The first structural error aborts
    /// the batch.
    pub fn normalize_batch(&self, hits: &[Value]) -> Result<Vec<NormalizedResult>> {
        hits.par_iter().map(|hit| self.normalize(hit)).collect()
    }

    /// Normalize a full search response (`hits.total`, `hits.hits`).
    pub fn normalize_response(&self, response: &Value) -> Result<SearchResults> {
        let hits = path_get(response, &["hits", "hits"])
            .and_then(Value::as_array)
            .ok_or(NormalizeError::MissingHits)?;
        let results = self.normalize_batch(hits)?;
        let number_of_hits = total_hits(response).unwrap_or(results.len() as u64);
        Ok(SearchResults {
            number_of_hits,
            results,
        })
    }
}

/// `hits.total` is a bare number in older index releases and
/// `{"value": n, "relation": ...}` in newer ones.
fn total_hits(response: &Value) -> Option<u64> {
    match path_get(response, &["hits", "total"])? {
        Value::Number(n) => n.as_u64(),
        Value::Object(total) => total.get("value").and_then(Value::as_u64),
        _ => None,
    }
}

fn hit_id(hit: &Value, source: &Value) -> String {
    path_get(hit, &["_id"])
        .or_else(|| path_get(source, &["pennsieve", "identifier"]))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// One selectable facet value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetEntry {
    /// Display label: the first spelling seen, with its first letter capitalized.
    pub label: String,
    /// Facet term this value belongs to.
    pub term: String,
    /// Documents carrying this value, summed across the term's fields.
    pub count: u64,
}

/// Flatten an aggregation response built by
/// [`facet_aggregation_query`](crate::query::facet_aggregation_query).
///
/// Buckets from every field of `term` are merged case-insensitively, in
/// field order then bucket order. Unknown terms and missing aggregations
/// yield an empty list.
pub fn reform_aggregation_results(response: &Value, term: &str, facets: &FacetTypeMap) -> Vec<FacetEntry> {
    let Some(fields) = facets.fields(term) else {
        return Vec::new();
    };
    let mut entries: Vec<FacetEntry> = Vec::new();
    for field in fields {
        let buckets = path_get(response, &["aggregations", field.as_str(), "buckets"])
            .and_then(Value::as_array);
        for bucket in buckets.into_iter().flatten() {
            let key = match path_get(bucket, &["key"]) {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim(),
                _ => continue,
            };
            let count = path_get(bucket, &["doc_count"]).and_then(Value::as_u64).unwrap_or(0);
            match entries.iter_mut().find(|e| e.label.eq_ignore_ascii_case(key)) {
                Some(entry) => entry.count += count,
                None => entries.push(FacetEntry {
                    label: capitalize(key),
                    term: term.to_string(),
                    count,
                }),
            }
        }
    }
    entries
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(version: Option<&str>, objects: Value) -> Value {
        let mut item = json!({
            "name": "Rat heart scaffold",
            "description": "A scaffold",
            "identifier": "dataset-1",
            "curie": "DOI:10.26275/abcd-1234",
            "statistics": {"samples": {"count": 4}, "subjects": {"count": 2}},
        });
        if let Some(v) = version {
            item["version"] = json!({"keyword": v});
        }
        json!({
            "_id": "dataset-1",
            "_source": {
                "item": item,
                "objects": objects,
                "contributors": [{"name": "A. Person"}],
                "anatomy": {"organ": [{"name": "heart"}]},
                "pennsieve": {"uri": "s3://pennsieve-prod/1"},
                "distributions": {"current": {"uri": "https://example.org/1"}},
            }
        })
    }

    fn normalize(raw: &Value) -> Result<NormalizedResult> {
        let registry = SchemaRegistry::builtin();
        let taxonomy = Taxonomy::builtin();
        Normalizer::new(&registry, &taxonomy).normalize(raw)
    }

    #[test]
    fn test_convert_doi() {
        assert_eq!(convert_doi_str("DOI:10.26275/x"), "https://doi.org/10.26275/x");
        assert_eq!(convert_doi_str("doi:10.26275/x"), "https://doi.org/10.26275/x");
        assert_eq!(convert_doi_str("https://doi.org/10.26275/x"), "https://doi.org/10.26275/x");
        assert_eq!(convert_doi(&json!(false)), json!(false));
        assert_eq!(convert_doi(&json!(null)), json!(null));
        assert_eq!(convert_doi(&json!("")), json!(""));
    }

    #[test]
    fn test_convert_doi_idempotent() {
        for x in [json!("DOI:10.1/a"), json!("https://doi.org/10.1/a"), json!(false), json!("")] {
            assert_eq!(convert_doi(&convert_doi(&x)), convert_doi(&x));
        }
    }

    #[test]
    fn test_keys_match_pass_through_exactly() {
        let registry = SchemaRegistry::builtin();
        let raw = hit(
            Some("1.1.3"),
            json!([
                {"mimetype": {"name": "image/png"}, "dataset": {"path": "primary/a.png"}},
                {"mimetype": {"name": "video/mp4"}, "dataset": {"path": "primary/b.mp4"}},
            ]),
        );
        let result = normalize(&raw).unwrap();
        assert_eq!(result.version(), SchemaVersion::V1_1_3);
        let allowed = registry.get(SchemaVersion::V1_1_3).pass_through;
        for key in result.keys() {
            assert!(allowed.contains(&key), "unexpected key {}", key);
        }
        for key in allowed {
            if key.parse::<CategoryTag>().is_err() {
                assert!(result.get(key).is_some(), "missing key {}", key);
            }
        }
        assert!(result.get("common-images").is_some());
        assert!(result.get("video").is_some());
        assert!(result.get("tiff-image").is_none());
        assert!(result.get("files").is_none());
        assert!(result.get("organs").is_none());
        assert!(result.attribute("organs").is_some());
    }

    #[test]
    fn test_doi_is_url_in_output() {
        let result = normalize(&hit(Some("1.1.5"), json!([]))).unwrap();
        assert_eq!(result.get("doi"), Some(&json!("https://doi.org/10.26275/abcd-1234")));
    }

    #[test]
    fn test_missing_optional_is_false() {
        let result = normalize(&hit(Some("1.1.5"), json!([]))).unwrap();
        assert_eq!(result.get("readme"), Some(&json!(false)));
        assert_eq!(result.get("sampleSize"), Some(&json!(4)));
    }

    #[test]
    fn test_common_image_end_to_end() {
        let primary = hit(
            Some("1.1.5"),
            json!([{"mimetype": {"name": "image/png"}, "dataset": {"path": "primary/foo.png"}}]),
        );
        let result = normalize(&primary).unwrap();
        let images = result.get("common-images").and_then(Value::as_array).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["dataset"]["path"], "primary/foo.png");
        assert_eq!(images[0]["mimetype"]["name"], "image/png");

        let derivative = hit(
            Some("1.1.5"),
            json!([{"mimetype": {"name": "image/png"}, "dataset": {"path": "derivative/foo.png"}}]),
        );
        let result = normalize(&derivative).unwrap();
        assert!(result.files().is_empty());
        assert!(result.keys().all(|k| k.parse::<CategoryTag>().is_err()));
    }

    #[test]
    fn test_version_specific_categories() {
        let objects = json!([{"mimetype": {"name": "video/mp4"}, "dataset": {"path": "primary/v.mp4"}}]);
        let old = normalize(&hit(Some("1.1.2"), objects.clone())).unwrap();
        assert!(old.get("video").is_none());
        let new = normalize(&hit(Some("1.1.3"), objects)).unwrap();
        assert!(new.get("video").is_some());
    }

    #[test]
    fn test_undefined_version_is_minimal() {
        let result = normalize(&hit(
            None,
            json!([{"mimetype": {"name": "image/png"}, "dataset": {"path": "primary/foo.png"}}]),
        ))
        .unwrap();
        assert_eq!(result.version(), SchemaVersion::Undefined);
        let keys: Vec<&str> = result.keys().collect();
        assert_eq!(keys, vec!["identifier", "name", "doi", "description"]);
        assert!(result.files().is_empty());
    }

    #[test]
    fn test_unknown_version_is_minimal() {
        let result = normalize(&hit(Some("9.9.9"), json!([]))).unwrap();
        assert_eq!(result.version(), SchemaVersion::Unknown);
        assert_eq!(result.keys().count(), 4);
    }

    #[test]
    fn test_missing_item_is_structural_error() {
        let raw = json!({"_id": "broken-7", "_source": {"objects": []}});
        match normalize(&raw) {
            Err(NormalizeError::MissingField { id, path, version }) => {
                assert_eq!(id, "broken-7");
                assert_eq!(path, "item");
                assert_eq!(version, "undefined");
            }
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_hit() {
        assert!(matches!(
            normalize(&json!([1, 2])),
            Err(NormalizeError::NotAnObject { found: "array" })
        ));
    }

    #[test]
    fn test_bare_source_accepted() {
        let raw = hit(Some("1.1.4"), json!([]));
        let bare = raw["_source"].clone();
        let a = normalize(&raw).unwrap();
        let b = normalize(&bare).unwrap();
        assert_eq!(a.to_value(), b.to_value());
    }

    #[test]
    fn test_input_not_mutated() {
        let raw = hit(
            Some("1.2.1"),
            json!([{"mimetype": {"name": "image/png"}, "dataset": {"path": "primary/foo.png"}}]),
        );
        let before = raw.clone();
        let _ = normalize(&raw).unwrap();
        assert_eq!(raw, before);
    }

    #[test]
    fn test_response_keeps_order_and_total() {
        let registry = SchemaRegistry::builtin();
        let taxonomy = Taxonomy::builtin();
        let hits: Vec<Value> = (0..20)
            .map(|i| {
                let mut h = hit(Some("1.1.5"), json!([]));
                h["_source"]["item"]["identifier"] = json!(format!("ds-{}", i));
                h
            })
            .collect();
        let response = json!({"hits": {"total": {"value": 123, "relation": "eq"}, "hits": hits}});
        let out = Normalizer::new(&registry, &taxonomy)
            .normalize_response(&response)
            .unwrap();
        assert_eq!(out.number_of_hits, 123);
        let ids: Vec<String> = out
            .results
            .iter()
            .map(|r| r.get("identifier").and_then(Value::as_str).unwrap().to_string())
            .collect();
        let expected: Vec<String> = (0..20).map(|i| format!("ds-{}", i)).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_response_legacy_total_and_missing_hits() {
        let registry = SchemaRegistry::builtin();
        let taxonomy = Taxonomy::builtin();
        let n = Normalizer::new(&registry, &taxonomy);
        let out = n
            .normalize_response(&json!({"hits": {"total": 0, "hits": []}}))
            .unwrap();
        assert_eq!(out.number_of_hits, 0);
        assert!(out.results.is_empty());
        assert!(matches!(
            n.normalize_response(&json!({"error": "boom"})),
            Err(NormalizeError::MissingHits)
        ));
    }

    #[test]
    fn test_serialized_shape() {
        let result = normalize(&hit(Some("1.1.2"), json!([]))).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, result.to_value());
        assert_eq!(json["name"], "Rat heart scaffold");
    }

    #[test]
    fn test_derived_wire_shapes() {
        let registry = SchemaRegistry::builtin();
        let taxonomy = Taxonomy::builtin();
        let response = json!({"hits": {"total": 7, "hits": [hit(Some("1.1.2"), json!([]))]}});
        let out = Normalizer::new(&registry, &taxonomy)
            .normalize_response(&response)
            .unwrap();
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["numberOfHits"], 7);
        assert!(json.get("number_of_hits").is_none());
        assert_eq!(json["results"][0]["name"], "Rat heart scaffold");

        let entry = FacetEntry {
            label: "Heart".to_string(),
            term: "organ".to_string(),
            count: 3,
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"label": "Heart", "term": "organ", "count": 3})
        );
    }

    #[test]
    fn test_reform_aggregations_merges_fields() {
        let facets = FacetTypeMap::builtin();
        let fields = facets.fields("species").unwrap();
        let mut aggregations = serde_json::Map::new();
        aggregations.insert(
            fields[0].clone(),
            json!({"buckets": [
                {"key": "rat", "doc_count": 3},
                {"key": "Mouse", "doc_count": 1}
            ]}),
        );
        aggregations.insert(
            fields[1].clone(),
            json!({"buckets": [
                {"key": "Rat", "doc_count": 2},
                {"key": "", "doc_count": 9}
            ]}),
        );
        let response = json!({ "aggregations": aggregations });
        let entries = reform_aggregation_results(&response, "species", &facets);
        assert_eq!(
            entries,
            vec![
                FacetEntry { label: "Rat".into(), term: "species".into(), count: 5 },
                FacetEntry { label: "Mouse".into(), term: "species".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_reform_unknown_term() {
        let facets = FacetTypeMap::builtin();
        assert!(reform_aggregation_results(&json!({}), "colour", &facets).is_empty());
    }
}

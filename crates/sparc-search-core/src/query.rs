//! Facet query construction.
//!
//! Translates UI filter selections into the index's `query_string` DSL.
//!
//! # Expression Shape
//!
//! - Pairs with a missing term or facet, or a "select all" facet value, are
//!   dropped.
//! - Surviving values are grouped by term in first-seen order. Values of one
//!   term are OR-ed; distinct terms are AND-ed.
//! - A term with several index fields ORs one clause per field, wrapped in
//!   parentheses: `(f1:(("a") OR ("b")) OR f2:(("a") OR ("b")))`.
//! - `datasets` is special: the value `scaffolds` emits a fixed MIME
//!   signature clause and every other value is ignored.
//! - Free text is parenthesized and AND-ed in front of the facet clause.
//! - An empty expression is never emitted; the body then only pages.
//!
//! # Example
//!
//! ```rust
//! use sparc_search_core::query::{FacetTypeMap, QueryBuilder};
//!
//! let facets = FacetTypeMap::builtin();
//! let builder = QueryBuilder::new(&facets);
//! let body = builder.build("", &[Some("organ")], &[Some("heart")], None, None);
//! assert_eq!(body.expression(), Some("anatomy.organ.name:((\"heart\"))"));
//! assert_eq!(body.size, 10);
//! assert_eq!(body.from, 0);
//! ```

use serde::Serialize;
use serde_json::{json, Value};

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Buckets requested per aggregation field.
pub const AGGREGATION_SIZE: u64 = 200;

/// Raw clause matching scaffold datasets.
pub const SCAFFOLD_CLAUSE: &str =
    "objects.additional_mimetype.name:((inode%2fvnd.abi.scaffold) AND (file))";

const DATASETS_TERM: &str = "datasets";
const SCAFFOLDS_VALUE: &str = "scaffolds";

/// Facet term → index field paths.
///
/// Field paths are full-text fields; the matching keyword field used for
/// aggregations is the path with `.aggregate` appended.
#[derive(Debug, Clone, Default)]
pub struct FacetTypeMap {
    terms: Vec<(String, Vec<String>)>,
}

impl FacetTypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The deployed facet terms.
    pub fn builtin() -> Self {
        let mut map = Self::new();
        map.insert(
            "species",
            ["organisms.primary.species.name", "organisms.sample.species.name"],
        );
        map.insert("organ", ["anatomy.organ.name"]);
        map.insert("sex", ["attributes.subject.sex.value", "attributes.sample.sex.value"]);
        map.insert("gender", ["attributes.subject.sex.value", "attributes.sample.sex.value"]);
        map.insert("age", ["attributes.subject.ageCategory.value"]);
        map.insert("techniques", ["item.techniques.keyword"]);
        map
    }

    /// Register (or replace) the fields of a term.
    pub fn insert<I, S>(&mut self, term: &str, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        match self.terms.iter_mut().find(|(t, _)| t == term) {
            Some((_, existing)) => *existing = fields,
            None => self.terms.push((term.to_string(), fields)),
        }
    }

    pub fn fields(&self, term: &str) -> Option<&[String]> {
        self.terms
            .iter()
            .find(|(t, _)| t == term)
            .map(|(_, f)| f.as_slice())
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|(t, _)| t.as_str())
    }
}

/// `{"query_string": {"query": ...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryClause {
    pub query_string: QueryString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryString {
    pub query: String,
}

/// Request body for the index `_search` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryBody {
    pub size: u64,
    pub from: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryClause>,
}

impl QueryBody {
    /// Paging-only body.
    pub fn paging(size: u64, from: u64) -> Self {
        Self {
            size,
            from,
            query: None,
        }
    }

    /// The boolean expression, if any.
    pub fn expression(&self) -> Option<&str> {
        self.query.as_ref().map(|q| q.query_string.query.as_str())
    }

    pub fn to_value(&self) -> Value {
        match self.expression() {
            Some(expr) => json!({
                "size": self.size,
                "from": self.from,
                "query": {"query_string": {"query": expr}},
            }),
            None => json!({"size": self.size, "from": self.from}),
        }
    }
}

/// A caller's filter selection, as extracted from request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetSelection {
    pub query: String,
    pub terms: Vec<Option<String>>,
    pub facets: Vec<Option<String>>,
    pub size: Option<u64>,
    pub start: Option<u64>,
}

/// Builds query bodies against a [`FacetTypeMap`].
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    facets: &'a FacetTypeMap,
    default_size: u64,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(facets: &'a FacetTypeMap) -> Self {
        Self {
            facets,
            default_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_default_size(mut self, size: u64) -> Self {
        self.default_size = size;
        self
    }

    /// Build a body from parallel `terms` / `facets` sequences.
    ///
    /// Sequences of different lengths are tolerated: an index present in only
    /// one of them counts as a missing entry and is dropped.
    pub fn build<T, F>(
        &self,
        free_text: &str,
        terms: &[Option<T>],
        facets: &[Option<F>],
        size: Option<u64>,
        start: Option<u64>,
    ) -> QueryBody
    where
        T: AsRef<str>,
        F: AsRef<str>,
    {
        let size = size.unwrap_or(self.default_size);
        let from = start.unwrap_or(0);

        let groups = group_selections(terms, facets);
        let facet_clause = groups
            .iter()
            .filter_map(|(term, values)| self.term_clause(term, values))
            .collect::<Vec<_>>()
            .join(" AND ");

        let free_text = free_text.trim();
        let mut parts = Vec::with_capacity(2);
        if !free_text.is_empty() {
            parts.push(format!("({})", free_text));
        }
        if !facet_clause.is_empty() {
            parts.push(facet_clause);
        }

        if parts.is_empty() {
            return QueryBody::paging(size, from);
        }
        QueryBody {
            size,
            from,
            query: Some(QueryClause {
                query_string: QueryString {
                    query: parts.join(" AND "),
                },
            }),
        }
    }

    /// Build a body from a [`FacetSelection`].
    pub fn build_selection(&self, selection: &FacetSelection) -> QueryBody {
        self.build(
            &selection.query,
            &selection.terms,
            &selection.facets,
            selection.size,
            selection.start,
        )
    }

    fn term_clause(&self, term: &str, values: &[&str]) -> Option<String> {
        if term == DATASETS_TERM {
            return values
                .iter()
                .any(|v| v.eq_ignore_ascii_case(SCAFFOLDS_VALUE))
                .then(|| SCAFFOLD_CLAUSE.to_string());
        }
        let Some(fields) = self.facets.fields(term).filter(|f| !f.is_empty()) else {
            tracing::debug!(term, "no index fields registered for facet term, ignoring");
            return None;
        };
        let alternatives = values
            .iter()
            .map(|v| format!("(\"{}\")", escape_phrase(v)))
            .collect::<Vec<_>>()
            .join(" OR ");
        let per_field: Vec<String> = fields
            .iter()
            .map(|field| format!("{}:({})", field, alternatives))
            .collect();
        if per_field.len() == 1 {
            per_field.into_iter().next()
        } else {
            Some(format!("({})", per_field.join(" OR ")))
        }
    }
}

/// Whether a facet value means "no filter" (e.g. `All Species`, `Show all`).
///
/// Matches when any whitespace-separated word is `all` or `show`,
/// ignoring case. Values merely containing those letters, like
/// `Gallbladder`, are not sentinels.
pub fn is_select_all(value: &str) -> bool {
    value
        .split_whitespace()
        .any(|w| w.eq_ignore_ascii_case("all") || w.eq_ignore_ascii_case("show"))
}

/// Group surviving `(term, facet)` pairs by term, preserving first-seen
/// order of both terms and values.
fn group_selections<'s, T, F>(terms: &'s [Option<T>], facets: &'s [Option<F>]) -> Vec<(&'s str, Vec<&'s str>)>
where
    T: AsRef<str>,
    F: AsRef<str>,
{
    let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
    for i in 0..terms.len().max(facets.len()) {
        let term = terms.get(i).and_then(Option::as_ref).map(|t| t.as_ref().trim());
        let facet = facets.get(i).and_then(Option::as_ref).map(|f| f.as_ref().trim());
        let (term, facet) = match (term, facet) {
            (Some(t), Some(f)) if !t.is_empty() && !f.is_empty() && !is_select_all(f) => (t, f),
            _ => continue,
        };
        match groups.iter_mut().find(|(t, _)| *t == term) {
            Some((_, values)) => {
                if !values.contains(&facet) {
                    values.push(facet);
                }
            }
            None => groups.push((term, vec![facet])),
        }
    }
    groups
}

fn escape_phrase(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Terms aggregation over every field of `term`, returning no hits.
///
/// Aggregations are named after the full-text field path so that
/// [`reform_aggregation_results`](crate::normalize::reform_aggregation_results)
/// can find them again. Returns `None` for unknown terms.
pub fn facet_aggregation_query(term: &str, facets: &FacetTypeMap) -> Option<Value> {
    let fields = facets.fields(term)?;
    let aggregations: serde_json::Map<String, Value> = fields
        .iter()
        .map(|field| {
            (
                field.clone(),
                json!({
                    "terms": {
                        "field": format!("{}.aggregate", field),
                        "size": AGGREGATION_SIZE,
                        "order": {"_count": "desc"},
                    }
                }),
            )
        })
        .collect();
    Some(json!({"from": 0, "size": 0, "aggregations": aggregations}))
}

/// Compact `DOI:xxxx` form of a DOI given as URL, CURIE or bare identifier.
pub fn doi_curie(doi: &str) -> String {
    let doi = doi.trim();
    let bare = doi
        .strip_prefix("https://doi.org/")
        .or_else(|| doi.strip_prefix("http://doi.org/"))
        .or_else(|| {
            (doi.len() >= 4 && doi.is_char_boundary(4) && doi[..4].eq_ignore_ascii_case("doi:"))
                .then(|| &doi[4..])
        })
        .unwrap_or(doi);
    format!("DOI:{}", bare)
}

/// Exact lookup of one dataset by DOI.
pub fn doi_query(doi: &str) -> Value {
    json!({
        "size": DEFAULT_PAGE_SIZE,
        "from": 0,
        "query": {"term": {"item.curie": doi_curie(doi)}},
    })
}

/// Exact lookup of one dataset by its platform identifier.
pub fn identifier_query(identifier: &str) -> Value {
    json!({
        "size": 1,
        "from": 0,
        "query": {"term": {"pennsieve.identifier": identifier.trim()}},
    })
}

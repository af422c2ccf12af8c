//! Search operations shared by the CLI and the HTTP server.
//!
//! A [`SearchContext`] owns the immutable core tables built from
//! configuration. A [`Searcher`] pairs a shared context with a
//! [`SearchIndex`] and runs one operation: build the request body, send it,
//! normalize the response.
//!
//! Page normalization fans out over rayon, so it runs on tokio's blocking
//! pool rather than on an async worker.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use sparc_search_core::index::SearchIndex;
use sparc_search_core::normalize::{
    reform_aggregation_results, FacetEntry, NormalizedResult, Normalizer, SearchResults,
};
use sparc_search_core::query::{
    doi_query, facet_aggregation_query, FacetSelection, FacetTypeMap, QueryBody, QueryBuilder,
};
use sparc_search_core::schema::SchemaRegistry;
use sparc_search_core::taxonomy::Taxonomy;

use crate::config::Config;
use crate::scicrunch::SciCrunchIndex;

/// Immutable tables every search operation reads.
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub registry: SchemaRegistry,
    pub taxonomy: Taxonomy,
    pub facets: FacetTypeMap,
    pub default_size: u64,
}

impl SearchContext {
    pub fn from_config(config: &Config) -> Self {
        Self {
            registry: SchemaRegistry::builtin(),
            taxonomy: config.taxonomy(),
            facets: config.facet_map(),
            default_size: config.query.default_size,
        }
    }

    pub fn normalizer(&self) -> Normalizer<'_> {
        Normalizer::new(&self.registry, &self.taxonomy)
    }

    pub fn query_builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.facets).with_default_size(self.default_size)
    }

    pub fn searcher<'a>(self: &Arc<Self>, index: &'a dyn SearchIndex) -> Searcher<'a> {
        Searcher {
            context: Arc::clone(self),
            index,
        }
    }
}

/// One search operation against an index.
pub struct Searcher<'a> {
    context: Arc<SearchContext>,
    index: &'a dyn SearchIndex,
}

impl<'a> Searcher<'a> {
    /// Facet search: selection → query body → normalized results.
    pub async fn search(&self, selection: &FacetSelection) -> Result<SearchResults> {
        let body = self.context.query_builder().build_selection(selection);
        let response = self.index.search(&body.to_value()).await?;
        self.normalize_page(response).await
    }

    /// Distinct values of a facet term with document counts.
    pub async fn facets(&self, term: &str) -> Result<Vec<FacetEntry>> {
        let Some(body) = facet_aggregation_query(term, &self.context.facets) else {
            bail!("unknown facet term: {}", term);
        };
        let response = self.index.search(&body).await?;
        Ok(reform_aggregation_results(&response, term, &self.context.facets))
    }

    /// A single dataset by index id.
    pub async fn dataset(&self, id: &str) -> Result<Option<NormalizedResult>> {
        match self.index.get(id).await? {
            Some(hit) => Ok(Some(self.context.normalizer().normalize(&hit)?)),
            None => Ok(None),
        }
    }

    /// Datasets published under a DOI (URL or `DOI:` form).
    pub async fn by_doi(&self, doi: &str) -> Result<SearchResults> {
        let response = self.index.search(&doi_query(doi)).await?;
        self.normalize_page(response).await
    }

    /// Normalize a full response on the blocking pool.
    async fn normalize_page(&self, response: Value) -> Result<SearchResults> {
        let context = Arc::clone(&self.context);
        let results = tokio::task::spawn_blocking(move || {
            context.normalizer().normalize_response(&response)
        })
        .await
        .context("normalization task panicked")??;
        Ok(results)
    }
}

/// Build a [`FacetSelection`] from parallel CLI argument lists.
pub fn selection_from_args(
    text: Option<String>,
    terms: Vec<String>,
    facets: Vec<String>,
    size: Option<u64>,
    start: Option<u64>,
) -> FacetSelection {
    FacetSelection {
        query: text.unwrap_or_default(),
        terms: terms.into_iter().map(Some).collect(),
        facets: facets.into_iter().map(Some).collect(),
        size,
        start,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `sparc query`: print the request body without sending it.
pub fn run_query(config: &Config, selection: &FacetSelection) -> Result<QueryBody> {
    let context = SearchContext::from_config(config);
    let body = context.query_builder().build_selection(selection);
    print_json(&body)?;
    Ok(body)
}

/// `sparc search`: send a facet search and print normalized results.
pub async fn run_search(config: &Config, selection: &FacetSelection) -> Result<()> {
    let context = Arc::new(SearchContext::from_config(config));
    let index = SciCrunchIndex::new(&config.index)?;
    let results = context.searcher(&index).search(selection).await?;
    if results.results.is_empty() {
        eprintln!("No results.");
    }
    print_json(&results)
}

/// `sparc facets`: print the facet values of a term.
pub async fn run_facets(config: &Config, term: &str) -> Result<()> {
    let context = Arc::new(SearchContext::from_config(config));
    let index = SciCrunchIndex::new(&config.index)?;
    let entries = context.searcher(&index).facets(term).await?;
    print_json(&entries)
}

/// `sparc normalize`: normalize a saved search response or a single hit.
pub fn run_normalize(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let raw: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;
    print_json(&normalize_document(config, &raw)?)
}

/// A full response (anything with a `hits` key) yields
/// `{numberOfHits, results}`; anything else is normalized as one hit.
pub fn normalize_document(config: &Config, raw: &Value) -> Result<Value> {
    let context = SearchContext::from_config(config);
    let normalizer = context.normalizer();
    let value = if raw.get("hits").is_some() {
        serde_json::to_value(normalizer.normalize_response(raw)?)?
    } else {
        normalizer.normalize(raw)?.to_value()
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sparc_search_core::index::memory::InMemoryIndex;

    fn hit(id: &str) -> Value {
        json!({
            "item": {
                "identifier": id,
                "name": "Stomach innervation",
                "curie": "DOI:10.26275/xyz",
                "version": {"keyword": "1.1.4"},
            },
            "pennsieve": {"identifier": id},
        })
    }

    #[tokio::test]
    async fn test_search_uses_configured_page_size() {
        let mut config = Config::minimal();
        config.query.default_size = 3;
        let context = Arc::new(SearchContext::from_config(&config));
        let index = InMemoryIndex::new().with_document("1", hit("1"));

        let selection = selection_from_args(None, vec![], vec![], None, None);
        let results = context.searcher(&index).search(&selection).await.unwrap();
        assert_eq!(results.number_of_hits, 1);
        assert_eq!(index.requests()[0], json!({"size": 3, "from": 0}));
    }

    #[tokio::test]
    async fn test_dataset_lookup() {
        let context = Arc::new(SearchContext::from_config(&Config::minimal()));
        let index = InMemoryIndex::new().with_document("1", hit("1"));
        let searcher = context.searcher(&index);

        let found = searcher.dataset("1").await.unwrap().unwrap();
        assert_eq!(found.get("doi"), Some(&json!("https://doi.org/10.26275/xyz")));
        assert!(searcher.dataset("2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_facet_term() {
        let context = Arc::new(SearchContext::from_config(&Config::minimal()));
        let index = InMemoryIndex::new();
        let err = context.searcher(&index).facets("colour").await.unwrap_err();
        assert!(err.to_string().contains("unknown facet term"));
        assert!(index.requests().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_page_normalization_on_single_thread_runtime() {
        let context = Arc::new(SearchContext::from_config(&Config::minimal()));
        let mut index = InMemoryIndex::new();
        for id in 0..40 {
            index = index.with_document(id.to_string(), hit(&id.to_string()));
        }

        let selection = selection_from_args(None, vec![], vec![], Some(40), None);
        let results = context.searcher(&index).search(&selection).await.unwrap();
        assert_eq!(results.number_of_hits, 40);
        for (position, result) in results.results.iter().enumerate() {
            assert_eq!(result.get("identifier"), Some(&json!(position.to_string())));
        }
    }

    #[tokio::test]
    async fn test_structural_error_survives_blocking_pool() {
        let context = Arc::new(SearchContext::from_config(&Config::minimal()));
        let index = InMemoryIndex::new().with_document("1", json!({"pennsieve": {"identifier": "1"}}));
        let selection = selection_from_args(None, vec![], vec![], None, None);
        let err = context.searcher(&index).search(&selection).await.unwrap_err();
        assert!(err.downcast_ref::<sparc_search_core::NormalizeError>().is_some());
    }

    #[test]
    fn test_normalize_document_shapes() {
        let config = Config::minimal();
        let single = normalize_document(&config, &hit("7")).unwrap();
        assert_eq!(single["identifier"], "7");

        let response = json!({"hits": {"total": 1, "hits": [{"_id": "7", "_source": hit("7")}]}});
        let wrapped = normalize_document(&config, &response).unwrap();
        assert_eq!(wrapped["numberOfHits"], 1);
        assert_eq!(wrapped["results"][0]["identifier"], "7");
    }

    #[test]
    fn test_selection_from_args() {
        let selection = selection_from_args(
            Some("heart".into()),
            vec!["organ".into()],
            vec!["heart".into(), "lung".into()],
            Some(5),
            None,
        );
        assert_eq!(selection.terms, vec![Some("organ".to_string())]);
        assert_eq!(selection.facets.len(), 2);
        assert_eq!(selection.query, "heart");
    }
}

//! In-memory [`SearchIndex`] for tests and offline use.
//!
//! Documents are kept in insertion order. Paging (`from`/`size`) and exact
//! `term` queries are honored; `query_string` expressions are recorded but
//! not evaluated, so every document matches them.
//!
//! A panic while a lock is held does not lose data: every access recovers
//! the guard from a poisoned lock.

use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::path::path_get;

use super::SearchIndex;

/// In-memory index holding raw `_source` documents.
pub struct InMemoryIndex {
    docs: RwLock<Vec<(String, Value)>>,
    aggregations: RwLock<Option<Value>>,
    requests: RwLock<Vec<Value>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
            aggregations: RwLock::new(None),
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Add (or replace) a document.
    pub fn insert(&self, id: impl Into<String>, source: Value) {
        let id = id.into();
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        match docs.iter_mut().find(|(existing, _)| *existing == id) {
            Some((_, doc)) => *doc = source,
            None => docs.push((id, source)),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_document(self, id: impl Into<String>, source: Value) -> Self {
        self.insert(id, source);
        self
    }

    /// Canned `aggregations` object returned with every search response.
    pub fn with_aggregations(self, aggregations: Value) -> Self {
        *self
            .aggregations
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(aggregations);
        self
    }

    /// Every body passed to [`SearchIndex::search`], oldest first.
    pub fn requests(&self) -> Vec<Value> {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// `(path, expected)` of a `{"query": {"term": {path: expected}}}` body.
fn term_filter(body: &Value) -> Option<(Vec<&str>, &Value)> {
    let term = body.get("query")?.get("term")?.as_object()?;
    let (path, expected) = term.iter().next()?;
    Some((path.split('.').collect(), expected))
}

fn as_hit(id: &str, source: &Value) -> Value {
    json!({"_id": id, "_source": source})
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn search(&self, body: &Value) -> Result<Value> {
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(body.clone());

        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let filter = term_filter(body);
        let matching: Vec<&(String, Value)> = docs
            .iter()
            .filter(|(_, source)| match &filter {
                Some((path, expected)) => path_get(source, path.as_slice()) == Some(*expected),
                None => true,
            })
            .collect();

        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        let hits: Vec<Value> = matching
            .iter()
            .skip(from)
            .take(size)
            .map(|(id, source)| as_hit(id, source))
            .collect();

        let mut response = json!({
            "hits": {
                "total": {"value": matching.len(), "relation": "eq"},
                "hits": hits,
            }
        });
        if let Some(aggregations) = self
            .aggregations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            response["aggregations"] = aggregations.clone();
        }
        Ok(response)
    }

    async fn get(&self, id: &str) -> Result<Option<Value>> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(docs
            .iter()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(doc_id, source)| as_hit(doc_id, source)))
    }
}

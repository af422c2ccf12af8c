//! Search index abstraction.
//!
//! The [`SearchIndex`] trait is the only seam between the pure normalization
//! and query logic in this crate and the remote document index. Callers hand
//! it the JSON bodies produced by [`query`](crate::query) and feed the raw
//! responses to [`normalize`](crate::normalize).
//!
//! Implementations must be `Send + Sync` to be shared across request
//! handlers.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A remote (or in-memory) document index.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`search`](SearchIndex::search) | Run a query body, return the raw response |
/// | [`get`](SearchIndex::get) | Fetch a single document by id |
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Execute a query body against the index.
    ///
    /// Returns the response verbatim, including `hits` and any
    /// `aggregations`.
    async fn search(&self, body: &Value) -> Result<Value>;

    /// Fetch one document by index id.
    ///
    /// Returns the document wrapped as a hit (`{"_id", "_source"}`), or
    /// `None` if the index has no such document.
    async fn get(&self, id: &str) -> Result<Option<Value>>;
}

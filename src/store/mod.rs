//! Document store abstraction.
//!
//! The [`DocumentStore`] trait is the full contract the core needs from the
//! backing search engine: existence check, collection creation, health,
//! bulk writes, and query execution. Two implementations ship with the
//! crate:
//!
//! - [`http::ElasticsearchStore`] talks to an Elasticsearch-compatible REST API.
//! - [`memory::InMemoryStore`] evaluates compiled queries in-process.
//!
//! Response types in this module mirror the store's wire format, including
//! its loosely-typed corners (the total hit count may be a bare number or an
//! object). They are normalized once, in [`crate::search`].

pub mod http;
pub mod memory;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::StoreError;
use crate::models::Document;
use crate::query::SearchBody;

/// Collection health as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All shards allocated.
    Green,
    /// Primaries allocated, replicas missing; queries are served.
    Yellow,
    /// Not serving reliably.
    Red,
}

impl HealthStatus {
    pub fn is_serving(self) -> bool {
        matches!(self, HealthStatus::Green | HealthStatus::Yellow)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Green => "green",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Red => "red",
        };
        f.write_str(s)
    }
}

/// Options attached to every bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Make the writes visible to search before the request returns.
    pub refresh: bool,
    pub timeout: Duration,
}

/// Outcome of one document within a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub id: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkResponse {
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|i| i.error.is_some())
    }

    pub fn has_errors(&self) -> bool {
        self.failed_items().next().is_some()
    }
}

// ============ Search response (wire shape) ============

#[derive(Debug, Clone, Deserialize)]
pub struct RawSearchResponse {
    pub hits: RawHits,
    #[serde(default)]
    pub aggregations: Option<RawAggregations>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawHits {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<RawHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_source")]
    pub source: Document,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
}

/// The two shapes a store may use for the total hit count.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Tracked { value: u64, relation: TotalRelation },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalRelation {
    /// Exact count.
    Eq,
    /// Lower bound.
    Gte,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAggregations {
    #[serde(default)]
    pub years: Option<RawTerms>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTerms {
    #[serde(default)]
    pub buckets: Vec<RawBucket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBucket {
    pub key: Value,
    #[serde(default)]
    pub doc_count: u64,
}

/// Abstract backing store for one collection at a time.
///
/// All operations are async (via `async-trait`). Implementations must be
/// `Send + Sync` so one store can be shared across concurrent callers.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`index_exists`](DocumentStore::index_exists) | Does the collection exist? |
/// | [`create_index`](DocumentStore::create_index) | Create it with settings + mappings |
/// | [`health`](DocumentStore::health) | Current collection health |
/// | [`bulk_index`](DocumentStore::bulk_index) | Write a batch of documents |
/// | [`search`](DocumentStore::search) | Execute a compiled search body |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError>;

    /// `definition` holds `settings` and `mappings`. Creating an index that
    /// already exists succeeds and leaves it untouched.
    async fn create_index(&self, index: &str, definition: &Value) -> Result<(), StoreError>;

    async fn health(&self, index: &str) -> Result<HealthStatus, StoreError>;

    /// Index every document using its date as the document id.
    ///
    /// A returned `Ok` may still carry per-document errors.
    async fn bulk_index(
        &self,
        index: &str,
        docs: &[Document],
        options: BulkOptions,
    ) -> Result<BulkResponse, StoreError>;

    async fn search(&self, index: &str, body: &SearchBody)
        -> Result<RawSearchResponse, StoreError>;
}

//! Search orchestration.
//!
//! [`Searcher::search`] compiles a [`SearchRequest`], executes it against
//! the store, and normalizes the store's loosely-typed response into a
//! [`SearchResult`]:
//!
//! - the total is resolved to one integer whether the store sent a bare
//!   number or a `{value, relation}` object, and defaults to 0 when absent
//! - year buckets become `(key, doc_count)` pairs sorted by year descending,
//!   or an empty list when aggregations are absent
//!
//! No retries happen here. A store failure surfaces as
//! [`Error::QueryExecution`], which callers can tell apart from an empty
//! result.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lifecycle::IndexManager;
use crate::models::{SearchRequest, SearchResult, YearBucket};
use crate::query;
use crate::store::{RawAggregations, RawSearchResponse, TotalHits};

pub struct Searcher {
    manager: Arc<IndexManager>,
}

impl Searcher {
    pub fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        if request.limit == 0 {
            return Err(Error::InvalidRequest("limit must be > 0".to_string()));
        }

        self.manager.ensure_ready().await?;

        let body = query::compile(&request.text, request.year_filter.as_deref())
            .into_body(request.offset, request.limit);

        let started = Instant::now();
        let response = self
            .manager
            .store()
            .search(self.manager.index(), &body)
            .await
            .map_err(|e| {
                warn!(error = %e, text = %request.text, "search failed");
                Error::QueryExecution(e)
            })?;

        let result = normalize(response);
        debug!(
            text = %request.text,
            year = request.year_filter.as_deref().unwrap_or(""),
            total = result.total_matches,
            returned = result.items.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );
        Ok(result)
    }
}

/// Collapse a raw store response into the stable result contract.
pub fn normalize(response: RawSearchResponse) -> SearchResult {
    SearchResult {
        total_matches: normalize_total(response.hits.total.as_ref()),
        year_buckets: normalize_buckets(response.aggregations.as_ref()),
        items: response.hits.hits.into_iter().map(|h| h.source).collect(),
    }
}

pub fn normalize_total(total: Option<&TotalHits>) -> u64 {
    match total {
        Some(TotalHits::Count(n)) => *n,
        Some(TotalHits::Tracked { value, .. }) => *value,
        None => 0,
    }
}

fn bucket_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric years order by value; keys that do not parse sort after them.
fn year_order(bucket: &YearBucket) -> (Option<i64>, &str) {
    (bucket.key.parse().ok(), bucket.key.as_str())
}

pub fn normalize_buckets(aggregations: Option<&RawAggregations>) -> Vec<YearBucket> {
    let mut buckets: Vec<YearBucket> = aggregations
        .and_then(|a| a.years.as_ref())
        .map(|terms| {
            terms
                .buckets
                .iter()
                .map(|b| YearBucket {
                    key: bucket_key(&b.key),
                    doc_count: b.doc_count,
                })
                .collect()
        })
        .unwrap_or_default();
    buckets.sort_by(|a, b| year_order(b).cmp(&year_order(a)));
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::store::memory::InMemoryStore;
    use crate::store::testing::ScriptedStore;
    use crate::store::TotalRelation;
    use serde_json::json;
    use std::time::Duration;

    fn raw(value: serde_json::Value) -> RawSearchResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_total_shapes_normalize_equally() {
        let bare = raw(json!({ "hits": { "total": 7, "hits": [] } }));
        let tracked = raw(json!({ "hits": { "total": { "value": 7, "relation": "eq" }, "hits": [] } }));
        let missing = raw(json!({ "hits": { "hits": [] } }));

        assert_eq!(normalize(bare).total_matches, 7);
        assert_eq!(normalize(tracked).total_matches, 7);
        assert_eq!(normalize(missing).total_matches, 0);
        assert_eq!(
            normalize_total(Some(&TotalHits::Tracked {
                value: 10_000,
                relation: TotalRelation::Gte
            })),
            10_000
        );
    }

    #[test]
    fn test_buckets_default_empty_and_sorted() {
        let none = raw(json!({ "hits": { "hits": [] } }));
        assert!(normalize(none).year_buckets.is_empty());

        let no_years = raw(json!({ "hits": { "hits": [] }, "aggregations": {} }));
        assert!(normalize(no_years).year_buckets.is_empty());

        let unordered = raw(json!({
            "hits": { "hits": [] },
            "aggregations": { "years": { "buckets": [
                { "key": "2019", "doc_count": 3 },
                { "key": 2023, "doc_count": 1 },
                { "key": "2021", "doc_count": 2 }
            ] } }
        }));
        let buckets = normalize(unordered).year_buckets;
        let keys: Vec<&str> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["2023", "2021", "2019"]);
        assert_eq!(buckets[0].doc_count, 1);
    }

    #[test]
    fn test_buckets_sort_years_numerically() {
        let response = raw(json!({
            "hits": { "hits": [] },
            "aggregations": { "years": { "buckets": [
                { "key": "999", "doc_count": 1 },
                { "key": "2023", "doc_count": 2 },
                { "key": "10000", "doc_count": 1 }
            ] } }
        }));
        let keys: Vec<String> = normalize(response)
            .year_buckets
            .into_iter()
            .map(|b| b.key)
            .collect();
        assert_eq!(keys, vec!["10000", "2023", "999"]);
    }

    fn searcher_over(store: Arc<dyn crate::store::DocumentStore>) -> Searcher {
        let manager = IndexManager::new(store, "nasa-apod", RetryPolicy::fixed(1, Duration::ZERO));
        Searcher::new(Arc::new(manager))
    }

    #[tokio::test]
    async fn test_zero_limit_is_rejected() {
        let searcher = searcher_over(Arc::new(InMemoryStore::new()));
        let err = searcher
            .search(&SearchRequest::new("moon").with_window(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_query_execution_error() {
        let searcher = searcher_over(Arc::new(ScriptedStore::new(true)));
        let err = searcher.search(&SearchRequest::new("moon")).await.unwrap_err();
        assert!(matches!(err, Error::QueryExecution(_)));
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_empty_collection_is_ok_not_error() {
        let searcher = searcher_over(Arc::new(InMemoryStore::new()));
        let result = searcher.search(&SearchRequest::new("")).await.unwrap();
        assert_eq!(result.total_matches, 0);
        assert!(result.items.is_empty());
        assert!(result.year_buckets.is_empty());
    }
}

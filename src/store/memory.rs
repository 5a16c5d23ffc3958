//! In-memory [`DocumentStore`] implementation for tests and offline use.
//!
//! Documents are kept per index in a `BTreeMap` keyed by document id (the
//! entry date), behind a `tokio::sync::RwLock`. Compiled queries are
//! evaluated directly against the stored documents with a simplified
//! scoring model:
//!
//! - `match`: matched query terms × boost
//! - `match_phrase`: phrase length × boost when the phrase occurs contiguously
//! - `multi_match`: best field's fuzzily matched terms × field boost
//! - `term`/`match_all`: constant 1.0
//!
//! Text goes through [`schema::analyze`], approximating the standard
//! analyzer. Health is always green once the index exists.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{
    BulkItem, BulkOptions, BulkResponse, DocumentStore, HealthStatus, RawAggregations, RawBucket,
    RawHit, RawHits, RawSearchResponse, RawTerms, TotalHits, TotalRelation,
};
use crate::error::StoreError;
use crate::models::Document;
use crate::query::{BoolQuery, MultiMatch, Query, SearchBody, SortKey, SortOrder};
use crate::schema::{self, DATE_FIELD, EXPLANATION_FIELD, TITLE_FIELD, TITLE_KEYWORD_FIELD, YEAR_FIELD};

struct StoredIndex {
    definition: Value,
    docs: BTreeMap<String, Document>,
}

/// In-memory store for testing and offline runs.
pub struct InMemoryStore {
    indices: RwLock<HashMap<String, StoredIndex>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
        }
    }

    /// Number of documents currently stored in `index`.
    pub async fn doc_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .await
            .get(index)
            .map(|i| i.docs.len())
            .unwrap_or(0)
    }

    /// The definition `index` was created with, if it exists.
    pub async fn definition(&self, index: &str) -> Option<Value> {
        self.indices
            .read()
            .await
            .get(index)
            .map(|i| i.definition.clone())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Field access ============

fn text_field<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    match field {
        TITLE_FIELD => Some(&doc.title),
        EXPLANATION_FIELD => Some(&doc.explanation),
        _ => None,
    }
}

fn keyword_field(doc: &Document, field: &str) -> Option<String> {
    match field {
        YEAR_FIELD | "year" => Some(doc.year()),
        TITLE_KEYWORD_FIELD => Some(doc.title.clone()),
        DATE_FIELD => Some(doc.id()),
        "image_url" => Some(doc.image_url.clone()),
        "authors" => Some(doc.authors.clone()),
        _ => None,
    }
}

// ============ Scoring ============

/// Score `doc` against `query`; `None` means it does not match.
fn score(query: &Query, doc: &Document) -> Option<f64> {
    match query {
        Query::MatchAll => Some(1.0),
        Query::Term { field, value } => {
            (keyword_field(doc, field).as_deref() == Some(value.as_str())).then_some(1.0)
        }
        Query::Match {
            field,
            query,
            boost,
        } => {
            let tokens = schema::analyze(text_field(doc, field)?);
            let matched = schema::analyze(query)
                .iter()
                .filter(|t| tokens.contains(t))
                .count();
            (matched > 0).then(|| matched as f64 * f64::from(*boost))
        }
        Query::MatchPhrase {
            field,
            query,
            boost,
        } => {
            let tokens = schema::analyze(text_field(doc, field)?);
            let phrase = schema::analyze(query);
            if phrase.is_empty() || phrase.len() > tokens.len() {
                return None;
            }
            tokens
                .windows(phrase.len())
                .any(|w| w == phrase.as_slice())
                .then(|| phrase.len() as f64 * f64::from(*boost))
        }
        Query::MultiMatch(m) => score_multi_match(m, doc),
        Query::Bool(b) => score_bool(b, doc),
    }
}

fn score_bool(b: &BoolQuery, doc: &Document) -> Option<f64> {
    let mut total = 0.0;
    for clause in &b.must {
        total += score(clause, doc)?;
    }
    for clause in &b.filter {
        score(clause, doc)?;
    }
    let mut should_matched = 0u32;
    for clause in &b.should {
        if let Some(s) = score(clause, doc) {
            should_matched += 1;
            total += s;
        }
    }
    let required = match b.minimum_should_match {
        Some(n) => n,
        // With no scoring or filtering clauses, at least one should must match.
        None if b.must.is_empty() && b.filter.is_empty() && !b.should.is_empty() => 1,
        None => 0,
    };
    if should_matched < required {
        return None;
    }
    if total == 0.0 {
        total = 1.0;
    }
    Some(total)
}

fn fuzzy_eq(term: &str, token: &str, max_edits: usize) -> bool {
    if max_edits == 0 {
        term == token
    } else {
        strsim::osa_distance(term, token) <= max_edits
    }
}

fn score_multi_match(m: &MultiMatch, doc: &Document) -> Option<f64> {
    let terms = schema::analyze(&m.query);
    if terms.is_empty() {
        return None;
    }
    let required = (terms.len() * usize::from(m.minimum_terms_percent) / 100).max(1);

    m.fields
        .iter()
        .filter_map(|(field, boost)| {
            let tokens = schema::analyze(text_field(doc, field)?);
            let matched = terms
                .iter()
                .filter(|term| {
                    let edits = m.fuzziness.max_edits(term.chars().count());
                    tokens.iter().any(|tok| fuzzy_eq(term, tok, edits))
                })
                .count();
            (matched >= required).then(|| matched as f64 * f64::from(*boost))
        })
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

fn compare_hits(sort: &[SortKey], a: &(f64, &Document), b: &(f64, &Document)) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    for key in sort {
        let ord = match key {
            SortKey::Score => b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal),
            SortKey::Field { field, order } => {
                let ord = keyword_field(a.1, field).cmp(&keyword_field(b.1, field));
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        Ok(self.indices.read().await.contains_key(index))
    }

    async fn create_index(&self, index: &str, definition: &Value) -> Result<(), StoreError> {
        let mut indices = self.indices.write().await;
        if indices.contains_key(index) {
            // Lost a creation race; the existing index and its documents stay.
            return Ok(());
        }
        indices.insert(
            index.to_string(),
            StoredIndex {
                definition: definition.clone(),
                docs: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn health(&self, index: &str) -> Result<HealthStatus, StoreError> {
        if self.indices.read().await.contains_key(index) {
            Ok(HealthStatus::Green)
        } else {
            Ok(HealthStatus::Red)
        }
    }

    async fn bulk_index(
        &self,
        index: &str,
        docs: &[Document],
        _options: BulkOptions,
    ) -> Result<BulkResponse, StoreError> {
        // Writes are visible immediately, so `refresh` needs no handling.
        let mut indices = self.indices.write().await;
        let stored = indices
            .entry(index.to_string())
            .or_insert_with(|| StoredIndex {
                definition: Value::Null,
                docs: BTreeMap::new(),
            });
        let items = docs
            .iter()
            .map(|doc| {
                let id = doc.id();
                stored.docs.insert(id.clone(), doc.clone());
                BulkItem { id, error: None }
            })
            .collect();
        Ok(BulkResponse { items })
    }

    async fn search(
        &self,
        index: &str,
        body: &SearchBody,
    ) -> Result<RawSearchResponse, StoreError> {
        let indices = self.indices.read().await;
        let stored = indices.get(index).ok_or_else(|| StoreError::Rejected {
            status: 404,
            body: format!("no such index [{}]", index),
        })?;

        let mut matched: Vec<(f64, &Document)> = stored
            .docs
            .values()
            .filter_map(|doc| score(&body.compiled.query, doc).map(|s| (s, doc)))
            .collect();
        matched.sort_by(|a, b| compare_hits(&body.compiled.sort, a, b));

        let agg = &body.compiled.aggregation;
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for (_, doc) in &matched {
            if let Some(key) = keyword_field(doc, &agg.field) {
                *counts.entry(key).or_insert(0) += 1;
            }
        }
        let mut buckets: Vec<RawBucket> = counts
            .into_iter()
            .map(|(key, doc_count)| RawBucket {
                key: Value::String(key),
                doc_count,
            })
            .collect();
        if agg.key_order == SortOrder::Desc {
            buckets.reverse();
        }
        buckets.truncate(agg.size);

        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(body.from)
            .take(body.size)
            .map(|(s, doc)| RawHit {
                source: doc.clone(),
                score: Some(s),
            })
            .collect();

        let mut aggregations = RawAggregations { years: None };
        if agg.name == "years" {
            aggregations.years = Some(RawTerms { buckets });
        }

        Ok(RawSearchResponse {
            hits: RawHits {
                total: Some(TotalHits::Tracked {
                    value: total,
                    relation: TotalRelation::Eq,
                }),
                hits,
            },
            aggregations: Some(aggregations),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::compile;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn doc(date: &str, title: &str, explanation: &str) -> Document {
        Document {
            title: title.to_string(),
            explanation: explanation.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            image_url: String::new(),
            authors: String::new(),
        }
    }

    fn options() -> BulkOptions {
        BulkOptions {
            refresh: true,
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_duplicate_create_keeps_existing_index() {
        let store = seeded().await;
        store
            .create_index("apod", &serde_json::json!({ "settings": {} }))
            .await
            .unwrap();
        assert_eq!(store.doc_count("apod").await, 4);
        assert_eq!(
            store.definition("apod").await,
            Some(crate::schema::index_definition())
        );
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .create_index("apod", &crate::schema::index_definition())
            .await
            .unwrap();
        store
            .bulk_index(
                "apod",
                &[
                    doc("2021-03-01", "Crab Nebula", "A supernova remnant in Taurus."),
                    doc("2022-07-04", "The Crab Nebula in Infrared", "Webb looks at the crab."),
                    doc("2023-01-10", "Orion Rising", "The nebula of Orion over a crab-shaped hill."),
                    doc("2023-05-20", "Moon and Venus", "A conjunction at dusk."),
                ],
                options(),
            )
            .await
            .unwrap();
        store
    }

    fn dates(resp: &RawSearchResponse) -> Vec<String> {
        resp.hits.hits.iter().map(|h| h.source.id()).collect()
    }

    #[tokio::test]
    async fn test_browse_sorts_by_date_desc() {
        let store = seeded().await;
        let resp = store
            .search("apod", &compile("", None).into_body(0, 10))
            .await
            .unwrap();
        assert_eq!(
            dates(&resp),
            vec!["2023-05-20", "2023-01-10", "2022-07-04", "2021-03-01"]
        );
    }

    #[tokio::test]
    async fn test_text_sorts_by_score_then_date() {
        let store = seeded().await;
        let resp = store
            .search("apod", &compile("crab nebula", None).into_body(0, 10))
            .await
            .unwrap();
        // Both titles contain the exact phrase and tie on score; newer first.
        // "Orion Rising" only matches through its explanation.
        assert_eq!(dates(&resp), vec!["2022-07-04", "2021-03-01", "2023-01-10"]);
        let scores: Vec<f64> = resp.hits.hits.iter().map(|h| h.score.unwrap()).collect();
        assert!(scores[0] >= scores[1] && scores[1] > scores[2]);
    }

    #[tokio::test]
    async fn test_fuzzy_clause_tolerates_typos() {
        let store = seeded().await;
        let resp = store
            .search("apod", &compile("nebulla", None).into_body(0, 10))
            .await
            .unwrap();
        assert_eq!(resp.hits.hits.len(), 3);
    }

    #[tokio::test]
    async fn test_year_filter_and_histogram() {
        let store = seeded().await;
        let resp = store
            .search("apod", &compile("", Some("2023")).into_body(0, 10))
            .await
            .unwrap();
        assert_eq!(dates(&resp), vec!["2023-05-20", "2023-01-10"]);
        let buckets = resp.aggregations.unwrap().years.unwrap().buckets;
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].key, Value::String("2023".into()));
        assert_eq!(buckets[0].doc_count, 2);
    }

    #[tokio::test]
    async fn test_window_and_total() {
        let store = seeded().await;
        let resp = store
            .search("apod", &compile("", None).into_body(1, 2))
            .await
            .unwrap();
        assert_eq!(dates(&resp), vec!["2023-01-10", "2022-07-04"]);
        assert_eq!(
            resp.hits.total,
            Some(TotalHits::Tracked {
                value: 4,
                relation: TotalRelation::Eq
            })
        );
        let keys: Vec<Value> = resp
            .aggregations
            .unwrap()
            .years
            .unwrap()
            .buckets
            .into_iter()
            .map(|b| b.key)
            .collect();
        assert_eq!(keys, vec!["2023", "2022", "2021"]);
    }

    #[tokio::test]
    async fn test_same_date_overwrites() {
        let store = seeded().await;
        store
            .bulk_index("apod", &[doc("2021-03-01", "Crab Nebula (revised)", "")], options())
            .await
            .unwrap();
        assert_eq!(store.doc_count("apod").await, 4);
    }

    #[tokio::test]
    async fn test_create_twice_is_rejected() {
        let store = seeded().await;
        let err = store
            .create_index("apod", &crate::schema::index_definition())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 400, .. }));
    }
}

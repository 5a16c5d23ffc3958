//! Core data models used throughout apod-search.
//!
//! These types represent the astronomy entries that flow through the
//! ingestion pipeline and the requests/results exchanged with callers of
//! the search orchestrator.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// One daily astronomy entry.
///
/// `date` is the stable external identity of an entry and serializes in
/// canonical `YYYY-MM-DD` form. Parsing a `Document` fails if the date is
/// missing or malformed, so every constructed value has a usable date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub explanation: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub authors: String,
}

impl Document {
    /// Calendar year derived from `date`, as the store's derived keyword
    /// field renders it.
    pub fn year(&self) -> String {
        self.date.year().to_string()
    }

    /// Identifier used for the document in the store.
    pub fn id(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// A single search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Free text; empty means "browse".
    pub text: String,
    /// Four-digit year to restrict results to.
    pub year_filter: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            year_filter: None,
            offset: 0,
            limit: crate::config::DEFAULT_PAGE_SIZE,
        }
    }

    /// Build a request addressed by zero-based page number.
    pub fn page(
        text: impl Into<String>,
        page: usize,
        page_size: usize,
        year_filter: Option<String>,
    ) -> Self {
        Self {
            text: text.into(),
            year_filter,
            offset: page.saturating_mul(page_size),
            limit: page_size,
        }
    }

    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year_filter = Some(year.into());
        self
    }

    pub fn with_window(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// Number of matching documents for one derived year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearBucket {
    pub key: String,
    pub doc_count: u64,
}

/// Normalized outcome of a search.
///
/// `total_matches` counts the full matching set, not just `items`.
/// `year_buckets` is ordered by year descending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub items: Vec<Document>,
    pub total_matches: u64,
    pub year_buckets: Vec<YearBucket>,
}

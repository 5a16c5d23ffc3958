//! # apod-search
//!
//! Full-text search and bulk ingestion for a corpus of daily astronomy
//! entries, backed by an Elasticsearch-compatible document store.
//!
//! ## Architecture
//!
//! ```text
//!  JSON batch ──▶ BulkIngestor ──┐
//!                                ▼
//!                          IndexManager ──▶ DocumentStore
//!                                ▲            (REST / in-memory)
//!  SearchRequest ──▶ Searcher ───┘
//!                       │
//!                       └──▶ query::compile (query + sort + year histogram)
//! ```
//!
//! Every read and write goes through [`lifecycle::IndexManager`], which
//! creates the collection on first use and waits until it is serving.
//!
//! ## Quick Start
//!
//! ```bash
//! apod init                       # create the collection and wait for it
//! apod load data.json             # bulk-ingest entries
//! apod search "eclipse" --year 2023
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, requests and results |
//! | [`schema`] | Collection settings, analyzers and mappings |
//! | [`retry`] | Retry/backoff policy |
//! | [`store`] | Document store contract and implementations |
//! | [`lifecycle`] | Collection creation and readiness |
//! | [`ingest`] | Chunked bulk ingestion |
//! | [`query`] | Query compilation |
//! | [`search`] | Search execution and result normalization |
//! | [`error`] | Error types |

pub mod config;
pub mod error;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod query;
pub mod retry;
pub mod schema;
pub mod search;
pub mod store;

pub use error::{Error, Result, StoreError};

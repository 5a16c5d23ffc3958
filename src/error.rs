//! Error types for store access, indexing and search.

use thiserror::Error;

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a [`DocumentStore`](crate::store::DocumentStore)
/// implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never produced a response (connection, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered with a non-success status.
    #[error("store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The store answered but the body did not have the expected shape.
    #[error("unexpected store response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Errors surfaced to callers of the lifecycle manager, ingestion pipeline
/// and search orchestrator.
#[derive(Debug, Error)]
pub enum Error {
    /// The collection never reached a serving state within the poll budget.
    #[error("index '{index}' unavailable after {attempts} readiness attempts")]
    IndexUnavailable { index: String, attempts: u32 },

    /// One or more ingestion chunks failed to write.
    #[error("ingestion partially failed: {succeeded} of {attempted} chunks succeeded")]
    PartialIngestion { succeeded: usize, attempted: usize },

    /// A request-level failure outside of query execution.
    #[error("store unreachable: {0}")]
    Transport(#[source] StoreError),

    /// The store rejected or failed to execute a compiled query.
    #[error("search failed: {0}")]
    QueryExecution(#[source] StoreError),

    /// The store refused to create the collection (e.g. a conflicting mapping).
    #[error("schema rejected: {0}")]
    Schema(#[source] StoreError),

    /// The caller supplied a request that cannot be executed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// True for failures caused by the store being unreachable or not
    /// serving, as opposed to caller mistakes.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::IndexUnavailable { .. }
                | Error::Transport(_)
                | Error::QueryExecution(StoreError::Transport(_))
        )
    }
}

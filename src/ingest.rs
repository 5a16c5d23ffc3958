//! Bulk ingestion pipeline.
//!
//! Documents are written in fixed-size chunks, strictly one chunk at a
//! time. Each chunk is one bulk request with synchronous refresh and a
//! bounded timeout. A failing chunk never stops the run: per-document
//! errors and request-level failures are recorded in the
//! [`IngestReport`] and the pipeline moves on to the next chunk.
//!
//! Pacing between chunks:
//! - after a chunk that got a response: the fixed inter-chunk delay
//! - after a request-level failure: the backoff policy's delay for the
//!   current run of consecutive failures (constant unless `[ingest]`
//!   configures `backoff = "exponential"`)
//!
//! A response that reports fewer per-document outcomes than documents sent
//! counts the unreported documents as failed.
//!
//! Failed chunks are not retried here. Every document is written with its
//! date as the store id, so re-submitting [`IngestReport::failed_documents`]
//! overwrites instead of duplicating.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::lifecycle::IndexManager;
use crate::models::Document;
use crate::retry::RetryPolicy;
use crate::store::{BulkItem, BulkOptions};

/// Reason recorded for documents the store's bulk response did not mention.
pub const MISSING_OUTCOME: &str = "no outcome reported by store";

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub chunk_size: usize,
    /// Wait between chunks that got a response.
    pub chunk_delay: Duration,
    /// Wait after a chunk whose request failed outright.
    pub failure_backoff: RetryPolicy,
    pub bulk_timeout: Duration,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for IngestSettings {
    fn from(config: &IngestConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
            failure_backoff: config.failure_policy(),
            bulk_timeout: Duration::from_secs(config.bulk_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkFailureKind {
    /// The store answered, but rejected some documents.
    Documents { errors: Vec<DocumentError> },
    /// The request itself failed (network, timeout, non-success status).
    Request { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentError {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    /// Zero-based chunk position.
    pub chunk: usize,
    /// Documents in the chunk, in submission order.
    #[serde(skip)]
    pub documents: Vec<Document>,
    #[serde(flatten)]
    pub kind: ChunkFailureKind,
}

/// Per-chunk outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub documents_indexed: usize,
    pub chunks_attempted: usize,
    pub chunks_succeeded: usize,
    pub failures: Vec<ChunkFailure>,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Documents from every failed chunk, ready to be re-submitted.
    pub fn failed_documents(&self) -> Vec<Document> {
        self.failures
            .iter()
            .flat_map(|f| f.documents.iter().cloned())
            .collect()
    }

    /// Turn a partial run into [`Error::PartialIngestion`].
    pub fn into_result(self) -> Result<IngestReport> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Error::PartialIngestion {
                succeeded: self.chunks_succeeded,
                attempted: self.chunks_attempted,
            })
        }
    }
}

pub struct BulkIngestor {
    manager: Arc<IndexManager>,
    settings: IngestSettings,
}

impl BulkIngestor {
    pub fn new(manager: Arc<IndexManager>, settings: IngestSettings) -> Self {
        Self { manager, settings }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Write `docs` chunk by chunk.
    ///
    /// Returns `Err` only when the collection cannot be made ready; chunk
    /// failures are reported in the returned [`IngestReport`].
    pub async fn ingest(&self, docs: &[Document]) -> Result<IngestReport> {
        if docs.is_empty() {
            return Ok(IngestReport::default());
        }

        self.manager.ensure_ready().await?;

        let store = self.manager.store();
        let index = self.manager.index();
        let options = BulkOptions {
            refresh: true,
            timeout: self.settings.bulk_timeout,
        };
        let chunks: Vec<&[Document]> = docs.chunks(self.settings.chunk_size).collect();
        let total = chunks.len();

        info!(
            documents = docs.len(),
            chunks = total,
            "indexing {} items in {} chunks",
            docs.len(),
            total
        );

        let mut report = IngestReport {
            documents: docs.len(),
            ..IngestReport::default()
        };
        let mut consecutive_failures = 0u32;

        for (i, chunk) in chunks.iter().enumerate() {
            let is_last = i + 1 == total;
            report.chunks_attempted += 1;
            info!(chunk = i + 1, total, items = chunk.len(), "processing chunk");

            match store.bulk_index(index, chunk, options).await {
                Ok(response) => {
                    consecutive_failures = 0;
                    let mut errors: Vec<DocumentError> = response
                        .failed_items()
                        .map(|item: &BulkItem| DocumentError {
                            id: item.id.clone(),
                            reason: item.error.clone().unwrap_or_default(),
                        })
                        .collect();
                    // Bulk outcomes come back in submission order.
                    let reported = response.items.len().min(chunk.len());
                    if reported < chunk.len() {
                        warn!(chunk = i + 1, reported, sent = chunk.len(), "bulk response is missing outcomes");
                        errors.extend(chunk[reported..].iter().map(|d| DocumentError {
                            id: d.id(),
                            reason: MISSING_OUTCOME.to_string(),
                        }));
                    }
                    report.documents_indexed += chunk.len().saturating_sub(errors.len());

                    if errors.is_empty() {
                        report.chunks_succeeded += 1;
                        info!(chunk = i + 1, "chunk indexed successfully");
                    } else {
                        for e in &errors {
                            error!(chunk = i + 1, id = %e.id, reason = %e.reason, "document failed to index");
                        }
                        warn!(chunk = i + 1, failed = errors.len(), "chunk failed to index");
                        report.failures.push(ChunkFailure {
                            chunk: i,
                            documents: chunk.to_vec(),
                            kind: ChunkFailureKind::Documents { errors },
                        });
                    }

                    if !is_last && !self.settings.chunk_delay.is_zero() {
                        tokio::time::sleep(self.settings.chunk_delay).await;
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    error!(chunk = i + 1, error = %e, "bulk request failed");
                    report.failures.push(ChunkFailure {
                        chunk: i,
                        documents: chunk.to_vec(),
                        kind: ChunkFailureKind::Request {
                            message: e.to_string(),
                        },
                    });
                    if !is_last {
                        self.settings.failure_backoff.wait(consecutive_failures).await;
                    }
                }
            }
        }

        info!(
            succeeded = report.chunks_succeeded,
            attempted = report.chunks_attempted,
            "completed indexing: {} chunks succeeded out of {}",
            report.chunks_succeeded,
            report.chunks_attempted
        );
        Ok(report)
    }
}

/// Read a JSON array of documents from `path`.
pub fn load_documents(path: &Path) -> anyhow::Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents file: {}", path.display()))?;
    let docs: Vec<Document> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse documents file: {}", path.display()))?;
    Ok(docs)
}

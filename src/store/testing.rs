//! Scripted [`DocumentStore`] for lifecycle and ingestion tests.
//!
//! Health answers and bulk outcomes are replayed from queues; every call is
//! counted so tests can assert exactly how many round-trips happened.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    BulkItem, BulkOptions, BulkResponse, DocumentStore, HealthStatus, RawSearchResponse,
};
use crate::error::StoreError;
use crate::models::Document;
use crate::query::SearchBody;

/// Assert a paused-clock elapsed time; the clock may overshoot a timer
/// by a millisecond.
pub fn assert_elapsed(started: tokio::time::Instant, expected_ms: u64) {
    let elapsed = started.elapsed();
    let expected = std::time::Duration::from_millis(expected_ms);
    assert!(
        elapsed >= expected && elapsed <= expected + std::time::Duration::from_millis(10),
        "expected ~{:?}, got {:?}",
        expected,
        elapsed
    );
}

/// What the next bulk call should do.
pub enum BulkOutcome {
    Ok,
    /// Report a per-document error for the document at this position.
    ItemError(usize),
    /// Answer with outcomes for only the first n documents.
    Truncated(usize),
    Transport,
}

#[derive(Default)]
pub struct Calls {
    pub exists: usize,
    pub create: usize,
    pub health: usize,
    pub bulk: Vec<Vec<Document>>,
    pub search: usize,
}

pub struct ScriptedStore {
    exists: Mutex<bool>,
    health: Mutex<VecDeque<Result<HealthStatus, StoreError>>>,
    bulk: Mutex<VecDeque<BulkOutcome>>,
    pub calls: Mutex<Calls>,
}

impl ScriptedStore {
    pub fn new(exists: bool) -> Self {
        Self {
            exists: Mutex::new(exists),
            health: Mutex::new(VecDeque::new()),
            bulk: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn with_health(self, script: Vec<Result<HealthStatus, StoreError>>) -> Self {
        *self.health.lock().unwrap() = script.into();
        self
    }

    pub fn with_bulk(self, script: Vec<BulkOutcome>) -> Self {
        *self.bulk.lock().unwrap() = script.into();
        self
    }

    pub fn health_calls(&self) -> usize {
        self.calls.lock().unwrap().health
    }

    pub fn create_calls(&self) -> usize {
        self.calls.lock().unwrap().create
    }

    pub fn bulk_calls(&self) -> Vec<Vec<Document>> {
        self.calls.lock().unwrap().bulk.clone()
    }

    pub fn total_calls(&self) -> usize {
        let c = self.calls.lock().unwrap();
        c.exists + c.create + c.health + c.bulk.len() + c.search
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn index_exists(&self, _index: &str) -> Result<bool, StoreError> {
        self.calls.lock().unwrap().exists += 1;
        Ok(*self.exists.lock().unwrap())
    }

    async fn create_index(&self, _index: &str, _definition: &Value) -> Result<(), StoreError> {
        self.calls.lock().unwrap().create += 1;
        *self.exists.lock().unwrap() = true;
        Ok(())
    }

    async fn health(&self, _index: &str) -> Result<HealthStatus, StoreError> {
        self.calls.lock().unwrap().health += 1;
        self.health
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(HealthStatus::Green))
    }

    async fn bulk_index(
        &self,
        _index: &str,
        docs: &[Document],
        _options: BulkOptions,
    ) -> Result<BulkResponse, StoreError> {
        self.calls.lock().unwrap().bulk.push(docs.to_vec());
        let outcome = self.bulk.lock().unwrap().pop_front().unwrap_or(BulkOutcome::Ok);
        let (failing, reported) = match outcome {
            BulkOutcome::Transport => {
                return Err(StoreError::Transport("connection reset".into()))
            }
            BulkOutcome::ItemError(pos) => (Some(pos), docs.len()),
            BulkOutcome::Truncated(n) => (None, n),
            BulkOutcome::Ok => (None, docs.len()),
        };
        let items = docs
            .iter()
            .take(reported)
            .enumerate()
            .map(|(i, d)| BulkItem {
                id: d.id(),
                error: (failing == Some(i)).then(|| "mapper_parsing_exception".to_string()),
            })
            .collect();
        Ok(BulkResponse { items })
    }

    async fn search(
        &self,
        _index: &str,
        _body: &SearchBody,
    ) -> Result<RawSearchResponse, StoreError> {
        self.calls.lock().unwrap().search += 1;
        Err(StoreError::Transport("search not scripted".into()))
    }
}

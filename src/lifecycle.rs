//! Index lifecycle: make sure the collection exists and is serving.
//!
//! Creating a collection is not instantly consistent (shards must allocate
//! before queries are reliable), so [`IndexManager::ensure_ready`] creates
//! the collection if needed and then polls its health under a
//! [`RetryPolicy`] until it reports green or yellow.
//!
//! The manager owns the cached [`Readiness`] for its collection. Once
//! `Ready`, later calls return immediately; after a failure the next call
//! runs the full check again. [`IndexManager::recheck`] forces a fresh
//! check regardless of the cached state.
//!
//! The poll loop may block for up to `max_attempts × delay` and has no
//! cancellation hook; wrap the call in `tokio::time::timeout` for a hard
//! deadline.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::schema;
use crate::store::{DocumentStore, HealthStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Unknown,
    Ready,
    Failed,
}

pub struct IndexManager {
    store: Arc<dyn DocumentStore>,
    index: String,
    policy: RetryPolicy,
    state: RwLock<Readiness>,
}

impl IndexManager {
    pub fn new(store: Arc<dyn DocumentStore>, index: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            store,
            index: index.into(),
            policy,
            state: RwLock::new(Readiness::Unknown),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn readiness(&self) -> Readiness {
        *self.state.read().await
    }

    /// Succeeds once the collection exists and serves queries.
    pub async fn ensure_ready(&self) -> Result<()> {
        if self.readiness().await == Readiness::Ready {
            return Ok(());
        }
        self.recheck().await
    }

    /// Run the existence check and health poll, ignoring the cached state.
    pub async fn recheck(&self) -> Result<()> {
        let outcome = match self.ensure_exists().await {
            Ok(()) => self.wait_until_serving().await,
            Err(e) => Err(e),
        };
        let next = if outcome.is_ok() {
            Readiness::Ready
        } else {
            Readiness::Failed
        };
        *self.state.write().await = next;
        outcome
    }

    /// Current health, without polling or creating anything.
    pub async fn health(&self) -> Result<HealthStatus> {
        self.store.health(&self.index).await.map_err(Error::Transport)
    }

    async fn ensure_exists(&self) -> Result<()> {
        let exists = self
            .store
            .index_exists(&self.index)
            .await
            .map_err(Error::Transport)?;
        if exists {
            debug!(index = %self.index, "index exists");
            return Ok(());
        }
        info!(index = %self.index, "creating index");
        self.store
            .create_index(&self.index, &schema::index_definition())
            .await
            .map_err(Error::Schema)
    }

    async fn wait_until_serving(&self) -> Result<()> {
        let store = &self.store;
        let index = self.index.as_str();
        let max = self.policy.max_attempts;

        let polled = self
            .policy
            .run(|attempt| async move {
                match store.health(index).await {
                    Ok(status) if status.is_serving() => Ok(status),
                    Ok(status) => {
                        warn!(index, %status, attempt, max, "waiting for index to be ready");
                        Err(format!("status {}", status))
                    }
                    Err(e) => {
                        warn!(index, error = %e, attempt, max, "health check failed");
                        Err(e.to_string())
                    }
                }
            })
            .await;

        match polled {
            Ok(status) => {
                info!(index, %status, "index is ready");
                Ok(())
            }
            Err(exhausted) => {
                warn!(
                    index,
                    attempts = exhausted.attempts,
                    last = exhausted.last_error.as_deref().unwrap_or("none"),
                    "index failed to become ready"
                );
                Err(Error::IndexUnavailable {
                    index: self.index.clone(),
                    attempts: exhausted.attempts,
                })
            }
        }
    }
}

//! Elasticsearch-compatible REST implementation of [`DocumentStore`].
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | exists | `HEAD /{index}` |
//! | create | `PUT /{index}` with settings + mappings |
//! | health | `GET /_cluster/health/{index}?wait_for_status=yellow&timeout=30s` |
//! | bulk | `POST /_bulk?refresh=true&timeout=..` (NDJSON) |
//! | search | `POST /{index}/_search` |
//!
//! Non-success statuses become [`StoreError::Rejected`] carrying the
//! response body; connection failures and client timeouts become
//! [`StoreError::Transport`].

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::{BulkItem, BulkOptions, BulkResponse, DocumentStore, HealthStatus, RawSearchResponse};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::Document;
use crate::query::SearchBody;

/// Server-side wait applied to health requests.
const HEALTH_WAIT: &str = "30s";

pub struct ElasticsearchStore {
    client: reqwest::Client,
    base_url: String,
}

impl ElasticsearchStore {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::new(
            &config.url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

async fn rejected(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Rejected { status, body }
}

/// Render a duration in the store's time-unit syntax.
fn time_value(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

fn bulk_payload(index: &str, docs: &[Document]) -> Result<String, StoreError> {
    let mut body = String::new();
    for doc in docs {
        let action = json!({ "index": { "_index": index, "_id": doc.id() } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(doc)?);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Deserialize)]
struct HealthBody {
    status: HealthStatus,
}

#[derive(Deserialize)]
struct BulkBody {
    items: Vec<HashMap<String, BulkItemBody>>,
}

#[derive(Deserialize)]
struct BulkItemBody {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

fn describe_item_error(error: &Value) -> String {
    match (
        error.get("type").and_then(Value::as_str),
        error.get("reason").and_then(Value::as_str),
    ) {
        (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
        (None, Some(reason)) => reason.to_string(),
        _ => error.to_string(),
    }
}

fn parse_bulk(body: BulkBody) -> BulkResponse {
    let items = body
        .items
        .into_iter()
        .flat_map(|item| item.into_values())
        .map(|item| BulkItem {
            id: item.id.unwrap_or_default(),
            error: item.error.as_ref().map(describe_item_error),
        })
        .collect();
    BulkResponse { items }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        let response = self.client.head(self.url(index)).send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(rejected(response).await),
        }
    }

    async fn create_index(&self, index: &str, definition: &Value) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.url(index))
            .json(definition)
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        match rejected(response).await {
            // Another caller created it between our existence check and now.
            StoreError::Rejected { body, .. }
                if body.contains("resource_already_exists_exception") =>
            {
                Ok(())
            }
            err => Err(err),
        }
    }

    async fn health(&self, index: &str) -> Result<HealthStatus, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("_cluster/health/{}", index)))
            .query(&[("wait_for_status", "yellow"), ("timeout", HEALTH_WAIT)])
            .send()
            .await?;
        // 408 means the wait timed out; the body still reports the status.
        let status = response.status();
        if status.is_success() || status == StatusCode::REQUEST_TIMEOUT {
            let body: HealthBody = response.json().await?;
            Ok(body.status)
        } else {
            Err(rejected(response).await)
        }
    }

    async fn bulk_index(
        &self,
        index: &str,
        docs: &[Document],
        options: BulkOptions,
    ) -> Result<BulkResponse, StoreError> {
        let payload = bulk_payload(index, docs)?;
        let response = self
            .client
            .post(self.url("_bulk"))
            .query(&[
                ("refresh", options.refresh.to_string()),
                ("timeout", time_value(options.timeout)),
            ])
            .header("Content-Type", "application/x-ndjson")
            .timeout(options.timeout)
            .body(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        let body: BulkBody = response.json().await?;
        Ok(parse_bulk(body))
    }

    async fn search(
        &self,
        index: &str,
        body: &SearchBody,
    ) -> Result<RawSearchResponse, StoreError> {
        let response = self
            .client
            .post(self.url(&format!("{}/_search", index)))
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(response.json().await?)
    }
}

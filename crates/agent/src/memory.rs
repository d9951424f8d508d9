//! Best-effort interaction memory.
//!
//! Recall failures degrade to an empty context, and recording is detached
//! from the response path entirely: the orchestrator spawns it and moves on,
//! and the task's only failure mode is a log line.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::config::MemoryConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

#[derive(Clone, Debug, Serialize)]
pub struct InteractionRecord {
    pub user_message: String,
    pub assistant_response: String,
    pub tool_names: Vec<String>,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn load_relevant(&self, user_id: &str, query: &str) -> anyhow::Result<Option<String>>;
    async fn record_interaction(
        &self,
        user_id: &str,
        record: InteractionRecord,
    ) -> anyhow::Result<()>;
}

/// Memory disabled: recalls nothing, records nowhere.
pub struct NoopMemoryStore;

#[async_trait]
impl MemoryStore for NoopMemoryStore {
    async fn load_relevant(&self, _: &str, _: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn record_interaction(&self, _: &str, _: InteractionRecord) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct HttpMemoryStore {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RecallResponse {
    #[serde(default)]
    context_summary: Option<String>,
}

impl HttpMemoryStore {
    pub fn new(base_url: &str, config: &MemoryConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl MemoryStore for HttpMemoryStore {
    async fn load_relevant(&self, user_id: &str, query: &str) -> anyhow::Result<Option<String>> {
        let response = self
            .client
            .post(format!("{}/api/memory/recall", self.base_url))
            .json(&json!({ "userId": user_id, "query": query, "limit": 10 }))
            .send()
            .await?
            .error_for_status()?;
        let parsed: RecallResponse = response.json().await?;
        Ok(parsed.context_summary.filter(|summary| !summary.is_empty()))
    }

    async fn record_interaction(
        &self,
        user_id: &str,
        record: InteractionRecord,
    ) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/api/memory/interactions", self.base_url))
            .json(&json!({ "userId": user_id, "interaction": record }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Fire-and-forget persistence. The spawned task owns its error boundary;
/// nothing can throw back into the response path.
pub fn spawn_record(store: Arc<dyn MemoryStore>, user_id: String, record: InteractionRecord) {
    tokio::spawn(async move {
        if let Err(error) = store.record_interaction(&user_id, record).await {
            warn!(
                event_name = "memory.record_failed",
                error = %error,
                "failed to persist interaction memory"
            );
        }
    });
}

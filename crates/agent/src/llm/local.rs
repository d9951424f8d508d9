//! Local backend: a directly reachable Ollama instance. Conversational only;
//! capability offers are never routed here.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::config::LocalConfig;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::time::timeout;

use super::{BackendError, BackendReply, CompletionBackend, CompletionRequest};

pub struct LocalBackend {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl LocalBackend {
    pub fn new(config: &LocalConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[async_trait]
impl CompletionBackend for LocalBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<BackendReply, BackendError> {
        let mut messages = vec![json!({ "role": "system", "content": request.system_prompt })];
        for message in &request.messages {
            messages.push(json!({ "role": message.role, "content": message.content }));
        }

        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });

        // The local instance is expected to occasionally be slow or down, so
        // the call is bounded and a timeout becomes an ordinary primary
        // failure for the router.
        let send = self.client.post(format!("{}/api/chat", self.base_url)).json(&body).send();
        let response = timeout(Duration::from_secs(self.timeout_secs), send)
            .await
            .map_err(|_| BackendError::Timeout { timeout_secs: self.timeout_secs })??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status: status.as_u16(), body });
        }

        let parsed: OllamaChatResponse = response.json().await?;
        Ok(BackendReply {
            content: Some(parsed.message.content),
            tool_calls: Vec::new(),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

//! Tunnel backend: local models relayed through an authenticated tunnel,
//! speaking an Anthropic-style messages API. Conversational only.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::config::TunnelConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::debug;

use super::{BackendError, BackendReply, CompletionBackend, CompletionRequest};

pub struct TunnelBackend {
    client: Client,
    url: Option<String>,
    api_key: Option<SecretString>,
    model: String,
    timeout_secs: u64,
}

impl TunnelBackend {
    pub fn new(config: &TunnelConfig) -> Self {
        Self {
            client: Client::new(),
            url: config.url.as_ref().map(|url| url.trim_end_matches('/').to_string()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TunnelResponse {
    content: Vec<TunnelContentBlock>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TunnelContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl CompletionBackend for TunnelBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<BackendReply, BackendError> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| BackendError::NotConfigured("tunnel url is missing".to_string()))?;
        let api_key = self
            .api_key
            .as_ref()
            .filter(|key| !key.expose_secret().is_empty())
            .ok_or_else(|| BackendError::NotConfigured("tunnel api key is missing".to_string()))?;

        debug!(event_name = "llm.tunnel.connect", "connecting via tunnel relay");

        // Anthropic-style messages body; system prompt travels out of band.
        let messages: Vec<_> = request
            .messages
            .iter()
            .filter(|message| message.role != "system")
            .map(|message| json!({ "role": message.role, "content": message.content }))
            .collect();

        let body = json!({
            "model": self.model,
            "system": request.system_prompt,
            "messages": messages,
            "max_tokens": 4096,
            "temperature": 0.7,
        });

        let send = self
            .client
            .post(format!("{url}/v1/messages"))
            .header("x-api-key", api_key.expose_secret())
            .json(&body)
            .send();
        let response = timeout(Duration::from_secs(self.timeout_secs), send)
            .await
            .map_err(|_| BackendError::Timeout { timeout_secs: self.timeout_secs })??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status: status.as_u16(), body });
        }

        let parsed: TunnelResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| {
                BackendError::MalformedResponse("tunnel response contained no text block".into())
            })?;

        Ok(BackendReply {
            content: Some(text),
            tool_calls: Vec::new(),
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

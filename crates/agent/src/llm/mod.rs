//! Backend adapter seam: one trait, three implementations.
//!
//! The router holds adapters as trait objects, so tests swap in scripted
//! backends and the routing state machine stays free of backend-specific
//! branching.

pub mod cloud;
pub mod local;
pub mod tunnel;

use async_trait::async_trait;
use parley_core::capabilities::ToolDefinition;
use parley_core::domain::tools::ToolInvocationRequest;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend is not configured: {0}")]
    NotConfigured(String),
    #[error("backend call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("backend returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("backend transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend response was malformed: {0}")]
    MalformedResponse(String),
}

/// Assistant/tool message shapes for the wire. `content` is always a string;
/// backends reject `null` content when tool calls are attached, so an empty
/// assistant turn is sent as `""`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl BackendMessage {
    pub fn plain(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into(), tool_calls: None, tool_call_id: None }
    }

    pub fn assistant_with_calls(content: String, tool_calls: Vec<WireToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content,
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// OpenAI function-call wire shape: arguments travel as a JSON-encoded string.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: WireFunctionCall,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    pub arguments: String,
}

impl WireToolCall {
    pub fn from_request(request: &ToolInvocationRequest) -> Self {
        Self {
            id: request.id.clone(),
            call_type: "function".to_string(),
            function: WireFunctionCall {
                name: request.name.clone(),
                arguments: serde_json::Value::Object(request.arguments.clone()).to_string(),
            },
        }
    }

    /// Invalid argument JSON degrades to an empty map rather than failing the
    /// whole completion; the tool itself will report missing parameters.
    pub fn into_request(self) -> ToolInvocationRequest {
        let arguments = serde_json::from_str(&self.function.arguments).unwrap_or_default();
        ToolInvocationRequest::new(self.id, self.function.name, arguments)
    }
}

#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<BackendMessage>,
    /// Capability offers. Empty for non-cloud backends and for phase two.
    pub tools: Vec<&'static ToolDefinition>,
}

impl CompletionRequest {
    pub fn conversational(system_prompt: String, messages: Vec<BackendMessage>) -> Self {
        Self { system_prompt, messages, tools: Vec::new() }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BackendReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocationRequest>,
    pub model: String,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<BackendReply, BackendError>;
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A backend's structured request to run a named capability. Never trusted
/// until partitioned against the granted set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Backend-assigned call id, echoed back in phase-two tool messages.
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolInvocationRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self { id: id.into(), name: name.into(), arguments }
    }
}

/// UI-facing side effect a tool asked the client to perform (navigate, open a
/// panel, ...). Opaque to the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAction {
    pub kind: String,
    pub payload: Value,
}

/// Outcome of one invocation. Always populated, whether the tool ran and
/// succeeded, ran and failed, or was denied without running.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ToolAction>,
}

impl ToolInvocationResult {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None, action: None }
    }

    pub fn ok_with_action(data: Value, action: ToolAction) -> Self {
        Self { success: true, data: Some(data), error: None, action: Some(action) }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()), action: None }
    }
}

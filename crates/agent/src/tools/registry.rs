//! External tool-registry client: session-scoped tools the caller opted into
//! are resolved and executed through this service by name.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::config::RegistryConfig;
use parley_core::domain::tools::{ToolInvocationRequest, ToolInvocationResult};
use reqwest::Client;
use serde_json::{json, Value};

#[async_trait]
pub trait ToolRegistryClient: Send + Sync {
    async fn search(&self, query: &str, limit: Option<u32>) -> anyhow::Result<Value>;
    async fn execute(&self, tool_id: &str, params: &Value) -> anyhow::Result<Value>;
    async fn health(&self) -> anyhow::Result<Value>;
}

pub struct HttpToolRegistryClient {
    client: Client,
    base_url: Option<String>,
}

impl HttpToolRegistryClient {
    pub fn new(config: &RegistryConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.base_url.as_ref().map(|url| url.trim_end_matches('/').to_string()),
        }
    }

    fn base_url(&self) -> anyhow::Result<&str> {
        self.base_url.as_deref().ok_or_else(|| anyhow::anyhow!("tool registry is not configured"))
    }
}

#[async_trait]
impl ToolRegistryClient for HttpToolRegistryClient {
    async fn search(&self, query: &str, limit: Option<u32>) -> anyhow::Result<Value> {
        let base = self.base_url()?;
        let response = self
            .client
            .get(format!("{base}/api/tools/search"))
            .query(&[("q", query.to_string()), ("limit", limit.unwrap_or(10).to_string())])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn execute(&self, tool_id: &str, params: &Value) -> anyhow::Result<Value> {
        let base = self.base_url()?;
        let response = self
            .client
            .post(format!("{base}/api/tools/execute"))
            .json(&json!({ "toolId": tool_id, "params": params }))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn health(&self) -> anyhow::Result<Value> {
        let base = self.base_url()?;
        let response =
            self.client.get(format!("{base}/api/health")).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Bridge from a session-scoped invocation to the registry client.
pub async fn dispatch_registry_tool(
    client: &dyn ToolRegistryClient,
    request: &ToolInvocationRequest,
) -> ToolInvocationResult {
    let outcome = match request.name.as_str() {
        "search_registry_tools" => {
            let Some(query) = request.arguments.get("query").and_then(Value::as_str) else {
                return ToolInvocationResult::failed("search_registry_tools requires a 'query'");
            };
            let limit =
                request.arguments.get("limit").and_then(Value::as_u64).map(|limit| limit as u32);
            client.search(query, limit).await
        }
        "execute_registry_tool" => {
            let Some(tool_id) = request.arguments.get("tool_id").and_then(Value::as_str) else {
                return ToolInvocationResult::failed("execute_registry_tool requires a 'tool_id'");
            };
            let params = request.arguments.get("params").cloned().unwrap_or(json!({}));
            client.execute(tool_id, &params).await
        }
        "check_registry_health" => client.health().await,
        other => {
            return ToolInvocationResult::failed(format!("unknown registry tool: {other}"));
        }
    };

    match outcome {
        Ok(data) => ToolInvocationResult::ok(data),
        Err(error) => {
            ToolInvocationResult::failed(format!("registry tool execution failed: {error}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use super::{dispatch_registry_tool, ToolRegistryClient};
    use parley_core::domain::tools::ToolInvocationRequest;

    struct FailingRegistry;

    #[async_trait]
    impl ToolRegistryClient for FailingRegistry {
        async fn search(&self, _: &str, _: Option<u32>) -> anyhow::Result<Value> {
            anyhow::bail!("registry unreachable")
        }

        async fn execute(&self, _: &str, _: &Value) -> anyhow::Result<Value> {
            anyhow::bail!("registry unreachable")
        }

        async fn health(&self) -> anyhow::Result<Value> {
            Ok(json!({ "status": "degraded" }))
        }
    }

    #[tokio::test]
    async fn missing_query_is_a_structured_failure() {
        let request = ToolInvocationRequest::new("c1", "search_registry_tools", Map::new());
        let result = dispatch_registry_tool(&FailingRegistry, &request).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or("").contains("query"));
    }

    #[tokio::test]
    async fn client_errors_become_failed_results() {
        let mut arguments = Map::new();
        arguments.insert("tool_id".to_string(), json!("web-scraper::fetch_page"));
        let request = ToolInvocationRequest::new("c2", "execute_registry_tool", arguments);

        let result = dispatch_registry_tool(&FailingRegistry, &request).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or("").contains("registry unreachable"));
    }

    #[tokio::test]
    async fn health_passes_through_payload() {
        let request = ToolInvocationRequest::new("c3", "check_registry_health", Map::new());
        let result = dispatch_registry_tool(&FailingRegistry, &request).await;
        assert!(result.success);
        assert_eq!(result.data.expect("data")["status"], json!("degraded"));
    }
}

//! Tool execution engine.
//!
//! Permitted invocations run sequentially, in the order the backend emitted
//! them. Later tools may depend on side effects of earlier ones, and the
//! strict ordering keeps error attribution unambiguous. One failing
//! invocation never aborts the rest of the batch.

pub mod builtin;
pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_core::capabilities::registry_tool_names;
use parley_core::domain::access::Identity;
use parley_core::domain::tools::{ToolInvocationRequest, ToolInvocationResult};
use serde_json::{Map, Value};
use tracing::{info, warn};

use self::registry::{dispatch_registry_tool, ToolRegistryClient};

/// One in-process capability implementation. Authorization-sensitive tools
/// receive the caller identity and enforce their own requirements on it.
#[async_trait]
pub trait BuiltinTool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        identity: &Identity,
    ) -> anyhow::Result<ToolInvocationResult>;
}

#[derive(Default)]
pub struct BuiltinToolSet {
    tools: HashMap<&'static str, Box<dyn BuiltinTool>>,
}

impl BuiltinToolSet {
    pub fn register<T>(&mut self, tool: T)
    where
        T: BuiltinTool + 'static,
    {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn BuiltinTool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub struct ToolExecutionEngine {
    builtin: BuiltinToolSet,
    registry: Arc<dyn ToolRegistryClient>,
}

impl ToolExecutionEngine {
    pub fn new(registry: Arc<dyn ToolRegistryClient>) -> Self {
        Self { builtin: builtin::default_tool_set(), registry }
    }

    pub fn with_tool_set(builtin: BuiltinToolSet, registry: Arc<dyn ToolRegistryClient>) -> Self {
        Self { builtin, registry }
    }

    /// Execute already-permitted invocations in order, one result each.
    /// Thrown failures are converted to failed results, never propagated.
    pub async fn execute_batch(
        &self,
        permitted: &[ToolInvocationRequest],
        identity: &Identity,
    ) -> Vec<ToolInvocationResult> {
        let registry_names = registry_tool_names();
        let mut results = Vec::with_capacity(permitted.len());

        for request in permitted {
            let result = if registry_names.contains(&request.name) {
                dispatch_registry_tool(self.registry.as_ref(), request).await
            } else {
                self.execute_builtin(request, identity).await
            };

            if result.success {
                info!(
                    event_name = "tools.executed",
                    tool = %request.name,
                    tier = %identity.tier,
                    "tool execution succeeded"
                );
            } else {
                warn!(
                    event_name = "tools.failed",
                    tool = %request.name,
                    tier = %identity.tier,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "tool execution failed"
                );
            }

            results.push(result);
        }

        results
    }

    async fn execute_builtin(
        &self,
        request: &ToolInvocationRequest,
        identity: &Identity,
    ) -> ToolInvocationResult {
        let Some(tool) = self.builtin.get(&request.name) else {
            return ToolInvocationResult::failed(format!(
                "no implementation registered for tool '{}'",
                request.name
            ));
        };

        match tool.execute(&request.arguments, identity).await {
            Ok(result) => result,
            Err(error) => ToolInvocationResult::failed(error.to_string()),
        }
    }
}

/// Structured access-denied result for an invocation that never ran.
pub fn denied_result(request: &ToolInvocationRequest, tier_denied: bool) -> ToolInvocationResult {
    if tier_denied {
        ToolInvocationResult::failed(format!(
            "access denied: tool '{}' requires a higher access tier",
            request.name
        ))
    } else {
        ToolInvocationResult::failed(format!(
            "tool '{}' was not enabled for this session",
            request.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use super::registry::ToolRegistryClient;
    use super::{denied_result, BuiltinTool, BuiltinToolSet, ToolExecutionEngine};
    use parley_core::domain::access::Identity;
    use parley_core::domain::tools::{ToolInvocationRequest, ToolInvocationResult};

    struct RecordingTool {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl BuiltinTool for RecordingTool {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(
            &self,
            _: &Map<String, Value>,
            _: &Identity,
        ) -> anyhow::Result<ToolInvocationResult> {
            self.log.lock().expect("log lock").push(self.name);
            if self.fail {
                anyhow::bail!("{} blew up", self.name);
            }
            Ok(ToolInvocationResult::ok(json!({ "tool": self.name })))
        }
    }

    struct StubRegistry;

    #[async_trait]
    impl ToolRegistryClient for StubRegistry {
        async fn search(&self, query: &str, _: Option<u32>) -> anyhow::Result<Value> {
            Ok(json!({ "tools": [], "query": query }))
        }

        async fn execute(&self, tool_id: &str, _: &Value) -> anyhow::Result<Value> {
            Ok(json!({ "executed": tool_id }))
        }

        async fn health(&self) -> anyhow::Result<Value> {
            Ok(json!({ "status": "ok" }))
        }
    }

    fn engine_with(
        names: &[(&'static str, bool)],
        log: Arc<Mutex<Vec<&'static str>>>,
    ) -> ToolExecutionEngine {
        let mut set = BuiltinToolSet::default();
        for (name, fail) in names {
            set.register(RecordingTool { name, fail: *fail, log: log.clone() });
        }
        ToolExecutionEngine::with_tool_set(set, Arc::new(StubRegistry))
    }

    fn request(name: &str) -> ToolInvocationRequest {
        ToolInvocationRequest::new(format!("call-{name}"), name, Map::new())
    }

    #[tokio::test]
    async fn batch_runs_sequentially_in_request_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine =
            engine_with(&[("alpha", false), ("beta", false), ("gamma", false)], log.clone());

        let batch = [request("gamma"), request("alpha"), request("beta")];
        let results = engine.execute_batch(&batch, &Identity::owner("u1")).await;

        assert_eq!(results.len(), 3);
        assert_eq!(*log.lock().expect("log"), vec!["gamma", "alpha", "beta"]);
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = engine_with(&[("first", false), ("boom", true), ("last", false)], log.clone());

        let batch = [request("first"), request("boom"), request("last")];
        let results = engine.execute_batch(&batch, &Identity::owner("u1")).await;

        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_deref().unwrap_or("").contains("boom"));
        assert!(results[2].success);
        assert_eq!(log.lock().expect("log").len(), 3);
    }

    #[tokio::test]
    async fn unknown_tool_yields_a_failed_result() {
        let engine = engine_with(&[], Arc::new(Mutex::new(Vec::new())));
        let results = engine.execute_batch(&[request("ghost_tool")], &Identity::visitor()).await;
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap_or("").contains("ghost_tool"));
    }

    #[tokio::test]
    async fn registry_tools_dispatch_to_the_registry_client() {
        let engine = engine_with(&[], Arc::new(Mutex::new(Vec::new())));

        let mut arguments = Map::new();
        arguments.insert("query".to_string(), json!("scraping"));
        let batch = [ToolInvocationRequest::new("call-1", "search_registry_tools", arguments)];
        let results = engine.execute_batch(&batch, &Identity::visitor()).await;

        assert!(results[0].success);
        assert_eq!(results[0].data.as_ref().expect("data")["query"], json!("scraping"));
    }

    #[test]
    fn denied_results_carry_the_reason() {
        let tier = denied_result(&request("remember"), true);
        assert!(!tier.success);
        assert!(tier.error.as_deref().unwrap_or("").contains("higher access tier"));

        let session = denied_result(&request("execute_registry_tool"), false);
        assert!(session.error.as_deref().unwrap_or("").contains("not enabled"));
    }
}

//! The conversation orchestrator: one request in, one response out.
//!
//! Pipeline: validation → identity → rate gate → capability grant → backend
//! eligibility → prompt assembly → completion (conversational, or the
//! two-phase tool protocol on cloud) → fire-and-forget memory persistence.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::capabilities::{
    granted_definitions, granted_names, partition, registry_tool_definitions, registry_tool_names,
    ToolDefinition,
};
use parley_core::config::AppConfig;
use parley_core::domain::access::{AccessTier, Identity};
use parley_core::domain::message::{last_user_content, ConversationMessage, Role};
use parley_core::domain::provider::{BackendKind, ProviderSelection};
use parley_core::domain::tools::{ToolAction, ToolInvocationResult};
use parley_core::errors::OrchestratorError;
use parley_core::rate_limit::{RateLimitConfig, RateLimiter};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::identity::{IdentityResolver, SessionContext};
use crate::llm::{BackendMessage, BackendReply, CompletionRequest, WireToolCall};
use crate::memory::{spawn_record, InteractionRecord, MemoryStore};
use crate::prompts::{self, AppContext, PromptSections};
use crate::router::{ProviderRouter, RouteError};
use crate::tools::{denied_result, ToolExecutionEngine};

/// Phrases in the last user message that make tool support likely. The
/// hybrid local/cloud rule is purely a cost and latency optimization; access
/// control never depends on it.
const TOOL_TRIGGER_PHRASES: &[&str] = &[
    "schedule",
    "book a meeting",
    "calendar",
    "navigate to",
    "go to",
    "open",
    "remember",
    "memorize",
    "recall",
    "create project",
    "create ticket",
    "show kanban",
    "list projects",
    "send a message",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolProvider {
    #[serde(rename = "built-in")]
    BuiltIn,
    #[serde(rename = "registry")]
    Registry,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectedTool {
    pub name: String,
    pub provider: ToolProvider,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub app_context: Option<AppContext>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub access_level: Option<String>,
    #[serde(default)]
    pub enable_tools: Option<bool>,
    #[serde(default)]
    pub selected_tools: Option<Vec<SelectedTool>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsage {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub result: ToolInvocationResult,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub content: String,
    /// Duplicate of `content` for caller convenience.
    pub message: String,
    pub access_level: AccessTier,
    pub provider: BackendKind,
    pub provider_model: String,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<ToolUsage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ToolAction>>,
    pub memory_enabled: bool,
    pub tools_enabled: bool,
}

pub struct Orchestrator {
    config: AppConfig,
    limiter: Arc<RateLimiter>,
    resolver: IdentityResolver,
    router: Arc<ProviderRouter>,
    engine: Arc<ToolExecutionEngine>,
    memory: Arc<dyn MemoryStore>,
}

impl Orchestrator {
    pub fn new(
        config: AppConfig,
        limiter: Arc<RateLimiter>,
        resolver: IdentityResolver,
        router: Arc<ProviderRouter>,
        engine: Arc<ToolExecutionEngine>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self { config, limiter, resolver, router, engine, memory }
    }

    pub async fn handle(
        &self,
        request: ChatRequest,
        mut session: SessionContext,
        client_addr: &str,
    ) -> Result<ChatResponse, OrchestratorError> {
        let correlation_id = Uuid::new_v4().to_string();

        if request.messages.is_empty() {
            return Err(OrchestratorError::Validation("messages array is required".to_string()));
        }

        // Channel tier claims ride in the body; the resolver decides whether
        // the channel is trusted enough to honor them.
        session.channel = request.channel.clone();
        session.claimed_tier =
            request.access_level.as_deref().and_then(AccessTier::parse);
        let identity = self.resolver.resolve(&session);

        self.check_rate_limit(&identity, client_addr)?;

        let user_query = last_user_content(&request.messages).to_string();
        let selection = self.selection_for(&identity);
        let effective_primary = self.router.effective_primary(selection);

        let enable_tools = request.enable_tools.unwrap_or(false);
        let needs_tool_support = enable_tools && message_triggers_tools(&user_query);
        let use_non_cloud = effective_primary != BackendKind::Cloud && !needs_tool_support;

        info!(
            event_name = "chat.request",
            correlation_id = %correlation_id,
            tier = %identity.tier,
            primary = %effective_primary,
            non_cloud_path = use_non_cloud,
            "handling chat request"
        );

        let memory_context = self.load_memory_context(&identity, &user_query).await;
        let session_registry_names = selected_registry_names(&request);

        let sections = PromptSections {
            memory_context,
            app_context: request.app_context.clone(),
            session_tool_names: session_registry_names.iter().cloned().collect(),
            provider_note: self.provider_note(effective_primary, use_non_cloud),
        };
        let system_prompt = prompts::assemble(identity.tier, &sections);
        info!(
            event_name = "chat.prompt_layers",
            correlation_id = %correlation_id,
            tier = %identity.tier,
            layers = ?prompts::loaded_layers(identity.tier),
            "assembled persona prompt"
        );

        let history: Vec<BackendMessage> =
            request.messages.iter().map(backend_message).collect();

        if use_non_cloud {
            return self
                .conversational_path(selection, system_prompt, history, &identity, user_query)
                .await;
        }

        self.cloud_tool_path(
            &request,
            system_prompt,
            history,
            &identity,
            user_query,
            session_registry_names,
            &correlation_id,
        )
        .await
    }

    fn check_rate_limit(
        &self,
        identity: &Identity,
        client_addr: &str,
    ) -> Result<(), OrchestratorError> {
        let settings = self.config.rate_limit;
        let max_requests = if identity.is_owner() {
            settings.owner_max_requests
        } else {
            settings.max_requests
        };
        let config = RateLimitConfig { window_ms: settings.window_ms, max_requests };

        let decision = self.limiter.check(&format!("chat:{client_addr}"), &config);
        if decision.allowed {
            return Ok(());
        }

        let retry_after_secs = decision.retry_after_secs(chrono::Utc::now());
        warn!(
            event_name = "chat.rate_limited",
            tier = %identity.tier,
            client_addr,
            retry_after_secs,
            "rate limit exceeded"
        );
        Err(OrchestratorError::RateLimited { retry_after_secs })
    }

    /// Owners get their configured routing; everyone else is forced to cloud
    /// with no fallback.
    fn selection_for(&self, identity: &Identity) -> ProviderSelection {
        if identity.is_owner() {
            ProviderSelection {
                primary: self.config.routing.primary,
                fallback: self.config.routing.fallback,
            }
        } else {
            ProviderSelection::cloud_only()
        }
    }

    fn provider_note(&self, primary: BackendKind, non_cloud: bool) -> String {
        if non_cloud {
            let model = match primary {
                BackendKind::Local => &self.config.local.model,
                BackendKind::Tunnel => &self.config.tunnel.model,
                BackendKind::Cloud => &self.config.cloud.model,
            };
            prompts::provider_note(primary, model, false)
        } else {
            prompts::provider_note(BackendKind::Cloud, &self.config.cloud.model, true)
        }
    }

    async fn load_memory_context(&self, identity: &Identity, query: &str) -> Option<String> {
        if !identity.memory_enabled() {
            return None;
        }
        let user_id = identity.user_id.as_deref()?;
        match self.memory.load_relevant(user_id, query).await {
            Ok(context) => context,
            Err(error) => {
                warn!(
                    event_name = "memory.recall_failed",
                    error = %error,
                    "continuing without memory context"
                );
                None
            }
        }
    }

    async fn conversational_path(
        &self,
        selection: ProviderSelection,
        system_prompt: String,
        history: Vec<BackendMessage>,
        identity: &Identity,
        user_query: String,
    ) -> Result<ChatResponse, OrchestratorError> {
        let routed = self
            .router
            .route(CompletionRequest::conversational(system_prompt, history), selection)
            .await
            .map_err(map_route_error)?;

        let content = reply_content(&routed.reply);
        self.record_interaction(identity, user_query, content.clone(), Vec::new());

        Ok(ChatResponse {
            content: content.clone(),
            message: content,
            access_level: identity.tier,
            provider: routed.backend,
            provider_model: routed.reply.model,
            fallback_used: routed.fallback_used,
            fallback_reason: routed.fallback_reason,
            tools_used: None,
            denied_tools: None,
            actions: None,
            memory_enabled: identity.memory_enabled(),
            tools_enabled: false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn cloud_tool_path(
        &self,
        request: &ChatRequest,
        system_prompt: String,
        history: Vec<BackendMessage>,
        identity: &Identity,
        user_query: String,
        session_registry_names: std::collections::BTreeSet<String>,
        correlation_id: &str,
    ) -> Result<ChatResponse, OrchestratorError> {
        let offered = self.offered_tools(request, identity.tier, &session_registry_names);
        let granted = granted_names(identity.tier);
        let registry_names = registry_tool_names();

        let first = self
            .router
            .route(
                CompletionRequest {
                    system_prompt: system_prompt.clone(),
                    messages: history.clone(),
                    tools: offered,
                },
                ProviderSelection::cloud_only(),
            )
            .await
            .map_err(map_route_error)?;

        if first.reply.tool_calls.is_empty() {
            let content = reply_content(&first.reply);
            self.record_interaction(identity, user_query, content.clone(), Vec::new());
            return Ok(ChatResponse {
                content: content.clone(),
                message: content,
                access_level: identity.tier,
                provider: first.backend,
                provider_model: first.reply.model,
                fallback_used: first.fallback_used,
                fallback_reason: first.fallback_reason,
                tools_used: None,
                denied_tools: None,
                actions: None,
                memory_enabled: identity.memory_enabled(),
                tools_enabled: true,
            });
        }

        let requested = first.reply.tool_calls.clone();

        // Defense in depth: the backend was only offered the granted set, but
        // the same partition runs again on what it actually asked for. The
        // combined allow set keeps emission order intact in one pass.
        let mut allowed = granted.clone();
        allowed.extend(session_registry_names.iter().cloned());
        let split = partition(requested.clone(), &allowed);

        if !split.denied.is_empty() {
            warn!(
                event_name = "chat.tools_denied",
                correlation_id = %correlation_id,
                tier = %identity.tier,
                denied = ?split.denied.iter().map(|call| call.name.as_str()).collect::<Vec<_>>(),
                "backend requested tools outside the granted set"
            );
        }

        let executed = self.engine.execute_batch(&split.permitted, identity).await;

        let mut results: HashMap<String, ToolInvocationResult> = HashMap::new();
        let mut actions: Vec<ToolAction> = Vec::new();
        for (call, result) in split.permitted.iter().zip(executed) {
            if let Some(action) = &result.action {
                actions.push(action.clone());
            }
            results.insert(call.name.clone(), result);
        }
        for call in &split.denied {
            let tier_denied = !registry_names.contains(&call.name);
            results.insert(call.name.clone(), denied_result(call, tier_denied));
        }

        // Phase two: the model sees one tool message per originally requested
        // invocation, denied ones included, so its view of history stays
        // complete and consistent.
        let mut second_messages = history;
        second_messages.push(BackendMessage::assistant_with_calls(
            first.reply.content.clone().unwrap_or_default(),
            requested.iter().map(WireToolCall::from_request).collect(),
        ));
        for call in &requested {
            let payload = results
                .get(&call.name)
                .map(tool_message_payload)
                .unwrap_or_else(|| json!({}).to_string());
            second_messages.push(BackendMessage::tool_result(call.id.clone(), payload));
        }

        let second = self
            .router
            .route(
                CompletionRequest::conversational(system_prompt, second_messages),
                ProviderSelection::cloud_only(),
            )
            .await
            .map_err(map_route_error)?;

        // Strictly two-phase: a second round of invocation requests is not
        // executed.
        if !second.reply.tool_calls.is_empty() {
            info!(
                event_name = "chat.second_phase_tool_calls_ignored",
                correlation_id = %correlation_id,
                count = second.reply.tool_calls.len(),
                "ignoring tool calls from the second completion"
            );
        }

        let content = reply_content(&second.reply);
        let tool_names: Vec<String> = requested.iter().map(|call| call.name.clone()).collect();
        self.record_interaction(identity, user_query, content.clone(), tool_names);

        let tools_used: Vec<ToolUsage> = requested
            .iter()
            .map(|call| ToolUsage {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
                result: results.get(&call.name).cloned().unwrap_or_default(),
            })
            .collect();
        let denied_tools: Vec<String> =
            split.denied.iter().map(|call| call.name.clone()).collect();

        Ok(ChatResponse {
            content: content.clone(),
            message: content,
            access_level: identity.tier,
            provider: first.backend,
            provider_model: first.reply.model,
            fallback_used: first.fallback_used,
            fallback_reason: first.fallback_reason,
            tools_used: Some(tools_used),
            denied_tools: (!denied_tools.is_empty()).then_some(denied_tools),
            actions: (!actions.is_empty()).then_some(actions),
            memory_enabled: identity.memory_enabled(),
            tools_enabled: true,
        })
    }

    /// Capability offers for the first completion: the tier grant, optionally
    /// narrowed to the caller's built-in selection, plus opted-in registry
    /// tools.
    fn offered_tools(
        &self,
        request: &ChatRequest,
        tier: AccessTier,
        session_registry_names: &std::collections::BTreeSet<String>,
    ) -> Vec<&'static ToolDefinition> {
        let selected_builtin: Vec<&str> = request
            .selected_tools
            .iter()
            .flatten()
            .filter(|tool| tool.provider == ToolProvider::BuiltIn)
            .map(|tool| tool.name.as_str())
            .collect();

        let mut offered: Vec<&'static ToolDefinition> = granted_definitions(tier)
            .into_iter()
            .filter(|tool| {
                selected_builtin.is_empty() || selected_builtin.contains(&tool.name)
            })
            .collect();

        offered.extend(
            registry_tool_definitions()
                .iter()
                .filter(|tool| session_registry_names.contains(tool.name)),
        );

        offered
    }

    fn record_interaction(
        &self,
        identity: &Identity,
        user_message: String,
        assistant_response: String,
        tool_names: Vec<String>,
    ) {
        if !identity.memory_enabled() {
            return;
        }
        let Some(user_id) = identity.user_id.clone() else { return };
        spawn_record(
            self.memory.clone(),
            user_id,
            InteractionRecord { user_message, assistant_response, tool_names },
        );
    }
}

fn message_triggers_tools(last_message: &str) -> bool {
    let lowered = last_message.to_lowercase();
    TOOL_TRIGGER_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

fn selected_registry_names(request: &ChatRequest) -> std::collections::BTreeSet<String> {
    let known = registry_tool_names();
    request
        .selected_tools
        .iter()
        .flatten()
        .filter(|tool| tool.provider == ToolProvider::Registry)
        .map(|tool| tool.name.clone())
        .filter(|name| known.contains(name))
        .collect()
}

fn backend_message(message: &ConversationMessage) -> BackendMessage {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    };
    BackendMessage::plain(role, message.content.clone())
}

fn reply_content(reply: &BackendReply) -> String {
    reply
        .content
        .clone()
        .filter(|content| !content.is_empty())
        .unwrap_or_else(|| "No response generated".to_string())
}

fn tool_message_payload(result: &ToolInvocationResult) -> String {
    match (&result.data, &result.error) {
        (Some(data), _) => data.to_string(),
        (None, Some(error)) => json!({ "success": false, "error": error }).to_string(),
        (None, None) => json!({}).to_string(),
    }
}

fn map_route_error(error: RouteError) -> OrchestratorError {
    match error {
        RouteError::Configuration(detail) => OrchestratorError::Configuration(detail),
        RouteError::Exhausted(detail) => OrchestratorError::Provider(detail),
    }
}

//! In-process capability implementations.
//!
//! These back the tier-gated registry in `parley_core::capabilities`. The
//! engine only hands them invocations that already passed the partition, but
//! authorization-sensitive tools still require a resolved user id before
//! touching anything scoped to a person.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parley_core::domain::access::Identity;
use parley_core::domain::tools::{ToolAction, ToolInvocationResult};
use serde_json::{json, Map, Value};

use super::{BuiltinTool, BuiltinToolSet};

fn required_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> anyhow::Result<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing required argument '{key}'"))
}

fn required_user<'a>(identity: &'a Identity, tool: &str) -> anyhow::Result<&'a str> {
    identity
        .user_id
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("{tool} requires an authenticated user"))
}

pub fn default_tool_set() -> BuiltinToolSet {
    let mut set = BuiltinToolSet::default();
    set.register(SearchPortfolio);
    set.register(NavigateTo);
    set.register(ListThemes);
    set.register(ShowWeather);
    set.register(ListProjects);
    set.register(GetProjectBoard);
    set.register(GetAvailableTimes);
    set.register(GetUpcomingBookings);
    set.register(ScheduleCall);
    set.register(CreateProject);
    set.register(CreateTicket);
    set.register(Remember);
    set.register(RecallPreference);
    set.register(SendChannelMessage);
    set
}

struct SearchPortfolio;

#[async_trait]
impl BuiltinTool for SearchPortfolio {
    fn name(&self) -> &'static str {
        "search_portfolio"
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        _: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        let query = required_str(arguments, "query")?;
        Ok(ToolInvocationResult::ok(json!({
            "query": query,
            "matches": [
                { "route": "/projects", "title": "Projects" },
                { "route": "/writing", "title": "Writing" },
            ],
        })))
    }
}

struct NavigateTo;

#[async_trait]
impl BuiltinTool for NavigateTo {
    fn name(&self) -> &'static str {
        "navigate_to"
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        _: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        let route = required_str(arguments, "route")?;
        if !route.starts_with('/') {
            anyhow::bail!("route must be site-relative, got '{route}'");
        }
        Ok(ToolInvocationResult::ok_with_action(
            json!({ "navigated": route }),
            ToolAction { kind: "navigate".to_string(), payload: json!({ "route": route }) },
        ))
    }
}

struct ListThemes;

#[async_trait]
impl BuiltinTool for ListThemes {
    fn name(&self) -> &'static str {
        "list_themes"
    }

    async fn execute(
        &self,
        _: &Map<String, Value>,
        _: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        Ok(ToolInvocationResult::ok(json!({
            "themes": ["terminal", "paper", "midnight", "neon"],
        })))
    }
}

struct ShowWeather;

#[async_trait]
impl BuiltinTool for ShowWeather {
    fn name(&self) -> &'static str {
        "show_weather"
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        _: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        let location =
            arguments.get("location").and_then(Value::as_str).unwrap_or("current location");
        Ok(ToolInvocationResult::ok_with_action(
            json!({ "location": location }),
            ToolAction {
                kind: "show_weather".to_string(),
                payload: json!({ "location": location }),
            },
        ))
    }
}

struct ListProjects;

#[async_trait]
impl BuiltinTool for ListProjects {
    fn name(&self) -> &'static str {
        "list_projects"
    }

    async fn execute(
        &self,
        _: &Map<String, Value>,
        _: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        Ok(ToolInvocationResult::ok(json!({
            "projects": [
                { "id": "proj-orchestrator", "name": "Orchestrator", "status": "active" },
                { "id": "proj-portfolio", "name": "Portfolio refresh", "status": "paused" },
            ],
        })))
    }
}

struct GetProjectBoard;

#[async_trait]
impl BuiltinTool for GetProjectBoard {
    fn name(&self) -> &'static str {
        "get_project_board"
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        _: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        let project_id = required_str(arguments, "project_id")?;
        Ok(ToolInvocationResult::ok(json!({
            "project_id": project_id,
            "columns": {
                "todo": ["wire up fallback metrics"],
                "in_progress": ["tool registry search"],
                "done": ["rate limit window"],
            },
        })))
    }
}

struct GetAvailableTimes;

#[async_trait]
impl BuiltinTool for GetAvailableTimes {
    fn name(&self) -> &'static str {
        "get_available_times"
    }

    async fn execute(
        &self,
        _: &Map<String, Value>,
        _: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        let base = Utc::now() + Duration::days(1);
        let slots: Vec<String> =
            (0..3).map(|offset| (base + Duration::hours(offset * 2)).to_rfc3339()).collect();
        Ok(ToolInvocationResult::ok(json!({ "slots": slots })))
    }
}

struct GetUpcomingBookings;

#[async_trait]
impl BuiltinTool for GetUpcomingBookings {
    fn name(&self) -> &'static str {
        "get_upcoming_bookings"
    }

    async fn execute(
        &self,
        _: &Map<String, Value>,
        _: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        Ok(ToolInvocationResult::ok(json!({ "bookings": [] })))
    }
}

struct ScheduleCall;

#[async_trait]
impl BuiltinTool for ScheduleCall {
    fn name(&self) -> &'static str {
        "schedule_call"
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        identity: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        let user_id = required_user(identity, "schedule_call")?;
        let slot = required_str(arguments, "slot")?;
        let topic = arguments.get("topic").and_then(Value::as_str).unwrap_or("untitled call");
        Ok(ToolInvocationResult::ok_with_action(
            json!({ "booked_by": user_id, "slot": slot, "topic": topic }),
            ToolAction {
                kind: "schedule".to_string(),
                payload: json!({ "slot": slot, "topic": topic }),
            },
        ))
    }
}

struct CreateProject;

#[async_trait]
impl BuiltinTool for CreateProject {
    fn name(&self) -> &'static str {
        "create_project"
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        identity: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        let user_id = required_user(identity, "create_project")?;
        let name = required_str(arguments, "name")?;
        Ok(ToolInvocationResult::ok(json!({
            "id": format!("proj-{}", name.to_lowercase().replace(' ', "-")),
            "name": name,
            "created_by": user_id,
        })))
    }
}

struct CreateTicket;

#[async_trait]
impl BuiltinTool for CreateTicket {
    fn name(&self) -> &'static str {
        "create_ticket"
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        identity: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        required_user(identity, "create_ticket")?;
        let project_id = required_str(arguments, "project_id")?;
        let title = required_str(arguments, "title")?;
        Ok(ToolInvocationResult::ok(json!({
            "project_id": project_id,
            "title": title,
            "status": "todo",
        })))
    }
}

struct Remember;

#[async_trait]
impl BuiltinTool for Remember {
    fn name(&self) -> &'static str {
        "remember"
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        identity: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        let user_id = required_user(identity, "remember")?;
        let fact = required_str(arguments, "fact")?;
        Ok(ToolInvocationResult::ok(json!({ "stored": true, "fact": fact, "user": user_id })))
    }
}

struct RecallPreference;

#[async_trait]
impl BuiltinTool for RecallPreference {
    fn name(&self) -> &'static str {
        "recall_preference"
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        identity: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        required_user(identity, "recall_preference")?;
        let topic = required_str(arguments, "topic")?;
        Ok(ToolInvocationResult::ok(json!({ "topic": topic, "preference": null })))
    }
}

struct SendChannelMessage;

#[async_trait]
impl BuiltinTool for SendChannelMessage {
    fn name(&self) -> &'static str {
        "send_channel_message"
    }

    async fn execute(
        &self,
        arguments: &Map<String, Value>,
        identity: &Identity,
    ) -> anyhow::Result<ToolInvocationResult> {
        required_user(identity, "send_channel_message")?;
        let channel = required_str(arguments, "channel")?;
        let text = required_str(arguments, "text")?;
        Ok(ToolInvocationResult::ok(json!({
            "channel": channel,
            "queued": true,
            "length": text.len(),
        })))
    }
}

//! Capability registry and the permit/deny partition.
//!
//! Two trust boundaries collapse into one function: the registry decides which
//! tools are *offered* to the backend, and [`partition`] re-validates whatever
//! the backend actually requests. Both sites call the same logic so the
//! allow-list and the re-check can never drift apart.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use serde_json::{json, Value};

use crate::domain::access::AccessTier;
use crate::domain::tools::ToolInvocationRequest;

/// One invocable capability. `min_tier` is the lowest tier allowed to use it,
/// so the grant at any tier is a superset of every lower tier by construction.
#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub min_tier: AccessTier,
    pub parameters: Value,
}

fn string_param(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn no_params() -> Value {
    json!({ "type": "object", "properties": {}, "required": [] })
}

fn registry() -> &'static Vec<ToolDefinition> {
    static REGISTRY: OnceLock<Vec<ToolDefinition>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        use AccessTier::{Collaborator, Owner, Visitor};
        vec![
            // Portfolio exploration, open to everyone.
            ToolDefinition {
                name: "search_portfolio",
                description: "Search projects, posts, and pages in the portfolio.",
                min_tier: Visitor,
                parameters: json!({
                    "type": "object",
                    "properties": { "query": string_param("Search terms") },
                    "required": ["query"]
                }),
            },
            ToolDefinition {
                name: "navigate_to",
                description: "Navigate the client to a route within the site.",
                min_tier: Visitor,
                parameters: json!({
                    "type": "object",
                    "properties": { "route": string_param("Target route, e.g. /projects") },
                    "required": ["route"]
                }),
            },
            ToolDefinition {
                name: "list_themes",
                description: "List the available UI themes.",
                min_tier: Visitor,
                parameters: no_params(),
            },
            ToolDefinition {
                name: "show_weather",
                description: "Show current weather for the visitor's location.",
                min_tier: Visitor,
                parameters: json!({
                    "type": "object",
                    "properties": { "location": string_param("City name, optional") },
                    "required": []
                }),
            },
            // Read-only project views for authenticated collaborators.
            ToolDefinition {
                name: "list_projects",
                description: "List active projects with their status.",
                min_tier: Collaborator,
                parameters: no_params(),
            },
            ToolDefinition {
                name: "get_project_board",
                description: "Fetch the kanban board for a project (read-only).",
                min_tier: Collaborator,
                parameters: json!({
                    "type": "object",
                    "properties": { "project_id": string_param("Project identifier") },
                    "required": ["project_id"]
                }),
            },
            ToolDefinition {
                name: "get_available_times",
                description: "List open scheduling slots (view only, no booking).",
                min_tier: Collaborator,
                parameters: no_params(),
            },
            ToolDefinition {
                name: "get_upcoming_bookings",
                description: "List upcoming booked meetings (view only).",
                min_tier: Collaborator,
                parameters: no_params(),
            },
            // Mutations, memory, and messaging stay owner-only.
            ToolDefinition {
                name: "schedule_call",
                description: "Book a call at a given slot.",
                min_tier: Owner,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "slot": string_param("ISO-8601 start time"),
                        "topic": string_param("What the call is about")
                    },
                    "required": ["slot"]
                }),
            },
            ToolDefinition {
                name: "create_project",
                description: "Create a new project record.",
                min_tier: Owner,
                parameters: json!({
                    "type": "object",
                    "properties": { "name": string_param("Project name") },
                    "required": ["name"]
                }),
            },
            ToolDefinition {
                name: "create_ticket",
                description: "Create a ticket inside an existing project.",
                min_tier: Owner,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "project_id": string_param("Project identifier"),
                        "title": string_param("Ticket title")
                    },
                    "required": ["project_id", "title"]
                }),
            },
            ToolDefinition {
                name: "remember",
                description: "Store a fact in the owner's long-term memory.",
                min_tier: Owner,
                parameters: json!({
                    "type": "object",
                    "properties": { "fact": string_param("The fact to store") },
                    "required": ["fact"]
                }),
            },
            ToolDefinition {
                name: "recall_preference",
                description: "Recall a stored preference from memory.",
                min_tier: Owner,
                parameters: json!({
                    "type": "object",
                    "properties": { "topic": string_param("Preference topic") },
                    "required": ["topic"]
                }),
            },
            ToolDefinition {
                name: "send_channel_message",
                description: "Send a message through a connected channel integration.",
                min_tier: Owner,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "channel": string_param("Channel name, e.g. whatsapp"),
                        "text": string_param("Message body")
                    },
                    "required": ["channel", "text"]
                }),
            },
        ]
    })
}

/// Session-scoped external registry tools. These are never granted by tier;
/// the caller opts into them per request and the same partition logic runs
/// against the opt-in list.
pub fn registry_tool_definitions() -> &'static Vec<ToolDefinition> {
    static TOOLS: OnceLock<Vec<ToolDefinition>> = OnceLock::new();
    TOOLS.get_or_init(|| {
        vec![
            ToolDefinition {
                name: "search_registry_tools",
                description: "Search the external tool registry for tools matching a query.",
                min_tier: AccessTier::Visitor,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": string_param("Search query, e.g. \"web scraping\""),
                        "limit": { "type": "number", "description": "Max results (default 10)" }
                    },
                    "required": ["query"]
                }),
            },
            ToolDefinition {
                name: "execute_registry_tool",
                description: "Execute a registry tool found via search_registry_tools.",
                min_tier: AccessTier::Visitor,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "tool_id": string_param("Registry tool id"),
                        "params": { "type": "object", "description": "Tool parameters" }
                    },
                    "required": ["tool_id", "params"]
                }),
            },
            ToolDefinition {
                name: "check_registry_health",
                description: "Check whether the external tool registry executor is available.",
                min_tier: AccessTier::Visitor,
                parameters: no_params(),
            },
        ]
    })
}

pub fn registry_tool_names() -> BTreeSet<String> {
    registry_tool_definitions().iter().map(|tool| tool.name.to_string()).collect()
}

/// All built-in definitions offered at a tier. Monotone in the tier order.
pub fn granted_definitions(tier: AccessTier) -> Vec<&'static ToolDefinition> {
    registry().iter().filter(|tool| tool.min_tier <= tier).collect()
}

/// Name set form of [`granted_definitions`], used by the partition re-check.
pub fn granted_names(tier: AccessTier) -> BTreeSet<String> {
    granted_definitions(tier).into_iter().map(|tool| tool.name.to_string()).collect()
}

pub fn builtin_tool_names() -> BTreeSet<String> {
    registry().iter().map(|tool| tool.name.to_string()).collect()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub permitted: Vec<ToolInvocationRequest>,
    pub denied: Vec<ToolInvocationRequest>,
}

/// Partition requested invocations by membership in an allowed name set.
/// Applied both when offering tools and when re-validating backend requests.
pub fn partition(
    requested: Vec<ToolInvocationRequest>,
    allowed: &BTreeSet<String>,
) -> Partition {
    let mut result = Partition::default();
    for request in requested {
        if allowed.contains(&request.name) {
            result.permitted.push(request);
        } else {
            result.denied.push(request);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::{
        builtin_tool_names, granted_names, partition, registry_tool_names, ToolInvocationRequest,
    };
    use crate::domain::access::AccessTier;

    fn request(name: &str) -> ToolInvocationRequest {
        ToolInvocationRequest::new("call-1", name, Map::new())
    }

    #[test]
    fn grants_are_monotone_across_tiers() {
        let visitor = granted_names(AccessTier::Visitor);
        let collaborator = granted_names(AccessTier::Collaborator);
        let owner = granted_names(AccessTier::Owner);

        assert!(visitor.is_subset(&collaborator));
        assert!(collaborator.is_subset(&owner));
        assert!(visitor.len() < collaborator.len());
        assert!(collaborator.len() < owner.len());
    }

    #[test]
    fn owner_grant_covers_the_whole_registry() {
        assert_eq!(granted_names(AccessTier::Owner), builtin_tool_names());
    }

    #[test]
    fn visitor_cannot_see_owner_mutations() {
        let visitor = granted_names(AccessTier::Visitor);
        assert!(visitor.contains("search_portfolio"));
        assert!(!visitor.contains("remember"));
        assert!(!visitor.contains("schedule_call"));
    }

    #[test]
    fn partition_splits_by_membership() {
        let allowed = granted_names(AccessTier::Collaborator);
        let split = partition(
            vec![request("list_projects"), request("send_channel_message"), request("navigate_to")],
            &allowed,
        );

        let permitted: Vec<_> = split.permitted.iter().map(|r| r.name.as_str()).collect();
        let denied: Vec<_> = split.denied.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(permitted, vec!["list_projects", "navigate_to"]);
        assert_eq!(denied, vec!["send_channel_message"]);
    }

    #[test]
    fn registry_tools_are_not_in_the_tier_registry() {
        let owner = granted_names(AccessTier::Owner);
        for name in registry_tool_names() {
            assert!(!owner.contains(&name), "{name} must be opt-in only");
        }
    }
}

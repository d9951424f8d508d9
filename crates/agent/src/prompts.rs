//! Tier-layered persona prompt assembly.
//!
//! Visitor loads the base layer only, collaborator adds the professional
//! layer, owner adds the private layer. Private context is never assembled
//! for lower tiers. The provider note, memory context, session tool context,
//! and app context are appended as opaque sections.

use parley_core::domain::access::AccessTier;
use parley_core::domain::provider::BackendKind;
use serde::Deserialize;

const BASE_LAYER: &str = "\
You are the resident assistant for this portfolio site. Be concise, helpful, \
and honest about what you can and cannot do. You may search and navigate the \
public portfolio on the visitor's behalf.";

const PROFESSIONAL_LAYER: &str = "\
The caller is a known collaborator. You may discuss active projects, boards, \
and scheduling availability in read-only terms. Do not reveal private notes \
or personal context.";

const PRIVATE_LAYER: &str = "\
The caller is the owner. Full context applies: private notes, long-term \
memory, project mutations, scheduling, and channel messaging are all in \
scope.";

/// Client application context forwarded with the request; consumed verbatim.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppContext {
    pub app_id: String,
    pub app_name: String,
    pub route: String,
    pub description: String,
    #[serde(default)]
    pub context_hints: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PromptSections {
    pub memory_context: Option<String>,
    pub app_context: Option<AppContext>,
    pub session_tool_names: Vec<String>,
    pub provider_note: String,
}

/// Layer names loaded at a tier, logged for access monitoring.
pub fn loaded_layers(tier: AccessTier) -> Vec<&'static str> {
    match tier {
        AccessTier::Visitor => vec!["base"],
        AccessTier::Collaborator => vec!["base", "professional"],
        AccessTier::Owner => vec!["base", "professional", "private"],
    }
}

pub fn assemble(tier: AccessTier, sections: &PromptSections) -> String {
    let mut prompt = String::from(BASE_LAYER);

    if tier >= AccessTier::Collaborator {
        prompt.push_str("\n\n");
        prompt.push_str(PROFESSIONAL_LAYER);
    }
    if tier >= AccessTier::Owner {
        prompt.push_str("\n\n");
        prompt.push_str(PRIVATE_LAYER);
    }

    if let Some(app) = &sections.app_context {
        prompt.push_str(&format!(
            "\n\n## App Context\nThe user is in \"{}\" ({}) at route {}. {}",
            app.app_name, app.app_id, app.route, app.description
        ));
        for hint in &app.context_hints {
            prompt.push_str(&format!("\n- {hint}"));
        }
    }

    if let Some(memory) = &sections.memory_context {
        prompt.push_str("\n\n## Memory Context\n");
        prompt.push_str(memory);
    }

    if !sections.session_tool_names.is_empty() {
        prompt.push_str(
            "\n\n## Session Registry Tools\nThe user enabled these external registry tools for \
             this session:",
        );
        for name in &sections.session_tool_names {
            prompt.push_str(&format!("\n- {name}"));
        }
    }

    prompt.push_str("\n\n## Provider Context\n");
    prompt.push_str(&sections.provider_note);

    prompt
}

/// Human-readable note about which backend is serving this request.
pub fn provider_note(backend: BackendKind, model: &str, tools_enabled: bool) -> String {
    match backend {
        BackendKind::Cloud => format!(
            "You are running on cloud inference ({model}).{}",
            if tools_enabled {
                " Full tool calling is available; use your tools when appropriate."
            } else {
                ""
            }
        ),
        BackendKind::Local => format!(
            "You are running on local inference ({model}, direct). Responses stay on the owner's \
             machine. Tool execution is unavailable in this mode; the system switches to cloud \
             when an action is requested."
        ),
        BackendKind::Tunnel => format!(
            "You are running on local inference ({model}, tunnel relay). Responses stay on the \
             owner's machine. Tool execution is unavailable in this mode; the system switches to \
             cloud when an action is requested."
        ),
    }
}

#[cfg(test)]
mod tests {
    use parley_core::domain::access::AccessTier;
    use parley_core::domain::provider::BackendKind;

    use super::{assemble, loaded_layers, provider_note, PromptSections};

    #[test]
    fn private_layer_never_loads_below_owner() {
        let sections = PromptSections {
            provider_note: provider_note(BackendKind::Cloud, "gpt-4o", true),
            ..PromptSections::default()
        };

        let visitor = assemble(AccessTier::Visitor, &sections);
        let collaborator = assemble(AccessTier::Collaborator, &sections);
        let owner = assemble(AccessTier::Owner, &sections);

        assert!(!visitor.contains("The caller is the owner"));
        assert!(!collaborator.contains("The caller is the owner"));
        assert!(owner.contains("The caller is the owner"));
        assert!(collaborator.contains("known collaborator"));
        assert!(!visitor.contains("known collaborator"));
    }

    #[test]
    fn layer_names_follow_the_tier_ladder() {
        assert_eq!(loaded_layers(AccessTier::Visitor), vec!["base"]);
        assert_eq!(
            loaded_layers(AccessTier::Owner),
            vec!["base", "professional", "private"]
        );
    }

    #[test]
    fn memory_and_session_tools_are_appended_when_present() {
        let sections = PromptSections {
            memory_context: Some("Prefers short answers.".to_string()),
            session_tool_names: vec!["search_registry_tools".to_string()],
            provider_note: provider_note(BackendKind::Local, "llama3.1", false),
            ..PromptSections::default()
        };

        let prompt = assemble(AccessTier::Owner, &sections);
        assert!(prompt.contains("## Memory Context"));
        assert!(prompt.contains("Prefers short answers."));
        assert!(prompt.contains("search_registry_tools"));
        assert!(prompt.contains("local inference"));
    }
}

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of the caller-supplied conversation history. The orchestrator
/// never mutates history; phase two of the tool protocol extends a working
/// copy instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Last user-authored message, used for memory recall and the hybrid
/// tool-trigger check.
pub fn last_user_content(messages: &[ConversationMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|message| message.role == Role::User)
        .map(|message| message.content.as_str())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::{last_user_content, ConversationMessage};

    #[test]
    fn last_user_content_skips_assistant_turns() {
        let messages = vec![
            ConversationMessage::user("first"),
            ConversationMessage::assistant("reply"),
            ConversationMessage::user("second"),
            ConversationMessage::assistant("another"),
        ];
        assert_eq!(last_user_content(&messages), "second");
    }

    #[test]
    fn last_user_content_is_empty_without_user_turns() {
        assert_eq!(last_user_content(&[ConversationMessage::assistant("hi")]), "");
    }
}

use serde::{Deserialize, Serialize};

/// Caller privilege tier. The derived `Ord` follows declaration order, so
/// `Visitor < Collaborator < Owner` holds and capability grants can rely on
/// simple tier comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    Visitor,
    Collaborator,
    Owner,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visitor => "visitor",
            Self::Collaborator => "collaborator",
            Self::Owner => "owner",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "visitor" => Some(Self::Visitor),
            "collaborator" => Some(Self::Collaborator),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved caller identity. Created once per request and never mutated or
/// persisted by this subsystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub tier: AccessTier,
    pub user_id: Option<String>,
}

impl Identity {
    pub fn visitor() -> Self {
        Self { tier: AccessTier::Visitor, user_id: None }
    }

    pub fn owner(user_id: impl Into<String>) -> Self {
        Self { tier: AccessTier::Owner, user_id: Some(user_id.into()) }
    }

    pub fn is_owner(&self) -> bool {
        self.tier == AccessTier::Owner
    }

    /// Memory persistence is an owner-only concern and needs a stable user id.
    pub fn memory_enabled(&self) -> bool {
        self.is_owner() && self.user_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessTier, Identity};

    #[test]
    fn tier_order_is_visitor_collaborator_owner() {
        assert!(AccessTier::Visitor < AccessTier::Collaborator);
        assert!(AccessTier::Collaborator < AccessTier::Owner);
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!(AccessTier::parse("Owner"), Some(AccessTier::Owner));
        assert_eq!(AccessTier::parse(" collaborator "), Some(AccessTier::Collaborator));
        assert_eq!(AccessTier::parse("root"), None);
    }

    #[test]
    fn memory_requires_owner_with_user_id() {
        assert!(Identity::owner("user-1").memory_enabled());
        assert!(!Identity::visitor().memory_enabled());
        assert!(!Identity { tier: AccessTier::Owner, user_id: None }.memory_enabled());
    }
}

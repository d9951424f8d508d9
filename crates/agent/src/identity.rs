//! Access tier resolution from session state.
//!
//! Order of checks: authenticated session, then the legacy signed admin
//! cookie, then visitor. Verification failures always land on visitor.

use parley_core::auth::TokenVerifier;
use parley_core::domain::access::{AccessTier, Identity};
use tracing::info;

/// Session state extracted by the HTTP layer. `claimed_tier` comes from the
/// request body and is only honored for trusted channels.
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    /// Subject of the primary authenticated session, if any.
    pub session_user_id: Option<String>,
    /// Legacy passcode-auth admin cookie value.
    pub admin_token: Option<String>,
    pub channel: Option<String>,
    pub claimed_tier: Option<AccessTier>,
}

pub struct IdentityResolver {
    verifier: Option<TokenVerifier>,
    trusted_channels: Vec<String>,
}

impl IdentityResolver {
    pub fn new(verifier: Option<TokenVerifier>, trusted_channels: Vec<String>) -> Self {
        Self { verifier, trusted_channels }
    }

    pub fn resolve(&self, session: &SessionContext) -> Identity {
        let mut identity = self.resolve_session(session);

        // Narrow bypass: a pre-verified channel integration may carry a tier
        // claim for the contact it authenticated upstream. Gated by the
        // channel allow-list, never by the raw channel string alone.
        if let (Some(channel), Some(claimed)) = (&session.channel, session.claimed_tier) {
            if self.trusted_channels.iter().any(|trusted| trusted == channel) {
                info!(
                    event_name = "identity.channel_override",
                    channel = %channel,
                    tier = %claimed,
                    "using channel-supplied access tier"
                );
                identity.tier = claimed;
            }
        }

        identity
    }

    fn resolve_session(&self, session: &SessionContext) -> Identity {
        if let Some(user_id) = &session.session_user_id {
            if !user_id.trim().is_empty() {
                return Identity::owner(user_id.clone());
            }
        }

        if let (Some(token), Some(verifier)) = (&session.admin_token, &self.verifier) {
            if let Some(claims) = verifier.verify(token) {
                if claims.kind == "admin" {
                    return Identity::owner(format!("admin-{}", claims.subject));
                }
            }
        }

        Identity::visitor()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use parley_core::auth::TokenVerifier;
    use parley_core::domain::access::AccessTier;

    use super::{IdentityResolver, SessionContext};

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(b"identity-test-signing-key", 86_400)
    }

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(Some(verifier()), vec!["whatsapp".to_string()])
    }

    #[test]
    fn authenticated_session_resolves_to_owner() {
        let identity = resolver().resolve(&SessionContext {
            session_user_id: Some("user-42".to_string()),
            ..SessionContext::default()
        });
        assert_eq!(identity.tier, AccessTier::Owner);
        assert_eq!(identity.user_id.as_deref(), Some("user-42"));
    }

    #[test]
    fn valid_admin_cookie_resolves_to_owner_with_derived_id() {
        let token = verifier().sign("admin", "nick", Utc::now());
        let identity = resolver().resolve(&SessionContext {
            admin_token: Some(token),
            ..SessionContext::default()
        });
        assert_eq!(identity.tier, AccessTier::Owner);
        assert_eq!(identity.user_id.as_deref(), Some("admin-nick"));
    }

    #[test]
    fn wrong_subject_kind_fails_closed() {
        let token = verifier().sign("service", "batch-job", Utc::now());
        let identity = resolver().resolve(&SessionContext {
            admin_token: Some(token),
            ..SessionContext::default()
        });
        assert_eq!(identity.tier, AccessTier::Visitor);
        assert!(identity.user_id.is_none());
    }

    #[test]
    fn garbage_token_fails_closed() {
        let identity = resolver().resolve(&SessionContext {
            admin_token: Some("not.a.real.token".to_string()),
            ..SessionContext::default()
        });
        assert_eq!(identity.tier, AccessTier::Visitor);
    }

    #[test]
    fn trusted_channel_claim_overrides_tier() {
        let identity = resolver().resolve(&SessionContext {
            channel: Some("whatsapp".to_string()),
            claimed_tier: Some(AccessTier::Collaborator),
            ..SessionContext::default()
        });
        assert_eq!(identity.tier, AccessTier::Collaborator);
    }

    #[test]
    fn untrusted_channel_claim_is_ignored() {
        let identity = resolver().resolve(&SessionContext {
            channel: Some("carrier-pigeon".to_string()),
            claimed_tier: Some(AccessTier::Owner),
            ..SessionContext::default()
        });
        assert_eq!(identity.tier, AccessTier::Visitor);
    }

    #[test]
    fn claim_without_channel_is_ignored() {
        let identity = resolver().resolve(&SessionContext {
            claimed_tier: Some(AccessTier::Owner),
            ..SessionContext::default()
        });
        assert_eq!(identity.tier, AccessTier::Visitor);
    }

    #[test]
    fn no_verifier_configured_means_cookie_is_inert() {
        let resolver = IdentityResolver::new(None, Vec::new());
        let token = verifier().sign("admin", "nick", Utc::now());
        let identity = resolver.resolve(&SessionContext {
            admin_token: Some(token),
            ..SessionContext::default()
        });
        assert_eq!(identity.tier, AccessTier::Visitor);
    }
}

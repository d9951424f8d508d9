//! Provider routing state machine: one primary attempt, at most one cloud
//! fallback, never a retry loop.

use std::sync::Arc;

use parley_core::domain::provider::{BackendKind, FallbackTarget, ProviderSelection};
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::{BackendError, BackendReply, CompletionBackend, CompletionRequest};

#[derive(Debug, Error)]
pub enum RouteError {
    /// A required credential or endpoint is absent. Not retried; surfaces as
    /// a configuration failure, not a provider failure.
    #[error("routing configuration failure: {0}")]
    Configuration(String),
    #[error("{0}")]
    Exhausted(String),
}

#[derive(Debug)]
pub struct RoutedReply {
    pub reply: BackendReply,
    pub backend: BackendKind,
    pub fallback_used: bool,
    pub fallback_reason: Option<String>,
}

pub struct ProviderRouter {
    cloud: Arc<dyn CompletionBackend>,
    local: Arc<dyn CompletionBackend>,
    tunnel: Arc<dyn CompletionBackend>,
    tunnel_reachable: bool,
}

impl ProviderRouter {
    pub fn new(
        cloud: Arc<dyn CompletionBackend>,
        local: Arc<dyn CompletionBackend>,
        tunnel: Arc<dyn CompletionBackend>,
        tunnel_reachable: bool,
    ) -> Self {
        Self { cloud, local, tunnel, tunnel_reachable }
    }

    fn backend(&self, kind: BackendKind) -> &Arc<dyn CompletionBackend> {
        match kind {
            BackendKind::Cloud => &self.cloud,
            BackendKind::Local => &self.local,
            BackendKind::Tunnel => &self.tunnel,
        }
    }

    /// Routing precondition: a tunnel primary the serving environment cannot
    /// reach is rewritten to cloud before any attempt is made.
    pub fn effective_primary(&self, selection: ProviderSelection) -> BackendKind {
        if selection.primary == BackendKind::Tunnel && !self.tunnel_reachable {
            info!(
                event_name = "router.tunnel_unreachable",
                "tunnel backend unreachable from server, routing primary to cloud"
            );
            BackendKind::Cloud
        } else {
            selection.primary
        }
    }

    pub async fn route(
        &self,
        request: CompletionRequest,
        selection: ProviderSelection,
    ) -> Result<RoutedReply, RouteError> {
        let primary = self.effective_primary(selection);

        let primary_error = match self.backend(primary).complete(request.clone()).await {
            Ok(reply) => {
                return Ok(RoutedReply {
                    reply,
                    backend: primary,
                    fallback_used: false,
                    fallback_reason: None,
                });
            }
            Err(BackendError::NotConfigured(detail)) if primary == BackendKind::Cloud => {
                return Err(RouteError::Configuration(detail));
            }
            Err(error) => error,
        };

        warn!(
            event_name = "router.primary_failed",
            backend = %primary,
            error = %primary_error,
            "primary backend failed"
        );

        let fallback_eligible =
            selection.fallback == FallbackTarget::Cloud && primary != BackendKind::Cloud;
        if !fallback_eligible {
            return Err(RouteError::Exhausted(format!("{primary} backend failed: {primary_error}")));
        }

        info!(event_name = "router.fallback_attempt", from = %primary, "falling back to cloud");
        match self.cloud.complete(request).await {
            Ok(reply) => Ok(RoutedReply {
                reply,
                backend: BackendKind::Cloud,
                fallback_used: true,
                fallback_reason: Some(format!("{primary} backend failed: {primary_error}")),
            }),
            Err(BackendError::NotConfigured(detail)) => Err(RouteError::Configuration(detail)),
            Err(fallback_error) => Err(RouteError::Exhausted(format!(
                "both backends failed: primary={primary_error}, fallback={fallback_error}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parley_core::domain::provider::{BackendKind, FallbackTarget, ProviderSelection};

    use super::{ProviderRouter, RouteError};
    use crate::llm::{BackendError, BackendReply, CompletionBackend, CompletionRequest};

    struct Scripted {
        reply: Option<String>,
        error: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(content: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(content.to_string()),
                error: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &'static str) -> Arc<Self> {
            Arc::new(Self { reply: None, error: Some(message), calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for Scripted {
        async fn complete(&self, _: CompletionRequest) -> Result<BackendReply, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match (&self.reply, self.error) {
                (Some(content), _) => Ok(BackendReply {
                    content: Some(content.clone()),
                    tool_calls: Vec::new(),
                    model: "scripted".to_string(),
                }),
                (None, Some(message)) => {
                    Err(BackendError::MalformedResponse(message.to_string()))
                }
                _ => unreachable!(),
            }
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::conversational("system".to_string(), Vec::new())
    }

    fn selection(primary: BackendKind, fallback: FallbackTarget) -> ProviderSelection {
        ProviderSelection { primary, fallback }
    }

    #[tokio::test]
    async fn primary_success_never_touches_fallback() {
        let cloud = Scripted::ok("cloud");
        let local = Scripted::ok("local");
        let router =
            ProviderRouter::new(cloud.clone(), local.clone(), Scripted::ok("tunnel"), true);

        let routed = router
            .route(request(), selection(BackendKind::Local, FallbackTarget::Cloud))
            .await
            .expect("local should answer");

        assert_eq!(routed.backend, BackendKind::Local);
        assert!(!routed.fallback_used);
        assert_eq!(cloud.calls(), 0);
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn failed_primary_falls_back_exactly_once() {
        let cloud = Scripted::ok("cloud answer");
        let local = Scripted::failing("connection refused");
        let router =
            ProviderRouter::new(cloud.clone(), local.clone(), Scripted::ok("tunnel"), true);

        let routed = router
            .route(request(), selection(BackendKind::Local, FallbackTarget::Cloud))
            .await
            .expect("fallback should answer");

        assert_eq!(routed.backend, BackendKind::Cloud);
        assert!(routed.fallback_used);
        assert!(routed.fallback_reason.as_deref().unwrap_or("").contains("connection refused"));
        assert_eq!(local.calls(), 1);
        assert_eq!(cloud.calls(), 1);
    }

    #[tokio::test]
    async fn no_fallback_configured_surfaces_primary_error() {
        let cloud = Scripted::ok("cloud");
        let local = Scripted::failing("down");
        let router =
            ProviderRouter::new(cloud.clone(), local.clone(), Scripted::ok("tunnel"), true);

        let error = router
            .route(request(), selection(BackendKind::Local, FallbackTarget::None))
            .await
            .expect_err("should fail");

        assert!(matches!(error, RouteError::Exhausted(_)));
        assert_eq!(cloud.calls(), 0, "fallback must never run when not configured");
    }

    #[tokio::test]
    async fn both_failed_reports_both_causes() {
        let cloud = Scripted::failing("quota exceeded");
        let local = Scripted::failing("timed out");
        let router = ProviderRouter::new(cloud, local, Scripted::ok("tunnel"), true);

        let error = router
            .route(request(), selection(BackendKind::Local, FallbackTarget::Cloud))
            .await
            .expect_err("should fail");

        let message = error.to_string();
        assert!(message.contains("both backends failed"));
        assert!(message.contains("timed out"));
        assert!(message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn cloud_primary_failure_never_retries_cloud() {
        let cloud = Scripted::failing("bad gateway");
        let router =
            ProviderRouter::new(cloud.clone(), Scripted::ok("local"), Scripted::ok("tunnel"), true);

        let error = router
            .route(request(), selection(BackendKind::Cloud, FallbackTarget::Cloud))
            .await
            .expect_err("should fail");

        assert!(matches!(error, RouteError::Exhausted(_)));
        assert_eq!(cloud.calls(), 1, "at most one cloud attempt");
    }

    #[tokio::test]
    async fn unreachable_tunnel_primary_is_rewritten_to_cloud() {
        let cloud = Scripted::ok("cloud");
        let tunnel = Scripted::ok("tunnel");
        let router =
            ProviderRouter::new(cloud.clone(), Scripted::ok("local"), tunnel.clone(), false);

        let routed = router
            .route(request(), selection(BackendKind::Tunnel, FallbackTarget::Cloud))
            .await
            .expect("cloud should answer");

        assert_eq!(routed.backend, BackendKind::Cloud);
        assert!(!routed.fallback_used, "precondition rewrite is not a fallback");
        assert_eq!(tunnel.calls(), 0);
    }

    #[tokio::test]
    async fn missing_cloud_credential_is_a_configuration_error() {
        struct NotConfigured;

        #[async_trait]
        impl CompletionBackend for NotConfigured {
            async fn complete(&self, _: CompletionRequest) -> Result<BackendReply, BackendError> {
                Err(BackendError::NotConfigured("cloud api key is missing".to_string()))
            }
        }

        let router = ProviderRouter::new(
            Arc::new(NotConfigured),
            Scripted::ok("local"),
            Scripted::ok("tunnel"),
            true,
        );

        let error = router
            .route(request(), selection(BackendKind::Cloud, FallbackTarget::None))
            .await
            .expect_err("should fail");
        assert!(matches!(error, RouteError::Configuration(_)));
    }
}

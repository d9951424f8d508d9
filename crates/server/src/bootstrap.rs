use std::sync::Arc;

use parley_agent::identity::IdentityResolver;
use parley_agent::llm::cloud::CloudBackend;
use parley_agent::llm::local::LocalBackend;
use parley_agent::llm::tunnel::TunnelBackend;
use parley_agent::memory::{HttpMemoryStore, MemoryStore, NoopMemoryStore};
use parley_agent::orchestrator::Orchestrator;
use parley_agent::router::ProviderRouter;
use parley_agent::tools::registry::HttpToolRegistryClient;
use parley_agent::tools::ToolExecutionEngine;
use parley_core::auth::TokenVerifier;
use parley_core::config::{AppConfig, ConfigError, LoadOptions};
use parley_core::rate_limit::RateLimiter;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        primary = %config.routing.primary,
        "starting application bootstrap"
    );

    let verifier = config
        .auth
        .admin_signing_key
        .as_ref()
        .map(|key| TokenVerifier::new(key.expose_secret(), config.auth.admin_token_max_age_secs));
    let resolver = IdentityResolver::new(verifier, config.auth.trusted_channels.clone());

    let router = Arc::new(ProviderRouter::new(
        Arc::new(CloudBackend::new(&config.cloud)),
        Arc::new(LocalBackend::new(&config.local)),
        Arc::new(TunnelBackend::new(&config.tunnel)),
        config.tunnel.reachable_from_server,
    ));

    let engine =
        Arc::new(ToolExecutionEngine::new(Arc::new(HttpToolRegistryClient::new(&config.registry))));

    let memory: Arc<dyn MemoryStore> = match &config.memory.base_url {
        Some(base_url) => Arc::new(HttpMemoryStore::new(base_url, &config.memory)),
        None => Arc::new(NoopMemoryStore),
    };
    info!(
        event_name = "system.bootstrap.memory_store",
        mode = if config.memory.base_url.is_some() { "http" } else { "noop" },
        "memory store initialized"
    );

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        Arc::new(RateLimiter::new()),
        resolver,
        router,
        engine,
        memory,
    ));

    info!(event_name = "system.bootstrap.complete", "application bootstrap complete");
    Ok(Application { config, orchestrator })
}

#[cfg(test)]
mod tests {
    use parley_core::config::{ConfigOverrides, LoadOptions};
    use parley_core::domain::provider::{BackendKind, FallbackTarget};

    use super::bootstrap;

    #[tokio::test]
    async fn bootstrap_succeeds_with_default_configuration() {
        let app = bootstrap(LoadOptions::default()).await.expect("bootstrap should succeed");
        assert_eq!(app.config.routing.primary, BackendKind::Cloud);
        assert_eq!(app.config.routing.fallback, FallbackTarget::None);
    }

    #[tokio::test]
    async fn bootstrap_honors_routing_overrides() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                primary_backend: Some(BackendKind::Local),
                fallback_backend: Some(FallbackTarget::Cloud),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed");

        assert_eq!(app.config.routing.primary, BackendKind::Local);
        assert_eq!(app.config.routing.fallback, FallbackTarget::Cloud);
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_configuration() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                rate_limit_max_requests: Some(100),
                rate_limit_owner_max_requests: Some(1),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;
        assert!(result.is_err());
    }
}

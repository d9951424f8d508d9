use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use parley_core::config::AppConfig;
use parley_core::domain::provider::BackendKind;
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    cloud_configured: bool,
    primary: BackendKind,
    memory_configured: bool,
    registry_configured: bool,
}

impl HealthState {
    pub fn from_config(config: &AppConfig) -> Self {
        let cloud_configured = config
            .cloud
            .api_key
            .as_ref()
            .map(|key| !key.expose_secret().is_empty())
            .unwrap_or(false);
        Self {
            cloud_configured,
            primary: config.routing.primary,
            memory_configured: config.memory.base_url.is_some(),
            registry_configured: config.registry.base_url.is_some(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub inference: HealthCheck,
    pub memory: HealthCheck,
    pub registry: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let inference = inference_check(&state);
    let ready = inference.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "parley-server runtime initialized".to_string(),
        },
        inference,
        memory: optional_check(state.memory_configured, "memory service"),
        registry: optional_check(state.registry_configured, "tool registry"),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn inference_check(state: &HealthState) -> HealthCheck {
    // Non-cloud primaries always keep cloud as the tool-path backend, so a
    // missing cloud credential degrades the service either way.
    if state.cloud_configured {
        HealthCheck {
            status: "ready",
            detail: format!("primary backend: {}", state.primary),
        }
    } else {
        HealthCheck {
            status: "degraded",
            detail: "cloud api key is not configured".to_string(),
        }
    }
}

fn optional_check(configured: bool, what: &str) -> HealthCheck {
    if configured {
        HealthCheck { status: "ready", detail: format!("{what} configured") }
    } else {
        HealthCheck { status: "disabled", detail: format!("{what} not configured") }
    }
}

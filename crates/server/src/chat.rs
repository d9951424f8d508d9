//! The conversational endpoint.
//!
//! `POST /chat` — one conversation turn. Session state rides in on headers
//! and cookies, tier claims ride in the body, and the orchestrator decides
//! what either is worth.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parley_agent::identity::SessionContext;
use parley_agent::orchestrator::{ChatRequest, Orchestrator};
use parley_core::errors::OrchestratorError;
use serde_json::json;
use tracing::{info, warn};

const SESSION_USER_HEADER: &str = "x-session-user";
const ADMIN_COOKIE: &str = "admin_session";

#[derive(Clone)]
pub struct ChatState {
    orchestrator: Arc<Orchestrator>,
}

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new().route("/chat", post(chat)).with_state(ChatState { orchestrator })
}

pub async fn chat(
    State(state): State<ChatState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    // A body that fails to deserialize is a caller mistake, so it takes the
    // same structured 400 path as an empty messages array.
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return error_response(OrchestratorError::Validation(rejection.body_text()));
        }
    };

    let session = session_from_headers(&headers);
    let client_addr = client_ip(&headers);

    match state.orchestrator.handle(request, session, &client_addr).await {
        Ok(response) => {
            info!(
                event_name = "http.chat.completed",
                tier = %response.access_level,
                provider = %response.provider,
                fallback_used = response.fallback_used,
                "chat request completed"
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(error) => error_response(error),
    }
}

fn error_response(error: OrchestratorError) -> Response {
    match &error {
        OrchestratorError::Validation(detail) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": detail }))).into_response()
        }
        OrchestratorError::RateLimited { retry_after_secs } => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": error.user_message(),
                    "retryAfter": retry_after_secs,
                })),
            )
                .into_response();
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
            response
        }
        OrchestratorError::Configuration(detail) | OrchestratorError::Provider(detail) => {
            warn!(
                event_name = "http.chat.failed",
                error = %detail,
                "chat request failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": error.user_message() })))
                .into_response()
        }
    }
}

fn session_from_headers(headers: &HeaderMap) -> SessionContext {
    SessionContext {
        session_user_id: header_value(headers, SESSION_USER_HEADER),
        admin_token: cookie_value(headers, ADMIN_COOKIE),
        channel: None,
        claimed_tier: None,
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get("cookie")?.to_str().ok()?;
    raw.split(';').map(str::trim).find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// Client address for rate limiting. Proxy headers are checked most-specific
/// first; an unattributable request degrades to a shared "unknown" budget
/// rather than an unlimited one.
pub fn client_ip(headers: &HeaderMap) -> String {
    for name in ["x-vercel-forwarded-for", "cf-connecting-ip", "x-forwarded-for", "x-real-ip"] {
        if let Some(value) = header_value(headers, name) {
            if let Some(first) = value.split(',').next().map(str::trim) {
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
    use http_body_util::BodyExt;
    use parley_agent::identity::IdentityResolver;
    use parley_agent::llm::{BackendError, BackendReply, CompletionBackend, CompletionRequest};
    use parley_agent::memory::NoopMemoryStore;
    use parley_agent::orchestrator::Orchestrator;
    use parley_agent::router::ProviderRouter;
    use parley_agent::tools::registry::ToolRegistryClient;
    use parley_agent::tools::ToolExecutionEngine;
    use parley_core::config::AppConfig;
    use parley_core::rate_limit::RateLimiter;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{client_ip, cookie_value, router};

    struct CannedBackend(&'static str);

    #[async_trait]
    impl CompletionBackend for CannedBackend {
        async fn complete(&self, _: CompletionRequest) -> Result<BackendReply, BackendError> {
            Ok(BackendReply {
                content: Some(self.0.to_string()),
                tool_calls: Vec::new(),
                model: "gpt-4o".to_string(),
            })
        }
    }

    struct UnusedRegistry;

    #[async_trait]
    impl ToolRegistryClient for UnusedRegistry {
        async fn search(&self, _: &str, _: Option<u32>) -> anyhow::Result<Value> {
            anyhow::bail!("not configured")
        }

        async fn execute(&self, _: &str, _: &Value) -> anyhow::Result<Value> {
            anyhow::bail!("not configured")
        }

        async fn health(&self) -> anyhow::Result<Value> {
            anyhow::bail!("not configured")
        }
    }

    fn test_router(max_requests: u32) -> axum::Router {
        let mut config = AppConfig::default();
        config.rate_limit.max_requests = max_requests;

        let provider_router = Arc::new(ProviderRouter::new(
            Arc::new(CannedBackend("canned answer")),
            Arc::new(CannedBackend("local")),
            Arc::new(CannedBackend("tunnel")),
            true,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            Arc::new(RateLimiter::new()),
            IdentityResolver::new(None, vec!["whatsapp".to_string()]),
            provider_router,
            Arc::new(ToolExecutionEngine::new(Arc::new(UnusedRegistry))),
            Arc::new(NoopMemoryStore),
        ));

        router(orchestrator)
    }

    fn chat_request(body: Value, ip: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-real-ip", ip)
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn chat_answers_a_simple_message() {
        let app = test_router(10);
        let request = chat_request(json!({ "messages": [{ "role": "user", "content": "hi" }] }), "7.7.7.7");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["content"], json!("canned answer"));
        assert_eq!(body["accessLevel"], json!("visitor"));
        assert_eq!(body["provider"], json!("cloud"));
    }

    #[tokio::test]
    async fn empty_messages_is_a_bad_request() {
        let app = test_router(10);
        let request = chat_request(json!({ "messages": [] }), "7.7.7.8");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap_or("").contains("messages"));
    }

    #[tokio::test]
    async fn undeserializable_body_is_a_bad_request_with_json_error() {
        let app = test_router(10);
        let request = chat_request(json!({ "messages": "not-an-array" }), "7.7.7.12");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert!(!body["error"].as_str().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn rate_limited_requests_get_retry_after() {
        let app = test_router(1);
        let message = json!({ "messages": [{ "role": "user", "content": "hi" }] });

        let first = app
            .clone()
            .oneshot(chat_request(message.clone(), "7.7.7.9"))
            .await
            .expect("response");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(chat_request(message, "7.7.7.9")).await.expect("response");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key("retry-after"));

        let body = body_json(second).await;
        assert!(body["retryAfter"].as_u64().unwrap_or(0) >= 1);
    }

    #[test]
    fn client_ip_prefers_the_most_specific_proxy_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("3.3.3.3, 10.0.0.1"));
        headers.insert("cf-connecting-ip", HeaderValue::from_static("2.2.2.2"));
        headers.insert("x-vercel-forwarded-for", HeaderValue::from_static("1.1.1.1"));
        assert_eq!(client_ip(&headers), "1.1.1.1");

        headers.remove("x-vercel-forwarded-for");
        assert_eq!(client_ip(&headers), "2.2.2.2");

        headers.remove("cf-connecting-ip");
        assert_eq!(client_ip(&headers), "3.3.3.3");
    }

    #[test]
    fn client_ip_without_headers_is_unknown() {
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn cookie_parsing_extracts_the_admin_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("theme=dark; admin_session=admin.nick.1700000000.abcd; lang=en"),
        );
        assert_eq!(
            cookie_value(&headers, "admin_session").as_deref(),
            Some("admin.nick.1700000000.abcd")
        );
        assert!(cookie_value(&headers, "missing").is_none());
    }
}

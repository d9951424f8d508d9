use thiserror::Error;

/// Request-terminating failures, ordered by where they short-circuit the
/// pipeline. Tool denials and tool execution failures are never errors; they
/// are structured results reported in the response body.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("bad request: {0}")]
    Validation(String),
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("provider failure: {0}")]
    Provider(String),
}

impl OrchestratorError {
    /// Message safe to return to the caller. Provider internals stay out of
    /// the response body; the full cause is logged server-side.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::RateLimited { .. } => {
                "Rate limit exceeded. Please wait before making more requests.".to_string()
            }
            Self::Configuration(_) => "The assistant is not fully configured.".to_string(),
            Self::Provider(_) => {
                "The assistant could not reach an inference backend. Please retry shortly."
                    .to_string()
            }
        }
    }
}

//! Core domain for the Parley conversation orchestrator.
//!
//! This crate holds the deterministic, dependency-light pieces of the system:
//!
//! - Access tiers and request identity (`domain::access`)
//! - Conversation message and tool invocation types (`domain`)
//! - The capability registry and the permit/deny partition (`capabilities`)
//! - The fixed-window rate limiter (`rate_limit`)
//! - Signed admin token verification (`auth`)
//! - Layered configuration (`config`)
//! - The error taxonomy shared by the agent and server crates (`errors`)
//!
//! # Safety Principle
//!
//! Nothing in this crate trusts the model backend. Capability grants are a
//! pure function of the caller's tier, and the same partition function that
//! decides which tools are offered is re-applied to whatever the backend
//! actually requests.

pub mod auth;
pub mod capabilities;
pub mod config;
pub mod domain;
pub mod errors;
pub mod rate_limit;

pub use capabilities::{granted_names, partition, registry_tool_names, Partition, ToolDefinition};
pub use domain::access::{AccessTier, Identity};
pub use domain::message::{ConversationMessage, Role};
pub use domain::provider::{BackendKind, FallbackTarget, ProviderSelection};
pub use domain::tools::{ToolAction, ToolInvocationRequest, ToolInvocationResult};
pub use errors::OrchestratorError;
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};

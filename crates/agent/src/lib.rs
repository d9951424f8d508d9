//! Agent runtime - conversation orchestration over interchangeable backends
//!
//! This crate is the "brain" of the parley system. It composes the pieces
//! `parley-core` defines into the two-phase completion protocol:
//!
//! 1. **Identity resolution** (`identity`) - session state → access tier
//! 2. **Provider routing** (`router`, `llm`) - primary backend plus at most
//!    one configured cloud fallback
//! 3. **Tool execution** (`tools`) - sequential, failure-isolated dispatch to
//!    in-process capabilities or the external tool registry
//! 4. **Orchestration** (`orchestrator`) - the request state machine and the
//!    final response payload
//!
//! # Key Types
//!
//! - `Orchestrator` - the entry point (see `orchestrator` module)
//! - `CompletionBackend` - pluggable trait for cloud/local/tunnel adapters
//! - `MemoryStore` - best-effort interaction persistence, never awaited on
//!   the response path
//!
//! # Safety Principle
//!
//! The backend is only ever *offered* the capability set its caller's tier
//! grants, and whatever it requests is re-partitioned against that same set.
//! A misbehaving model can name any tool it likes; a denied invocation never
//! executes.

pub mod identity;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompts;
pub mod router;
pub mod tools;

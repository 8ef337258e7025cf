//! # agent-core
//!
//! Tool-calling runtime over pluggable capability providers, plus a phased
//! multi-role review council.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Runner                              │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │  Tool Loop  │──│ CapabilityRegistry│──│   LlmProvider   │  │
//! │  │  (Trace)    │  │  provider_cap     │  │   (Strategy)    │  │
//! │  └─────────────┘  └──────────────────┘  └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     CouncilOrchestrator                      │
//! │  resolve ─▶ intake ─▶ review (fan-out) ─▶ debate ─▶ verdict  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps both workflows independent of the inference
//! backend; `CapabilityProvider` does the same for the tool side.

pub mod capability;
pub mod council;
pub mod error;
pub mod hooks;
pub mod message;
pub mod models;
pub mod provider;
pub mod registry;
pub mod runner;
pub mod trace;

pub use capability::{Arguments, Capability, CapabilityProvider, ParamType, ParameterSchema, PromptTemplate, Resource, ToolSchema};
pub use council::{
    AgentRole, AgentRoleConfig, CouncilConfig, CouncilMessage, CouncilOrchestrator, CouncilSession, CouncilStatus,
    Finding, MessageKind, RoleAssignment, Severity,
};
pub use error::{AgentError, Result};
pub use hooks::{CouncilHooks, NoopHooks, RunHooks};
pub use message::{Conversation, Message, Role, ToolInvocation};
pub use models::resolve_model;
pub use provider::{ChatResponse, ChatStream, FinishReason, GenerationOptions, LlmProvider, MockProvider, ModelInfo, StreamChunk, TokenUsage};
pub use registry::{CapabilityRegistry, QualifiedName};
pub use runner::{Runner, RunnerBuilder, RunnerConfig};
pub use trace::{Step, StepType, Trace, TraceEvaluation, TraceProfile};

pub use tokio_util::sync::CancellationToken;

//! # agent-runtime
//!
//! Inference backends for the tool-calling runner and the council.
//!
//! ## Providers
//!
//! - **Ollama** (default): Local LLM inference through the `ollama-rs` client
//! - **OpenAI** (coming soon): OpenAI API integration
//! - **Anthropic** (coming soon): Claude API integration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::ollama::OllamaProvider;
//!
//! let provider = Arc::new(OllamaProvider::from_env()?);
//! let runner = RunnerBuilder::new()
//!     .provider(provider)
//!     .registry(registry)
//!     .build()?;
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};

// Re-export core types for convenience
pub use agent_core::{
    AgentError, ChatResponse, ChatStream, GenerationOptions, LlmProvider, Message, ModelInfo, Result, Role,
    StreamChunk,
};

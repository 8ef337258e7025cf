//! Inference Client Strategy Pattern
//!
//! Defines the common interface every LLM backend implements. The runner and
//! the council only ever talk to a backend through [`LlmProvider`], so Ollama,
//! an OpenAI-compatible server or the scripted [`MockProvider`] are
//! interchangeable.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{GenerationOptions, LlmProvider};
//!
//! let response = provider
//!     .chat("llama3.2", &messages, &registry.list_capabilities(), &GenerationOptions::default())
//!     .await?;
//! ```

mod mock;

pub use mock::MockProvider;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::capability::ToolSchema;
use crate::error::Result;
use crate::message::{Message, ToolInvocation};

/// Sampling configuration for a chat call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

const fn default_temperature() -> f32 { 0.7 }
const fn default_max_tokens() -> u32 { 2048 }
const fn default_top_p() -> f32 { 0.9 }

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            stop_sequences: Vec::new(),
        }
    }
}

/// Response from a single-shot chat call
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Final text (may be empty when the model only invokes capabilities)
    pub content: String,

    /// Pending capability invocations, in the order the model issued them
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Backend-reported call duration
    pub duration_ms: Option<u64>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl ChatResponse {
    /// A final textual answer
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some(FinishReason::Stop),
            ..Default::default()
        }
    }

    /// A response that only invokes capabilities
    pub fn invocations(calls: Vec<ToolInvocation>) -> Self {
        Self {
            tool_calls: calls,
            finish_reason: Some(FinishReason::ToolUse),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_usage(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        self.usage = Some(TokenUsage::new(prompt_tokens, completion_tokens));
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Total tokens consumed by this call, zero when unreported
    pub fn total_tokens(&self) -> u32 {
        self.usage.as_ref().map_or(0, |u| u.total_tokens)
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    Error,
}

/// A chunk from a streaming chat call
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The text delta
    pub delta: String,

    /// Whether this is the final chunk
    pub done: bool,

    /// Token usage (typically only on final chunk)
    pub usage: Option<TokenUsage>,
}

/// Stream type for chat streaming. Individual items may fail; consumers
/// skip failed chunks rather than abandoning the stream.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub context_length: Option<u32>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            context_length: None,
        }
    }
}

/// Strategy trait for inference backends
///
/// Implement this trait to add support for new LLM backends.
/// The runner and council work exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Check if the provider is reachable and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Single-shot chat call; `tools` may be empty
    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<ChatResponse>;

    /// Streaming chat call yielding incremental text
    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChatStream>;

    /// List models currently available on the backend
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference on the
//! `ollama-rs` client, with native tool calling, streamed chat and the
//! installed model list. Connection failures and rate limits are retried
//! with linear backoff.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use agent_core::{
    capability::ToolSchema,
    error::{AgentError, Result},
    message::{Message, Role, ToolInvocation},
    provider::{
        ChatResponse, ChatStream, FinishReason, GenerationOptions, LlmProvider, ModelInfo, StreamChunk,
        TokenUsage,
    },
    runner::decode_arguments,
};
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    generation::{
        chat::{request::ChatMessageRequest, ChatMessage, ChatMessageResponse},
        tools::{ToolCall, ToolCallFunction, ToolFunctionInfo, ToolInfo, ToolType},
    },
    models::ModelOptions,
    Ollama,
};
use reqwest::{StatusCode, Url};
use serde_json::Value;

/// Lower-cased fragments of backend error text that mean "slow down"
const RATE_LIMIT_MARKERS: &[&str] = &["too many requests", "rate limit", "server busy"];

/// Lower-cased fragments of transport error text that mean "nobody answered"
const UNREACHABLE_MARKERS: &[&str] = &["error sending request", "connection refused", "tcp connect"];

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Request timeout in seconds (a stream is bounded until its first byte)
    pub timeout_secs: u64,

    /// Extra attempts after a connection failure or rate limit
    pub max_retries: u32,

    /// Base delay between attempts; attempt `n` waits `n` times this
    pub retry_backoff_ms: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            timeout_secs: 120,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values keep defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        let defaults = Self::default();
        Self {
            host: lookup("OLLAMA_HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "OLLAMA_PORT").unwrap_or(defaults.port),
            timeout_secs: parsed(&lookup, "OLLAMA_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            max_retries: parsed(&lookup, "OLLAMA_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_backoff_ms: defaults.retry_backoff_ms,
        }
    }

    /// `scheme://host:port`; a host that already names a port keeps it
    pub fn base_url(&self) -> String {
        let host = self.host.trim().trim_end_matches('/');
        let host = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
        let authority = host.split_once("://").map_or(host.as_str(), |(_, rest)| rest);
        if authority.contains(':') {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }

    /// Host URL without port, and the port, as `Ollama` takes them
    fn endpoint(&self) -> Result<(String, u16)> {
        let url = Url::parse(&self.base_url())
            .map_err(|e| AgentError::Config(format!("Ollama host '{}': {e}", self.host)))?;
        let host = url
            .host_str()
            .ok_or_else(|| AgentError::Config(format!("Ollama host '{}' names no host", self.host)))?;
        let port = url.port_or_known_default().unwrap_or(self.port);
        Ok((format!("{}://{host}", url.scheme()), port))
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
            ..Default::default()
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Result<Self> {
        let (host, port) = config.endpoint()?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client: Ollama::new_with_client(host, port, http),
            config,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OllamaConfig::from_env())
    }

    /// Create with default localhost settings
    pub fn localhost() -> Result<Self> {
        Self::from_config(OllamaConfig::default())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Convert agent messages to Ollama format
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let mut message = match m.role {
                    Role::System => ChatMessage::system(m.content.clone()),
                    Role::User => ChatMessage::user(m.content.clone()),
                    Role::Assistant => ChatMessage::assistant(m.content.clone()),
                    Role::Tool => ChatMessage::tool(m.content.clone()),
                };
                message.tool_calls = m
                    .tool_calls
                    .iter()
                    .map(|call| ToolCall {
                        function: ToolCallFunction {
                            name: call.name.clone(),
                            arguments: Value::Object(decode_arguments(&call.arguments)),
                        },
                    })
                    .collect();
                message
            })
            .collect()
    }

    /// Capability schemas as Ollama tool definitions; a schema the client
    /// cannot represent is left out with a warning
    fn convert_tools(tools: &[ToolSchema]) -> Vec<ToolInfo> {
        tools
            .iter()
            .filter_map(|tool| match serde_json::from_value(tool.parameters.clone()) {
                Ok(parameters) => Some(ToolInfo {
                    tool_type: ToolType::Function,
                    function: ToolFunctionInfo {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters,
                    },
                }),
                Err(e) => {
                    tracing::warn!(tool = %tool.name, error = %e, "Skipping tool with unusable schema");
                    None
                }
            })
            .collect()
    }

    /// Build Ollama model options
    fn build_options(opts: &GenerationOptions) -> ModelOptions {
        let options = ModelOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX));
        if opts.stop_sequences.is_empty() {
            options
        } else {
            options.stop(opts.stop_sequences.clone())
        }
    }

    fn build_request(
        model: &str,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> ChatMessageRequest {
        let request = ChatMessageRequest::new(model.to_string(), Self::convert_messages(messages))
            .options(Self::build_options(options));
        let tools = Self::convert_tools(tools);
        if tools.is_empty() {
            request
        } else {
            request.tools(tools)
        }
    }

    /// Convert an Ollama reply to a chat response
    fn convert_reply(reply: ChatMessageResponse, model: &str) -> ChatResponse {
        let usage = usage_of(&reply);
        let duration_ms = reply.final_data.as_ref().map(|d| d.total_duration / 1_000_000);
        let tool_calls: Vec<ToolInvocation> = reply
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                let arguments = match call.function.arguments {
                    Value::String(raw) => raw,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                ToolInvocation::new(format!("call_{}", uuid::Uuid::new_v4().simple()), call.function.name, arguments)
            })
            .collect();

        let finish_reason = if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolUse
        };

        ChatResponse {
            content: reply.message.content,
            tool_calls,
            model: if reply.model.is_empty() { model.to_string() } else { reply.model },
            usage,
            duration_ms,
            finish_reason: Some(finish_reason),
        }
    }

    /// Run one client call under the request timeout, retrying connection
    /// failures and rate limits with linear backoff
    async fn send<T, E, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        E: std::error::Error + Send + 'static,
    {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(self.timeout(), call()).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(classify(&e)),
                Err(_) => Err(AgentError::BackendUnavailable(format!(
                    "Ollama {operation} timed out after {}s",
                    self.config.timeout_secs
                ))),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry_backoff_ms.saturating_mul(u64::from(attempt));
                    tracing::warn!(operation, attempt, delay_ms = delay, error = %e, "Retrying Ollama request");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                other => return other,
            }
        }
    }
}

fn usage_of(reply: &ChatMessageResponse) -> Option<TokenUsage> {
    reply.final_data.as_ref().map(|d| {
        TokenUsage::new(
            u32::try_from(d.prompt_eval_count).unwrap_or(u32::MAX),
            u32::try_from(d.eval_count).unwrap_or(u32::MAX),
        )
    })
}

/// Map a client failure onto the agent error taxonomy
fn classify(error: &(dyn std::error::Error + 'static)) -> AgentError {
    let message = error.to_string();

    let mut source = Some(error);
    while let Some(e) = source {
        if let Some(http) = e.downcast_ref::<reqwest::Error>() {
            if http.is_connect() || http.is_timeout() {
                return AgentError::BackendUnavailable(message);
            }
            // Ollama answers 503 when its request queue is full
            if matches!(http.status(), Some(StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE)) {
                return AgentError::RateLimited(message);
            }
        }
        source = e.source();
    }

    let lower = message.to_ascii_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        AgentError::RateLimited(message)
    } else if UNREACHABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        AgentError::BackendUnavailable(message)
    } else {
        AgentError::Provider(message)
    }
}

fn convert_chunk(chunk: &ChatMessageResponse) -> StreamChunk {
    StreamChunk {
        delta: chunk.message.content.clone(),
        done: chunk.done,
        usage: if chunk.done { usage_of(chunk) } else { None },
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn health_check(&self) -> Result<bool> {
        match tokio::time::timeout(self.timeout(), self.client.list_local_models()).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
            Err(_) => {
                tracing::warn!("Ollama health check timed out");
                Ok(false)
            }
        }
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<ChatResponse> {
        tracing::debug!(model, messages = messages.len(), tools = tools.len(), "Ollama chat");
        let reply = self
            .send("chat", || {
                self.client
                    .send_chat_messages(Self::build_request(model, messages, tools, options))
            })
            .await?;

        Ok(Self::convert_reply(reply, model))
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChatStream> {
        tracing::debug!(model, messages = messages.len(), "Ollama chat stream");
        let stream = self
            .send("chat stream", || {
                self.client
                    .send_chat_messages_stream(Self::build_request(model, messages, &[], options))
            })
            .await?;

        // A chunk the client could not decode surfaces as an error item;
        // consumers skip it and keep reading
        let mapped = stream.map(|item| match item {
            Ok(chunk) => Ok(convert_chunk(&chunk)),
            Err(_) => Err(AgentError::Provider("Malformed stream chunk from Ollama".into())),
        });

        Ok(Box::pin(mapped))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let models = self.send("model listing", || self.client.list_local_models()).await?;

        Ok(models.into_iter().map(|m| ModelInfo::new(m.name)).collect())
    }
}

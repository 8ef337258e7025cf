//! Mock Inference Client
//!
//! Scripted backend for testing and demos. Single-shot replies are served
//! from a queue; streaming replies come from a responder closure and are
//! split into word-sized chunks.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ChatResponse, ChatStream, GenerationOptions, LlmProvider, ModelInfo, StreamChunk, TokenUsage,
};
use crate::capability::ToolSchema;
use crate::error::{AgentError, Result};
use crate::message::Message;

type Responder = Arc<dyn Fn(&str, &[Message]) -> Result<String> + Send + Sync>;

/// Mock provider with scripted responses
pub struct MockProvider {
    models: Vec<String>,
    listing_error: Option<String>,
    replies: Mutex<VecDeque<Result<ChatResponse>>>,
    fallback_reply: Option<String>,
    responder: Option<Responder>,
    noisy_streams: bool,
    latency: Option<Duration>,
    model_latency: HashMap<String, Duration>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            models: vec!["mock-model".into()],
            listing_error: None,
            replies: Mutex::new(VecDeque::new()),
            fallback_reply: None,
            responder: None,
            noisy_streams: false,
            latency: None,
            model_latency: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replace the advertised model list
    #[must_use]
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    /// Make `list_models` (and `health_check`) fail as an unreachable backend
    #[must_use]
    pub fn unreachable(mut self, reason: impl Into<String>) -> Self {
        self.listing_error = Some(reason.into());
        self
    }

    /// Queue a single-shot reply
    #[must_use]
    pub fn reply(self, response: ChatResponse) -> Self {
        lock(&self.replies).push_back(Ok(response));
        self
    }

    /// Queue a single-shot failure
    #[must_use]
    pub fn fail(self, error: AgentError) -> Self {
        lock(&self.replies).push_back(Err(error));
        self
    }

    /// Reply served once the queue is drained
    #[must_use]
    pub fn repeat(mut self, response: impl Into<String>) -> Self {
        self.fallback_reply = Some(response.into());
        self
    }

    /// Closure producing the full text of a streamed reply
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, &[Message]) -> Result<String> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Interleave failed chunks into every stream
    #[must_use]
    pub fn with_noisy_streams(mut self) -> Self {
        self.noisy_streams = true;
        self
    }

    /// Delay every chat call, as a slow backend would
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay calls to one model only; overrides [`MockProvider::with_latency`]
    #[must_use]
    pub fn with_model_latency(mut self, model: impl Into<String>, latency: Duration) -> Self {
        self.model_latency.insert(model.into(), latency);
        self
    }

    /// Message histories received so far, one entry per call
    pub fn requests(&self) -> Vec<Vec<Message>> {
        lock(&self.requests).clone()
    }

    async fn record(&self, model: &str, messages: &[Message]) {
        lock(&self.requests).push(messages.to_vec());
        if let Some(&latency) = self.model_latency.get(model).or(self.latency.as_ref()) {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "MockProvider"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.listing_error.is_none())
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        _tools: &[ToolSchema],
        _options: &GenerationOptions,
    ) -> Result<ChatResponse> {
        self.record(model, messages).await;

        let next = lock(&self.replies).pop_front();
        let mut response = match next {
            Some(result) => result?,
            None => match (&self.fallback_reply, &self.responder) {
                (Some(text), _) => ChatResponse::text(text.clone()),
                (None, Some(responder)) => ChatResponse::text(responder(model, messages)?),
                (None, None) => {
                    return Err(AgentError::BackendUnavailable("mock script exhausted".into()));
                }
            },
        };
        if response.model.is_empty() {
            response.model = model.to_string();
        }
        Ok(response)
    }

    async fn chat_stream(
        &self,
        model: &str,
        messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<ChatStream> {
        self.record(model, messages).await;

        let text = match (&self.responder, &self.fallback_reply) {
            (Some(responder), _) => responder(model, messages)?,
            (None, Some(text)) => text.clone(),
            (None, None) => {
                return Err(AgentError::BackendUnavailable("mock has no responder".into()));
            }
        };

        let mut chunks: Vec<Result<StreamChunk>> = Vec::new();
        for piece in text.split_inclusive(' ') {
            chunks.push(Ok(StreamChunk {
                delta: piece.to_string(),
                done: false,
                usage: None,
            }));
            if self.noisy_streams {
                chunks.push(Err(AgentError::Provider("malformed chunk".into())));
            }
        }
        let completion_tokens = u32::try_from(chunks.len()).unwrap_or(u32::MAX);
        chunks.push(Ok(StreamChunk {
            delta: String::new(),
            done: true,
            usage: Some(TokenUsage::new(0, completion_tokens)),
        }));

        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        match &self.listing_error {
            Some(reason) => Err(AgentError::BackendUnavailable(reason.clone())),
            None => Ok(self.models.iter().map(ModelInfo::new).collect()),
        }
    }
}

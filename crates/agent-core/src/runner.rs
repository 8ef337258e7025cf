//! Tool-Calling Loop
//!
//! Drives one query to completion: call the model, dispatch any capability
//! invocations through the registry, feed the results back, and stop on a
//! final answer, a backend failure, cancellation or the iteration cap.
//!
//! Capability failures are recoverable: they are recorded as `error` steps
//! and returned to the model as a tool result carrying an error payload.
//! Backend failures are fatal to the run.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::capability::Arguments;
use crate::error::{AgentError, Result};
use crate::hooks::{NoopHooks, RunHooks};
use crate::message::{Conversation, Message, ToolInvocation};
use crate::models::resolve_model;
use crate::provider::{GenerationOptions, LlmProvider};
use crate::registry::CapabilityRegistry;
use crate::trace::{Step, Trace};

/// Runner configuration
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Preferred model
    pub model: String,

    /// Models tried, in order, when the preferred one is unavailable
    pub fallback_models: Vec<String>,

    /// System prompt template
    pub system_prompt: String,

    /// Maximum model-call rounds before giving up
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to the system prompt
    pub inject_tool_descriptions: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            fallback_models: Vec::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            generation: GenerationOptions::default(),
            inject_tool_descriptions: false,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r"You are a helpful AI assistant with access to tools.

Call a tool whenever it helps you answer accurately. Tool names have the form
<provider>_<capability>. If a tool returns an error, read it, correct your
arguments or choose another tool.

After receiving tool results, synthesize them into a helpful response.
If you can answer directly without tools, do so.
Be concise and accurate.";

/// Decode a model-produced argument payload.
///
/// Malformed payloads degrade to an empty argument set; a JSON string that
/// itself holds an object (double-encoded arguments) is unwrapped.
pub fn decode_arguments(raw: &str) -> Arguments {
    let raw = raw.trim();
    if raw.is_empty() {
        return Arguments::new();
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(Value::Object(map)) => map,
            _ => Arguments::new(),
        },
        Ok(other) => {
            tracing::warn!(payload = %other, "Tool arguments are not an object, using {{}}");
            Arguments::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Malformed tool arguments, using {{}}");
            Arguments::new()
        }
    }
}

/// Owns the trace under construction and mirrors every step to the hooks
struct Recorder<'a> {
    trace: Trace,
    hooks: &'a dyn RunHooks,
}

impl Recorder<'_> {
    fn emit(&mut self, step: Step) {
        if let Some(step) = self.trace.append(step) {
            self.hooks.on_step_added(step);
        }
    }

    fn add_tokens(&mut self, tokens: u32) {
        if tokens > 0 {
            let total = self.trace.add_tokens(tokens);
            self.hooks.on_tokens_used(total);
        }
    }

    fn succeed(mut self) -> Trace {
        self.trace.seal(true);
        tracing::info!(trace_id = %self.trace.id(), tokens = self.trace.total_tokens(), "Run completed");
        self.hooks.on_complete(&self.trace);
        self.trace
    }

    fn fail(mut self, error: &AgentError) -> Trace {
        tracing::warn!(trace_id = %self.trace.id(), error = %error, "Run failed");
        self.emit(Step::error(error.user_message()));
        self.hooks.on_error(error);
        self.trace.seal(false);
        self.hooks.on_complete(&self.trace);
        self.trace
    }
}

/// The tool-calling runner
pub struct Runner {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<CapabilityRegistry>,
    config: RunnerConfig,
}

impl Runner {
    /// Create a new runner
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        registry: Arc<CapabilityRegistry>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, registry: Arc<CapabilityRegistry>) -> Self {
        Self::new(provider, registry, RunnerConfig::default())
    }

    /// Build the full system prompt including tool descriptions
    fn build_system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if self.config.inject_tool_descriptions && !self.registry.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.registry.generate_prompt_section());
        }

        prompt
    }

    /// Pick the model for this run from what the backend reports
    async fn resolve_model(&self) -> Result<String> {
        let available = match self.provider.list_models().await {
            Ok(models) => models.into_iter().map(|m| m.id).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(error = %e, model = %self.config.model, "Model listing failed, using preferred model");
                return Ok(self.config.model.clone());
            }
        };

        resolve_model(&self.config.model, &self.config.fallback_models, &available).ok_or_else(|| {
            AgentError::Config(format!(
                "No available model (tried {} and {} fallback(s))",
                self.config.model,
                self.config.fallback_models.len()
            ))
        })
    }

    /// Run one query to a sealed trace
    pub async fn run(&self, query: &str, hooks: &dyn RunHooks, cancel: &CancellationToken) -> Trace {
        let mut recorder = Recorder {
            trace: Trace::new(query, &self.config.model),
            hooks,
        };
        recorder.emit(Step::user(query));

        let model = match self.resolve_model().await {
            Ok(model) => model,
            Err(e) => return recorder.fail(&e),
        };
        recorder.trace.set_model(&model);
        tracing::info!(trace_id = %recorder.trace.id(), model = %model, "Run started");

        let mut conversation = Conversation::with_system_prompt(self.build_system_prompt());
        conversation.push(Message::user(query));
        let tools = self.registry.list_capabilities();

        for iteration in 1..=self.config.max_iterations {
            if cancel.is_cancelled() {
                return recorder.fail(&AgentError::Cancelled);
            }

            recorder.emit(Step::planning(format!("Iteration {iteration}: consulting {model}")));
            tracing::debug!(trace_id = %recorder.trace.id(), iteration, "Calling model");

            conversation.truncate_to_fit();
            let started = Instant::now();
            let response = match self
                .provider
                .chat(&model, conversation.messages(), &tools, &self.config.generation)
                .await
            {
                Ok(response) => response,
                Err(e) => return recorder.fail(&e),
            };

            // An in-flight call is allowed to finish; its result is discarded.
            if cancel.is_cancelled() {
                return recorder.fail(&AgentError::Cancelled);
            }

            let call_tokens = response.total_tokens();
            recorder.add_tokens(call_tokens);

            if response.has_tool_calls() {
                for invocation in response.tool_calls {
                    if cancel.is_cancelled() {
                        return recorder.fail(&AgentError::Cancelled);
                    }
                    self.dispatch(&mut recorder, &mut conversation, invocation).await;
                }
                continue;
            }

            let duration_ms = response
                .duration_ms
                .unwrap_or_else(|| u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
            recorder.emit(
                Step::response(response.content)
                    .with_tokens(call_tokens)
                    .with_duration(duration_ms),
            );
            return recorder.succeed();
        }

        recorder.fail(&AgentError::MaxIterations(self.config.max_iterations))
    }

    /// Execute one invocation and feed its outcome back into the history
    async fn dispatch(&self, recorder: &mut Recorder<'_>, conversation: &mut Conversation, invocation: ToolInvocation) {
        let args = decode_arguments(&invocation.arguments);
        recorder.emit(Step::tool_call(&invocation.name, Value::Object(args.clone())));

        let started = Instant::now();
        let outcome = self.registry.execute(&invocation.name, &args).await;
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let call_id = invocation.id.clone();
        let name = invocation.name.clone();
        conversation.push(Message::assistant_invocation(invocation));

        match outcome {
            Ok(result) => {
                tracing::debug!(tool = %name, elapsed_ms = elapsed, "Tool succeeded");
                let rendered = match &result {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                recorder.emit(Step::tool_result(&name, result).with_duration(elapsed));
                conversation.push(Message::tool(rendered, call_id));
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool failed, reporting to model");
                let payload = e.to_payload();
                recorder.emit(
                    Step::error(e.to_string())
                        .with_tool(&name)
                        .with_result(payload.clone())
                        .with_duration(elapsed),
                );
                conversation.push(Message::tool(payload.to_string(), call_id));
            }
        }
    }

    /// Run with no observers and no cancellation, returning the final answer
    pub async fn ask(&self, query: &str) -> Result<String> {
        let trace = self.run(query, &NoopHooks, &CancellationToken::new()).await;
        match trace.final_response() {
            Some(answer) if trace.success() => Ok(answer.to_string()),
            _ => Err(AgentError::Other(
                trace
                    .steps()
                    .last()
                    .map_or_else(|| "run produced no steps".into(), |s| s.content.clone()),
            )),
        }
    }

    /// Get the capability registry
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Get configuration
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }
}

/// Builder for Runner configuration
pub struct RunnerBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    registry: CapabilityRegistry,
    config: RunnerConfig,
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            registry: CapabilityRegistry::new(),
            config: RunnerConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    #[must_use]
    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.config.fallback_models.push(model.into());
        self
    }

    #[must_use]
    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    #[must_use]
    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    #[must_use]
    pub fn inject_tool_descriptions(mut self, inject: bool) -> Self {
        self.config.inject_tool_descriptions = inject;
        self
    }

    pub fn build(self) -> Result<Runner> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        if self.config.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }

        Ok(Runner::new(provider, Arc::new(self.registry), self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    #[test]
    fn test_decode_arguments() {
        assert_eq!(decode_arguments(r#"{"query": "vpn"}"#)["query"], "vpn");
        assert!(decode_arguments("{not json").is_empty());
        assert!(decode_arguments("").is_empty());
        assert!(decode_arguments("[1, 2]").is_empty());
        assert_eq!(decode_arguments(r#""{\"id\": \"T-1\"}""#)["id"], "T-1");
    }

    #[test]
    fn test_builder_requires_provider() {
        assert!(matches!(RunnerBuilder::new().build(), Err(AgentError::Config(_))));
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::new());
        assert!(RunnerBuilder::new().provider(provider.clone()).max_iterations(0).build().is_err());
        let runner = RunnerBuilder::new().provider(provider).max_iterations(3).build().unwrap();
        assert_eq!(runner.config().max_iterations, 3);
    }

    #[test]
    fn test_system_prompt_injection() {
        let provider: Arc<dyn LlmProvider> = Arc::new(MockProvider::new());
        let runner = RunnerBuilder::new()
            .provider(provider)
            .system_prompt("Base.")
            .inject_tool_descriptions(true)
            .build()
            .unwrap();
        // Empty registry: nothing to inject
        assert_eq!(runner.build_system_prompt(), "Base.");
    }
}

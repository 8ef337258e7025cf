//! Trace / Step Model
//!
//! A [`Trace`] is the ordered, append-only history of one runner execution.
//! Steps are appended by the runner only; once sealed the trace is read-only
//! and becomes the unit of replay, profiling and evaluation.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of agent activity a step records
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    User,
    Planning,
    ToolCall,
    ToolResult,
    Response,
    Error,
}

impl StepType {
    /// Whether a trace may end on this step type
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Response | Self::Error)
    }
}

/// One timestamped unit of agent activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,

    #[serde(rename = "type")]
    pub step_type: StepType,

    pub timestamp: DateTime<Utc>,

    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Step {
    pub fn new(step_type: StepType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            step_type,
            timestamp: Utc::now(),
            content: content.into(),
            tool_name: None,
            tool_args: None,
            tool_result: None,
            tokens: None,
            duration_ms: None,
        }
    }

    pub fn user(query: impl Into<String>) -> Self {
        Self::new(StepType::User, query)
    }

    pub fn planning(content: impl Into<String>) -> Self {
        Self::new(StepType::Planning, content)
    }

    pub fn tool_call(name: impl Into<String>, args: Value) -> Self {
        let name = name.into();
        let mut step = Self::new(StepType::ToolCall, format!("Calling {name}"));
        step.tool_name = Some(name);
        step.tool_args = Some(args);
        step
    }

    pub fn tool_result(name: impl Into<String>, result: Value) -> Self {
        let name = name.into();
        let mut step = Self::new(StepType::ToolResult, format!("{name} returned"));
        step.tool_name = Some(name);
        step.tool_result = Some(result);
        step
    }

    pub fn response(content: impl Into<String>) -> Self {
        Self::new(StepType::Response, content)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StepType::Error, message)
    }

    #[must_use]
    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.tool_result = Some(result);
        self
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens = Some(tokens);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// The complete history of one runner execution
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    id: String,
    query: String,
    model: String,
    steps: Vec<Step>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    total_tokens: u32,
    success: bool,
}

impl Trace {
    pub(crate) fn new(query: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            model: model.into(),
            steps: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            total_tokens: 0,
            success: false,
        }
    }

    /// Append a step; ignored once sealed
    pub(crate) fn append(&mut self, step: Step) -> Option<&Step> {
        if self.is_sealed() {
            tracing::warn!(trace_id = %self.id, step_type = ?step.step_type, "Dropping step appended to sealed trace");
            return None;
        }
        self.steps.push(step);
        self.steps.last()
    }

    pub(crate) fn set_model(&mut self, model: impl Into<String>) {
        if !self.is_sealed() {
            self.model = model.into();
        }
    }

    pub(crate) fn add_tokens(&mut self, tokens: u32) -> u32 {
        self.total_tokens = self.total_tokens.saturating_add(tokens);
        self.total_tokens
    }

    /// Fix the outcome; the first seal wins
    pub(crate) fn seal(&mut self, success: bool) {
        if self.is_sealed() {
            return;
        }
        self.end_time = Some(Utc::now());
        self.success = success;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn total_tokens(&self) -> u32 {
        self.total_tokens
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn is_sealed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Final answer, when the run succeeded
    pub fn final_response(&self) -> Option<&str> {
        self.steps
            .last()
            .filter(|s| s.step_type == StepType::Response)
            .map(|s| s.content.as_str())
    }

    /// Steps of a given type
    pub fn steps_of(&self, step_type: StepType) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.step_type == step_type)
    }

    /// Prefix of the first `k` steps, for step-through replay
    pub fn replay(&self, k: usize) -> &[Step] {
        &self.steps[..k.min(self.steps.len())]
    }

    /// Wall-clock duration of a sealed trace
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }

    /// Aggregate counts, tokens and durations per step type
    pub fn profile(&self) -> TraceProfile {
        let mut by_type: BTreeMap<StepType, StepStats> = BTreeMap::new();
        for step in &self.steps {
            let stats = by_type.entry(step.step_type).or_default();
            stats.count += 1;
            stats.tokens += u64::from(step.tokens.unwrap_or(0));
            stats.duration_ms += step.duration_ms.unwrap_or(0);
        }

        TraceProfile {
            by_type,
            total_tokens: self.total_tokens,
            wall_clock_ms: self.duration_ms(),
        }
    }

    /// Derived quality scores
    pub fn evaluate(&self) -> TraceEvaluation {
        let tool_calls: Vec<&str> = self
            .steps_of(StepType::ToolCall)
            .filter_map(|s| s.tool_name.as_deref())
            .collect();
        let unique_tools = tool_calls.iter().collect::<HashSet<_>>().len();
        let tool_errors = self
            .steps_of(StepType::Error)
            .filter(|s| s.tool_name.is_some())
            .count();

        let ratio = |num: usize, den: usize| {
            if den == 0 {
                0.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                let r = num as f64 / den as f64;
                r
            }
        };

        TraceEvaluation {
            tool_calls: tool_calls.len(),
            unique_tools,
            tool_diversity: ratio(unique_tools, tool_calls.len()),
            errors: self.steps_of(StepType::Error).count(),
            tool_errors,
            tool_error_rate: ratio(tool_errors, tool_calls.len()),
            iterations: self.steps_of(StepType::Planning).count(),
            success: self.success,
        }
    }
}

/// Per-type aggregate within a profile
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    pub count: usize,
    pub tokens: u64,
    pub duration_ms: u64,
}

/// Profiler view over a trace
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceProfile {
    pub by_type: BTreeMap<StepType, StepStats>,
    pub total_tokens: u32,
    pub wall_clock_ms: Option<i64>,
}

/// Evaluator view over a trace
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraceEvaluation {
    pub tool_calls: usize,
    pub unique_tools: usize,
    /// unique tool names / total tool calls
    pub tool_diversity: f64,
    pub errors: usize,
    pub tool_errors: usize,
    pub tool_error_rate: f64,
    pub iterations: usize,
    pub success: bool,
}

//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Qualified name prefix does not match a registered provider
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Provider exists but does not declare the capability
    #[error("Unknown capability '{capability}' on provider '{provider}'")]
    UnknownCapability { provider: String, capability: String },

    /// Capability arguments missing or malformed
    #[error("Invalid argument '{parameter}': {reason}")]
    InvalidArgument { parameter: String, reason: String },

    /// Resource, prompt or record lookup miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// Inference backend unreachable
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Inference backend answered with an error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Rate limited by the backend
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Maximum iterations reached in the tool-calling loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Caller cancelled the run
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Shorthand for an [`AgentError::InvalidArgument`]
    pub fn invalid_argument(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::RateLimited(_))
    }

    /// Stable machine-readable kind, used in tool error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownProvider(_) => "unknown_provider",
            Self::UnknownCapability { .. } => "unknown_capability",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::Provider(_) => "provider",
            Self::RateLimited(_) => "rate_limited",
            Self::MaxIterations(_) => "iteration_limit_exceeded",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }

    /// Error payload fed back to the model as a tool result
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        })
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownProvider(id) => format!("No capability provider named '{id}' is registered."),
            Self::UnknownCapability { provider, capability } => {
                format!("The provider '{provider}' has no capability named '{capability}'.")
            }
            Self::InvalidArgument { parameter, reason } => {
                format!("Invalid value for '{parameter}': {reason}")
            }
            Self::NotFound(what) => format!("Could not find {what}."),
            Self::BackendUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::RateLimited(_) => "Too many requests to the AI service. Please wait a moment.".into(),
            Self::MaxIterations(_) => "Maximum iterations reached".into(),
            Self::Cancelled => "Run cancelled".into(),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

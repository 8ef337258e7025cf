//! Council roles and their model assignments.

use serde::{Deserialize, Serialize};

use super::prompts;
use crate::models::resolve_model;

/// Fixed council roles
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Maps the artifact and writes the verdict
    Moderator,
    /// Design and structure
    Architect,
    /// Security and correctness hazards
    Sentinel,
    /// Performance
    Optimizer,
    /// Readability and long-term upkeep
    Maintainer,
    /// Challenges the other roles' findings
    Verifier,
}

impl AgentRole {
    pub const ALL: [Self; 6] = [
        Self::Moderator,
        Self::Architect,
        Self::Sentinel,
        Self::Optimizer,
        Self::Maintainer,
        Self::Verifier,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Moderator => "moderator",
            Self::Architect => "architect",
            Self::Sentinel => "sentinel",
            Self::Optimizer => "optimizer",
            Self::Maintainer => "maintainer",
            Self::Verifier => "verifier",
        }
    }

    /// Prefix for finding ids, e.g. `SENTINEL`
    pub fn tag(self) -> String {
        self.as_str().to_uppercase()
    }

    /// Roles that contribute findings in the review phase
    pub fn is_reviewer(self) -> bool {
        !matches!(self, Self::Moderator | Self::Verifier)
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration for one role
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentRoleConfig {
    pub role: AgentRole,
    pub preferred_model: String,
    #[serde(default)]
    pub fallback_models: Vec<String>,
    pub system_prompt: String,
}

impl AgentRoleConfig {
    pub fn new(role: AgentRole, preferred_model: impl Into<String>) -> Self {
        Self {
            role,
            preferred_model: preferred_model.into(),
            fallback_models: Vec::new(),
            system_prompt: prompts::system_prompt(role).to_string(),
        }
    }

    #[must_use]
    pub fn fallback(mut self, model: impl Into<String>) -> Self {
        self.fallback_models.push(model.into());
        self
    }
}

/// The six-role roster with local-model defaults
pub fn default_roster() -> Vec<AgentRoleConfig> {
    AgentRole::ALL
        .iter()
        .map(|&role| {
            let preferred = match role {
                AgentRole::Moderator | AgentRole::Verifier => "llama3.1",
                _ => "qwen2.5-coder",
            };
            AgentRoleConfig::new(role, preferred)
                .fallback("llama3.2")
                .fallback("mistral")
        })
        .collect()
}

/// A role bound to the model that will serve it this session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role: AgentRole,
    pub model: String,
    pub system_prompt: String,
}

/// Bind each role to its first available model; roles with none are dropped
pub fn resolve_roles(configs: &[AgentRoleConfig], available: &[String]) -> Vec<RoleAssignment> {
    configs
        .iter()
        .filter_map(|config| {
            let model = resolve_model(&config.preferred_model, &config.fallback_models, available);
            match model {
                Some(model) => {
                    tracing::debug!(role = %config.role, model = %model, "Role resolved");
                    Some(RoleAssignment {
                        role: config.role,
                        model,
                        system_prompt: config.system_prompt.clone(),
                    })
                }
                None => {
                    tracing::warn!(role = %config.role, "No available model, role disabled");
                    None
                }
            }
        })
        .collect()
}

//! Council orchestrator: resolve, intake, review, debate, verdict.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::finding::extract_findings;
use super::prompts;
use super::roles::{default_roster, resolve_roles, AgentRole, AgentRoleConfig, RoleAssignment};
use super::session::{CouncilSession, CouncilStatus};
use crate::error::{AgentError, Result};
use crate::hooks::CouncilHooks;
use crate::message::Message;
use crate::provider::{GenerationOptions, LlmProvider};

/// Council configuration
#[derive(Clone, Debug)]
pub struct CouncilConfig {
    /// One entry per role; roles not listed take no part
    pub roles: Vec<AgentRoleConfig>,

    pub generation: GenerationOptions,

    /// Reviewer invocations allowed in flight at once
    pub review_concurrency: usize,

    /// Record a role failure and continue instead of aborting the session
    pub isolate_role_failures: bool,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            roles: default_roster(),
            generation: GenerationOptions {
                temperature: 0.2,
                ..GenerationOptions::default()
            },
            review_concurrency: 3,
            isolate_role_failures: true,
        }
    }
}

/// Runs council sessions against one inference backend
pub struct CouncilOrchestrator {
    provider: Arc<dyn LlmProvider>,
    config: CouncilConfig,
}

impl CouncilOrchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: CouncilConfig) -> Self {
        Self { provider, config }
    }

    pub fn with_defaults(provider: Arc<dyn LlmProvider>) -> Self {
        Self::new(provider, CouncilConfig::default())
    }

    pub fn config(&self) -> &CouncilConfig {
        &self.config
    }

    /// Run one session over `artifact`.
    ///
    /// Returns the session in `complete` state, or in `idle` when no role
    /// could be resolved or the run was cancelled. Errors only escape when
    /// role failures are not isolated.
    pub async fn run(
        &self,
        artifact: &str,
        hooks: &dyn CouncilHooks,
        cancel: &CancellationToken,
    ) -> Result<CouncilSession> {
        let driver = Driver {
            provider: self.provider.as_ref(),
            config: &self.config,
            artifact,
            session: Mutex::new(CouncilSession::new(artifact)),
            hooks,
            cancel,
        };

        match driver.drive().await {
            Ok(()) => Ok(driver.into_session()),
            Err(AgentError::Cancelled) => {
                driver.update(|s| s.abort_to_idle("Council session cancelled before completion."));
                Ok(driver.into_session())
            }
            Err(e) => Err(e),
        }
    }
}

/// Per-session state shared by the phase steps
struct Driver<'a> {
    provider: &'a dyn LlmProvider,
    config: &'a CouncilConfig,
    artifact: &'a str,
    session: Mutex<CouncilSession>,
    hooks: &'a dyn CouncilHooks,
    cancel: &'a CancellationToken,
}

impl Driver<'_> {
    /// Mutate the session and publish the result
    fn update<R>(&self, f: impl FnOnce(&mut CouncilSession) -> R) -> R {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut session);
        self.hooks.on_session_update(&session);
        out
    }

    fn read<R>(&self, f: impl FnOnce(&CouncilSession) -> R) -> R {
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&session)
    }

    fn into_session(self) -> CouncilSession {
        self.session.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn drive(&self) -> Result<()> {
        let Some(assignments) = self.resolve().await else {
            return Ok(());
        };
        let assigned = |role: AgentRole| assignments.iter().find(|a| a.role == role);

        // Intake
        self.checkpoint()?;
        self.update(|s| s.advance(CouncilStatus::Intake));
        match assigned(AgentRole::Moderator) {
            Some(moderator) => {
                if let Some(map) = self.invoke(moderator, prompts::intake(self.artifact)).await? {
                    self.update(|s| s.set_code_map(map));
                }
            }
            None => self.update(|s| s.push_system("No moderator available; skipping the code map.")),
        }

        // Review
        self.checkpoint()?;
        self.update(|s| s.advance(CouncilStatus::Reviewing));
        self.review(&assignments).await?;

        // Debate
        self.checkpoint()?;
        self.update(|s| s.advance(CouncilStatus::Debating));
        let notes = match assigned(AgentRole::Verifier) {
            Some(verifier) => {
                let summary = self.read(CouncilSession::findings_summary);
                self.invoke(verifier, prompts::debate(self.artifact, &summary)).await?
            }
            None => {
                self.update(|s| s.push_system("No verifier available; skipping the debate."));
                None
            }
        };

        // Verdict
        self.checkpoint()?;
        self.update(|s| s.advance(CouncilStatus::Complete));
        let verdict = match assigned(AgentRole::Moderator) {
            Some(moderator) => {
                let prompt = self.read(|s| prompts::verdict(s.code_map(), &s.ranked_findings(), notes.as_deref()));
                self.invoke(moderator, prompt).await?
            }
            None => None,
        };
        let verdict = verdict.unwrap_or_else(|| self.read(fallback_verdict));
        self.update(|s| {
            s.set_verdict(verdict);
            s.mark_completed();
        });
        Ok(())
    }

    /// Bind roles to models; `None` means the session was aborted to idle
    async fn resolve(&self) -> Option<Vec<RoleAssignment>> {
        let (available, listing_error) = match self.provider.list_models().await {
            Ok(models) => (models.into_iter().map(|m| m.id).collect::<Vec<_>>(), None),
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), error = %e, "Model listing failed");
                (Vec::new(), Some(e))
            }
        };

        let assignments = resolve_roles(&self.config.roles, &available);
        if assignments.is_empty() {
            let reason = listing_error.map_or_else(
                || "none of the configured models are installed".to_string(),
                |e| e.user_message(),
            );
            self.update(|s| {
                s.abort_to_idle(format!("No council role could be assigned a model: {reason}"));
            });
            return None;
        }

        let disabled: Vec<&str> = self
            .config
            .roles
            .iter()
            .filter(|c| !assignments.iter().any(|a| a.role == c.role))
            .map(|c| c.role.as_str())
            .collect();
        if !disabled.is_empty() {
            let notice = format!("Roles disabled (no available model): {}", disabled.join(", "));
            self.update(|s| s.push_system(notice));
        }

        let snapshot = assignments.clone();
        self.update(|s| s.set_assignments(snapshot));
        Some(assignments)
    }

    /// Fan the reviewer roles out, then merge their findings in role order
    async fn review(&self, assignments: &[RoleAssignment]) -> Result<()> {
        let code_map = self.read(|s| s.code_map().map(str::to_owned));
        let reviewers = assignments.iter().filter(|a| a.role.is_reviewer());

        let outputs: Vec<(AgentRole, Result<Option<String>>)> = stream::iter(reviewers)
            .map(|assignment| {
                let prompt = prompts::review(assignment.role, code_map.as_deref(), self.artifact);
                async move { (assignment.role, self.invoke(assignment, prompt).await) }
            })
            .buffered(self.config.review_concurrency.max(1))
            .collect()
            .await;

        for (role, output) in outputs {
            let Some(text) = output? else { continue };
            let findings = extract_findings(role, &text);
            tracing::info!(role = %role, count = findings.len(), "Findings extracted");
            self.update(|s| s.extend_findings(findings));
        }
        Ok(())
    }

    /// One role invocation. `Ok(None)` is a failure that was recorded and
    /// isolated; cancellation always propagates.
    async fn invoke(&self, assignment: &RoleAssignment, prompt: String) -> Result<Option<String>> {
        match self.stream_role(assignment, prompt).await {
            Ok(text) => Ok(Some(text)),
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!(role = %assignment.role, model = %assignment.model, error = %e, "Role invocation failed");
                let notice = format!("The {} failed: {}", assignment.role, e.user_message());
                self.update(|s| s.push_error(Some(assignment.role), notice));
                if self.config.isolate_role_failures {
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Stream a role's reply into a single message that grows in place
    async fn stream_role(&self, assignment: &RoleAssignment, prompt: String) -> Result<String> {
        self.checkpoint()?;

        let messages = [Message::system(assignment.system_prompt.clone()), Message::user(prompt)];
        let mut stream = self
            .provider
            .chat_stream(&assignment.model, &messages, &self.config.generation)
            .await?;

        let message_id = self.update(|s| s.open_agent_message(assignment));
        let mut content = String::new();
        let mut skipped = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                self.update(|s| s.update_message(&message_id, &content, false));
                return Err(AgentError::Cancelled);
            }
            let Some(chunk) = stream.next().await else { break };
            match chunk {
                Ok(chunk) => {
                    if !chunk.delta.is_empty() {
                        content.push_str(&chunk.delta);
                        self.update(|s| s.update_message(&message_id, &content, true));
                    }
                    if chunk.done {
                        break;
                    }
                }
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(role = %assignment.role, error = %e, "Skipping bad stream chunk");
                }
            }
        }

        if skipped > 0 {
            tracing::warn!(role = %assignment.role, skipped, "Skipped malformed stream chunks");
        }
        self.update(|s| s.update_message(&message_id, &content, false));
        Ok(content)
    }
}

/// Verdict assembled locally when no moderator output is available
fn fallback_verdict(session: &CouncilSession) -> String {
    let ranked = session.ranked_findings();
    if ranked.is_empty() {
        return "No moderator verdict was produced and no findings were reported.".into();
    }
    let mut out = String::from("No moderator verdict was produced. Findings, most severe first:\n");
    for f in ranked {
        let _ = writeln!(out, "- [{}] {} ({})", f.id, f.claim, f.severity);
    }
    out
}

//! Council session state.
//!
//! Findings and messages are append-only; a message may only grow in place
//! while its role invocation streams. Status moves forward through the
//! phases, except for an abort back to `Idle`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::Finding;
use super::roles::{AgentRole, RoleAssignment};

/// Phase the session is in
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouncilStatus {
    Idle,
    Intake,
    Reviewing,
    Debating,
    Complete,
}

/// Who or what produced a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Orchestrator notices
    System,
    /// Role output
    Agent,
    /// A failure, rendered for the user
    Error,
}

/// One message in the council transcript
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilMessage {
    pub id: String,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<AgentRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub phase: CouncilStatus,
    pub content: String,
    /// Still receiving tokens
    pub streaming: bool,
    pub timestamp: DateTime<Utc>,
}

impl CouncilMessage {
    fn new(kind: MessageKind, phase: CouncilStatus, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            role: None,
            model: None,
            phase,
            content: content.into(),
            streaming: false,
            timestamp: Utc::now(),
        }
    }
}

/// One council run over one input artifact
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilSession {
    id: String,
    input_artifact: String,
    code_map: Option<String>,
    findings: Vec<Finding>,
    messages: Vec<CouncilMessage>,
    status: CouncilStatus,
    assignments: Vec<RoleAssignment>,
    verdict: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl CouncilSession {
    pub(crate) fn new(input_artifact: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input_artifact: input_artifact.into(),
            code_map: None,
            findings: Vec::new(),
            messages: Vec::new(),
            status: CouncilStatus::Idle,
            assignments: Vec::new(),
            verdict: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input_artifact(&self) -> &str {
        &self.input_artifact
    }

    pub fn code_map(&self) -> Option<&str> {
        self.code_map.as_deref()
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn messages(&self) -> &[CouncilMessage] {
        &self.messages
    }

    pub fn status(&self) -> CouncilStatus {
        self.status
    }

    /// Roles that resolved to a model this session
    pub fn assignments(&self) -> &[RoleAssignment] {
        &self.assignments
    }

    pub fn verdict(&self) -> Option<&str> {
        self.verdict.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Findings by severity (P0 first), then confidence descending
    pub fn ranked_findings(&self) -> Vec<&Finding> {
        let mut ranked: Vec<&Finding> = self.findings.iter().collect();
        ranked.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
        });
        ranked
    }

    /// One `[id] claim (severity)` line per finding
    pub fn findings_summary(&self) -> String {
        self.findings
            .iter()
            .map(|f| format!("[{}] {} ({})", f.id, f.claim, f.severity))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn set_assignments(&mut self, assignments: Vec<RoleAssignment>) {
        self.assignments = assignments;
    }

    /// Move forward to `next`; backward moves are ignored
    pub(crate) fn advance(&mut self, next: CouncilStatus) {
        if next <= self.status {
            tracing::warn!(from = ?self.status, to = ?next, "Ignoring backward status transition");
            return;
        }
        tracing::info!(session = %self.id, phase = ?next, "Council phase");
        self.status = next;
    }

    /// Record the end of the verdict phase
    pub(crate) fn mark_completed(&mut self) {
        if self.status == CouncilStatus::Complete && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }

    /// Abandon the remaining phases
    pub(crate) fn abort_to_idle(&mut self, reason: impl Into<String>) {
        self.status = CouncilStatus::Idle;
        self.push_system(reason);
    }

    pub(crate) fn set_code_map(&mut self, code_map: String) {
        self.code_map = Some(code_map);
    }

    pub(crate) fn set_verdict(&mut self, verdict: String) {
        self.verdict = Some(verdict);
    }

    pub(crate) fn extend_findings(&mut self, findings: Vec<Finding>) {
        self.findings.extend(findings);
    }

    pub(crate) fn push_system(&mut self, content: impl Into<String>) {
        self.messages
            .push(CouncilMessage::new(MessageKind::System, self.status, content));
    }

    pub(crate) fn push_error(&mut self, role: Option<AgentRole>, content: impl Into<String>) {
        let mut message = CouncilMessage::new(MessageKind::Error, self.status, content);
        message.role = role;
        self.messages.push(message);
    }

    /// Open an empty, streaming message for a role invocation; returns its id
    pub(crate) fn open_agent_message(&mut self, assignment: &RoleAssignment) -> String {
        let mut message = CouncilMessage::new(MessageKind::Agent, self.status, "");
        message.role = Some(assignment.role);
        message.model = Some(assignment.model.clone());
        message.streaming = true;
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Replace a message's content in place
    pub(crate) fn update_message(&mut self, id: &str, content: &str, streaming: bool) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.content.clear();
            message.content.push_str(content);
            message.streaming = streaming;
        }
    }
}

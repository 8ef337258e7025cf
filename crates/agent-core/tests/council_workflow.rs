//! Council sessions against a scripted backend

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_core::{
    AgentError, AgentRole, AgentRoleConfig, CouncilConfig, CouncilHooks, CouncilOrchestrator, CouncilSession,
    CouncilStatus, Message, MessageKind, MockProvider, NoopHooks, Result, Severity,
};
use tokio_util::sync::CancellationToken;

fn model_for(role: AgentRole) -> String {
    format!("{role}-model")
}

fn roster(roles: &[AgentRole]) -> Vec<AgentRoleConfig> {
    roles.iter().map(|&role| AgentRoleConfig::new(role, model_for(role))).collect()
}

fn config(roles: &[AgentRole]) -> CouncilConfig {
    CouncilConfig {
        roles: roster(roles),
        ..CouncilConfig::default()
    }
}

fn all_models() -> Vec<String> {
    AgentRole::ALL.iter().map(|&r| model_for(r)).collect()
}

/// Scripted council: one canned reply per reviewer; the verifier confirms
/// every `[id]` line it is shown
fn respond(model: &str, messages: &[Message]) -> Result<String> {
    let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
    let reply = match model {
        "moderator-model" if prompt.contains("final verdict") => "Ship after fixing OPTIMIZER-001.",
        "moderator-model" => "One module: main() prints output.",
        "architect-model" => r#"noise [ {"claim":"X","severity":"P1"} ] trailing"#,
        "sentinel-model" => "No issues found.",
        "optimizer-model" => {
            r#"Findings: [{"id":"bogus","agentRole":"sentinel","claim":"Quadratic loop","severity":"P0","confidence":"90%"}]"#
        }
        "maintainer-model" => "[]",
        "verifier-model" => {
            let verdicts: Vec<String> = prompt
                .lines()
                .filter_map(|line| line.strip_prefix('[')?.split_once(']'))
                .map(|(id, _)| format!("{id} CONFIRMED."))
                .collect();
            return Ok(verdicts.join(" "));
        }
        other => return Err(AgentError::Provider(format!("unexpected model {other}"))),
    };
    Ok(reply.to_string())
}

fn provider() -> MockProvider {
    MockProvider::new().with_models(all_models()).with_responder(respond)
}

#[derive(Default)]
struct Snapshots {
    sessions: Mutex<Vec<CouncilSession>>,
}

impl CouncilHooks for Snapshots {
    fn on_session_update(&self, session: &CouncilSession) {
        self.sessions.lock().unwrap().push(session.clone());
    }
}

#[tokio::test]
async fn test_full_session() {
    let orchestrator = CouncilOrchestrator::new(Arc::new(provider()), config(&AgentRole::ALL));

    let session = orchestrator
        .run("fn main() { println!(\"hi\"); }", &NoopHooks, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(session.status(), CouncilStatus::Complete);
    assert!(session.completed_at().is_some());
    assert_eq!(session.code_map(), Some("One module: main() prints output."));
    assert_eq!(session.assignments().len(), 6);

    let ids: Vec<&str> = session.findings().iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, ["ARCHITECT-001", "OPTIMIZER-001"]);

    let optimizer = &session.findings()[1];
    assert_eq!(optimizer.agent_role, AgentRole::Optimizer);
    assert_eq!(optimizer.severity, Severity::P0);
    assert!((optimizer.confidence - 0.9).abs() < 1e-6);

    let ranked: Vec<&str> = session.ranked_findings().iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ranked, ["OPTIMIZER-001", "ARCHITECT-001"]);

    assert_eq!(session.verdict(), Some("Ship after fixing OPTIMIZER-001."));
    assert!(session.messages().iter().all(|m| !m.streaming));
    assert!(session.messages().iter().all(|m| m.kind != MessageKind::Error));
    assert_eq!(
        session.messages().iter().filter(|m| m.kind == MessageKind::Agent).count(),
        7
    );
}

/// The user prompt of the first request whose prompt contains `marker`
fn prompt_containing(provider: &MockProvider, marker: &str) -> String {
    provider
        .requests()
        .into_iter()
        .filter_map(|messages| messages.last().map(|m| m.content.clone()))
        .find(|prompt| prompt.contains(marker))
        .unwrap_or_else(|| panic!("no request containing {marker:?}"))
}

#[tokio::test]
async fn test_debate_and_verdict_prompts() {
    let artifact = "fn main() { for a in xs { for b in xs { touch(a, b); } } }";
    let provider = Arc::new(provider());
    let orchestrator = CouncilOrchestrator::new(provider.clone(), config(&AgentRole::ALL));

    let session = orchestrator.run(artifact, &NoopHooks, &CancellationToken::new()).await.unwrap();
    assert_eq!(session.status(), CouncilStatus::Complete);

    // Verifier sees the whole artifact and one line per finding
    let debate = prompt_containing(&provider, "Verify each one");
    assert!(debate.contains(artifact));
    let listed: Vec<&str> = debate.lines().filter(|l| l.starts_with('[')).collect();
    assert_eq!(listed, ["[ARCHITECT-001] X (P1)", "[OPTIMIZER-001] Quadratic loop (P0)"]);

    // Moderator sees the ranking, most severe first, and the verifier's notes
    let verdict = prompt_containing(&provider, "final verdict");
    let optimizer = verdict.find("OPTIMIZER-001").unwrap();
    let architect = verdict.find("ARCHITECT-001").unwrap();
    assert!(optimizer < architect);
    assert!(verdict.contains("Verifier notes:\nARCHITECT-001 CONFIRMED. OPTIMIZER-001 CONFIRMED."));
    assert!(verdict.contains("One module: main() prints output."));
}

#[tokio::test]
async fn test_findings_merge_in_role_order_when_first_reviewer_is_slowest() {
    let provider = MockProvider::new()
        .with_models(all_models())
        .with_responder(respond)
        .with_model_latency(model_for(AgentRole::Architect), Duration::from_millis(150));
    let orchestrator = CouncilOrchestrator::new(Arc::new(provider), config(&AgentRole::ALL));

    let session = orchestrator.run("fn main() {}", &NoopHooks, &CancellationToken::new()).await.unwrap();

    // The architect's reply arrived after the optimizer's
    let position = |role: AgentRole| {
        session
            .messages()
            .iter()
            .position(|m| m.kind == MessageKind::Agent && m.role == Some(role) && m.phase == CouncilStatus::Reviewing)
            .unwrap()
    };
    assert!(position(AgentRole::Optimizer) < position(AgentRole::Architect));

    let ids: Vec<&str> = session.findings().iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, ["ARCHITECT-001", "OPTIMIZER-001"]);
}

#[tokio::test]
async fn test_unreachable_backend_returns_to_idle() {
    let provider = Arc::new(MockProvider::new().unreachable("connection refused").with_responder(respond));
    let orchestrator = CouncilOrchestrator::new(provider.clone(), config(&AgentRole::ALL));

    let session = orchestrator.run("fn main() {}", &NoopHooks, &CancellationToken::new()).await.unwrap();

    assert_eq!(session.status(), CouncilStatus::Idle);
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].kind, MessageKind::System);
    assert!(session.findings().is_empty());
    assert!(session.code_map().is_none());
    assert!(provider.requests().is_empty());
}

#[tokio::test]
async fn test_partial_roster_reports_disabled_roles() {
    let provider = MockProvider::new()
        .with_models([model_for(AgentRole::Moderator), model_for(AgentRole::Architect)])
        .with_responder(respond);
    let orchestrator = CouncilOrchestrator::new(Arc::new(provider), config(&AgentRole::ALL));

    let session = orchestrator.run("fn main() {}", &NoopHooks, &CancellationToken::new()).await.unwrap();

    assert_eq!(session.status(), CouncilStatus::Complete);
    assert_eq!(session.assignments().len(), 2);
    let disabled = &session.messages()[0];
    assert_eq!(disabled.kind, MessageKind::System);
    assert!(disabled.content.contains("sentinel"));
    assert!(session.messages().iter().any(|m| m.content.contains("No verifier")));
    assert_eq!(session.findings().len(), 1);
}

#[tokio::test]
async fn test_role_failure_is_isolated() {
    let provider = MockProvider::new().with_models(all_models()).with_responder(|model, messages| {
        if model == "sentinel-model" {
            Err(AgentError::BackendUnavailable("model crashed".into()))
        } else {
            respond(model, messages)
        }
    });
    let orchestrator = CouncilOrchestrator::new(Arc::new(provider), config(&AgentRole::ALL));

    let session = orchestrator.run("fn main() {}", &NoopHooks, &CancellationToken::new()).await.unwrap();

    assert_eq!(session.status(), CouncilStatus::Complete);
    let errors: Vec<_> = session.messages().iter().filter(|m| m.kind == MessageKind::Error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].role, Some(AgentRole::Sentinel));
    assert_eq!(session.findings().len(), 2);
}

#[tokio::test]
async fn test_role_failure_propagates_when_not_isolated() {
    let provider = MockProvider::new().with_models(all_models()).with_responder(|model, messages| {
        if model == "architect-model" {
            Err(AgentError::Provider("bad request".into()))
        } else {
            respond(model, messages)
        }
    });
    let orchestrator = CouncilOrchestrator::new(
        Arc::new(provider),
        CouncilConfig {
            isolate_role_failures: false,
            ..config(&AgentRole::ALL)
        },
    );

    let result = orchestrator.run("fn main() {}", &NoopHooks, &CancellationToken::new()).await;

    assert!(matches!(result, Err(AgentError::Provider(_))));
}

#[tokio::test]
async fn test_missing_moderator_synthesizes_verdict() {
    let orchestrator = CouncilOrchestrator::new(Arc::new(provider()), config(&[AgentRole::Optimizer]));

    let session = orchestrator.run("fn main() {}", &NoopHooks, &CancellationToken::new()).await.unwrap();

    assert_eq!(session.status(), CouncilStatus::Complete);
    assert!(session.code_map().is_none());
    let verdict = session.verdict().unwrap();
    assert!(verdict.contains("[OPTIMIZER-001] Quadratic loop (P0)"));
}

#[tokio::test]
async fn test_streamed_messages_grow_in_place() {
    let orchestrator = CouncilOrchestrator::new(Arc::new(provider()), config(&AgentRole::ALL));
    let hooks = Snapshots::default();

    let session = orchestrator.run("fn main() {}", &hooks, &CancellationToken::new()).await.unwrap();
    let snapshots = hooks.sessions.lock().unwrap();

    assert!(snapshots.len() > session.messages().len());
    for pair in snapshots.windows(2) {
        let (before, after) = (&pair[0], &pair[1]);
        assert!(before.messages().len() <= after.messages().len());
        assert!(before.status() <= after.status());
        for (old, new) in before.messages().iter().zip(after.messages()) {
            assert_eq!(old.id, new.id);
            assert!(new.content.starts_with(&old.content));
        }
    }

    let verdict_id = &session.messages().last().unwrap().id;
    let partials = snapshots
        .iter()
        .filter_map(|s| s.messages().iter().find(|m| &m.id == verdict_id))
        .filter(|m| m.streaming)
        .count();
    assert!(partials > 1);
}

#[tokio::test]
async fn test_bad_stream_chunks_are_skipped() {
    let clean = CouncilOrchestrator::new(Arc::new(provider()), config(&AgentRole::ALL))
        .run("fn main() {}", &NoopHooks, &CancellationToken::new())
        .await
        .unwrap();
    let noisy = CouncilOrchestrator::new(Arc::new(provider().with_noisy_streams()), config(&AgentRole::ALL))
        .run("fn main() {}", &NoopHooks, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(noisy.status(), CouncilStatus::Complete);
    assert_eq!(noisy.findings(), clean.findings());
    assert_eq!(noisy.verdict(), clean.verdict());
}

/// Cancels once the review phase begins
struct CancelOnReview {
    cancel: CancellationToken,
}

impl CouncilHooks for CancelOnReview {
    fn on_session_update(&self, session: &CouncilSession) {
        if session.status() == CouncilStatus::Reviewing {
            self.cancel.cancel();
        }
    }
}

#[tokio::test]
async fn test_cancellation_returns_to_idle() {
    let provider = Arc::new(provider());
    let orchestrator = CouncilOrchestrator::new(provider.clone(), config(&AgentRole::ALL));
    let cancel = CancellationToken::new();
    let hooks = CancelOnReview { cancel: cancel.clone() };

    let session = orchestrator.run("fn main() {}", &hooks, &cancel).await.unwrap();

    assert_eq!(session.status(), CouncilStatus::Idle);
    assert!(session.findings().is_empty());
    assert!(session.verdict().is_none());
    assert!(session.messages().last().unwrap().content.contains("cancelled"));
    // Only the intake call reached the backend
    assert_eq!(provider.requests().len(), 1);
}

//! Runner driving the synthetic providers through a scripted backend

use std::sync::Arc;

use agent_core::{
    AgentError, Arguments, ChatResponse, MockProvider, NoopHooks, RunnerBuilder, StepType, ToolInvocation,
};
use capability_providers::{default_registry, HELPDESK_PROMPT};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn invoke(name: &str, arguments: &str) -> ChatResponse {
    ChatResponse::invocations(vec![ToolInvocation::new("call-1", name, arguments)])
}

#[tokio::test]
async fn test_open_tickets_question() {
    let provider = Arc::new(
        MockProvider::new()
            .reply(invoke("tickets_searchTickets", r#"{"query": "open", "status": "open"}"#))
            .reply(ChatResponse::text("Two tickets are open: TICKET-0001 and TICKET-0004.")),
    );
    let runner = RunnerBuilder::new()
        .provider(provider.clone())
        .registry(default_registry().unwrap())
        .system_prompt(HELPDESK_PROMPT)
        .model("mock-model")
        .build()
        .unwrap();

    let trace = runner.run("What tickets are open?", &NoopHooks, &CancellationToken::new()).await;

    let kinds: Vec<StepType> = trace.steps().iter().map(|s| s.step_type).collect();
    assert_eq!(
        kinds,
        [
            StepType::User,
            StepType::Planning,
            StepType::ToolCall,
            StepType::ToolResult,
            StepType::Planning,
            StepType::Response,
        ]
    );
    assert!(trace.success());

    let result = trace.steps()[3].tool_result.as_ref().unwrap();
    assert_eq!(result["count"], 2);

    // The tool message carries the serialized search result
    let fed_back = provider.requests()[1].last().cloned().unwrap();
    assert!(fed_back.content.contains("TICKET-0004"));
}

#[tokio::test]
async fn test_malformed_arguments_surface_as_invalid_query() {
    let provider = Arc::new(
        MockProvider::new()
            .reply(invoke("tickets_searchTickets", "{not json"))
            .reply(invoke("tickets_searchTickets", r#"{"query": "vpn"}"#))
            .reply(ChatResponse::text("TICKET-0001 tracks the VPN drops.")),
    );
    let runner = RunnerBuilder::new()
        .provider(provider)
        .registry(default_registry().unwrap())
        .model("mock-model")
        .build()
        .unwrap();

    let trace = runner.run("Is there a VPN ticket?", &NoopHooks, &CancellationToken::new()).await;

    assert!(trace.success());
    let failure = trace.steps_of(StepType::Error).next().unwrap();
    let payload = failure.tool_result.as_ref().unwrap();
    assert_eq!(payload["kind"], "invalid_argument");
    assert!(payload["error"].as_str().unwrap().contains("query"));
    assert_eq!(trace.steps_of(StepType::ToolResult).count(), 1);
}

#[tokio::test]
async fn test_underscored_capability_round_trip() {
    let registry = default_registry().unwrap();
    assert!(registry.capability_names().contains(&"docs_update_page_body".to_string()));

    let args: Arguments = json!({ "id": "PAGE-0003", "body": "Page the on-call lead first." })
        .as_object()
        .cloned()
        .unwrap();
    let page = registry.execute("docs_update_page_body", &args).await.unwrap();
    assert_eq!(page["version"], 2);

    let stored = registry.read_resource("docs", "docs://PAGE-0003").await.unwrap();
    assert_eq!(stored["body"], "Page the on-call lead first.");
}

#[tokio::test]
async fn test_registry_validates_before_dispatch() {
    let registry = default_registry().unwrap();
    let args: Arguments = json!({ "id": "TICKET-0001", "status": "stalled" }).as_object().cloned().unwrap();

    let err = registry.execute("tickets_updateTicket", &args).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidArgument { ref parameter, .. } if parameter == "status"));

    let err = registry.execute("tickets_deleteTicket", &Arguments::new()).await.unwrap_err();
    assert!(matches!(err, AgentError::UnknownCapability { .. }));
}

#[tokio::test]
async fn test_resources_and_prompts_listed() {
    let registry = default_registry().unwrap();

    let uris: Vec<String> = registry.list_resources().into_iter().map(|(_, r)| r.uri).collect();
    assert!(uris.contains(&"tickets://open".to_string()));
    assert!(uris.contains(&"docs://index".to_string()));

    let prompts: Vec<String> = registry.list_prompts().into_iter().map(|(id, p)| format!("{id}:{}", p.name)).collect();
    assert_eq!(prompts, ["tickets:triage", "docs:summarize"]);

    let args: Arguments = json!({ "page_id": "PAGE-0001" }).as_object().cloned().unwrap();
    let rendered = registry.render_prompt("docs", "summarize", &args).await.unwrap();
    assert!(rendered.contains("VPN setup"));
}

//! Role system prompts and phase prompt builders.

use super::finding::Finding;
use super::roles::AgentRole;

const FINDING_FORMAT: &str = r#"Report your findings as a JSON array, one object per finding:
[{"category": "...", "severity": "P0|P1|P2|P3", "confidence": 0.0-1.0,
  "where": "file:line or symbol", "claim": "...", "evidence": "...",
  "impact": "...", "fix": "...", "patchSnippet": "optional", "tradeoff": "optional"}]
P0 is a must-fix defect, P3 a nice-to-have. Return [] when you have nothing to report."#;

pub(super) fn system_prompt(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Moderator => {
            "You are the moderator of a code review council. You summarize code precisely and \
             synthesize the council's findings into a clear, prioritized verdict."
        }
        AgentRole::Architect => {
            "You are the architect on a code review council. Focus on module boundaries, \
             abstractions, coupling, error handling strategy and API design."
        }
        AgentRole::Sentinel => {
            "You are the sentinel on a code review council. Hunt for security issues, unsafe \
             input handling, panics, data races and correctness bugs."
        }
        AgentRole::Optimizer => {
            "You are the optimizer on a code review council. Look for needless allocation, \
             quadratic work, blocking calls in async code and wasted I/O."
        }
        AgentRole::Maintainer => {
            "You are the maintainer on a code review council. Judge readability, naming, \
             test coverage, documentation and how easy the code is to change."
        }
        AgentRole::Verifier => {
            "You are the verifier on a code review council. Challenge each finding against the \
             code: confirm it, downgrade it, or reject it as a false positive, with reasons."
        }
    }
}

pub(super) fn intake(artifact: &str) -> String {
    format!(
        "Produce a short map of the code below: its components, what each is responsible for, \
         entry points and notable dependencies. Keep it under 200 words.\n\n```\n{artifact}\n```"
    )
}

pub(super) fn review(role: AgentRole, code_map: Option<&str>, artifact: &str) -> String {
    let map = code_map.map_or_else(String::new, |m| format!("Code map:\n{m}\n\n"));
    format!(
        "{map}Review the code below from the {role} perspective.\n\n```\n{artifact}\n```\n\n{FINDING_FORMAT}"
    )
}

pub(super) fn debate(artifact: &str, summary: &str) -> String {
    let summary = if summary.is_empty() { "(no findings)" } else { summary };
    format!(
        "The council reported these findings:\n{summary}\n\nVerify each one against the code below. \
         For every finding id, state CONFIRMED, DOWNGRADED or REJECTED with a one-line reason.\n\n```\n{artifact}\n```"
    )
}

pub(super) fn verdict(code_map: Option<&str>, ranked: &[&Finding], debate: Option<&str>) -> String {
    let map = code_map.unwrap_or("(no code map available)");
    let findings = serde_json::to_string_pretty(ranked).unwrap_or_else(|_| "[]".into());
    let debate = debate.map_or_else(String::new, |d| format!("\n\nVerifier notes:\n{d}"));
    format!(
        "Code map:\n{map}\n\nFindings, most severe first:\n{findings}{debate}\n\n\
         Write the final verdict: an overall assessment, then the findings that must be \
         addressed in priority order with their ids, then optional improvements."
    )
}

//! Phased Council Workflow
//!
//! Fans one code artifact out across fixed reviewer roles, extracts
//! structured findings from their free-form output, and synthesizes a
//! ranked verdict.
//!
//! ```text
//! Resolve ─▶ Intake ─▶ Review (fan-out) ─▶ Debate ─▶ Verdict
//!  models     map        findings           verifier   moderator
//! ```

mod finding;
mod orchestrator;
mod prompts;
mod roles;
mod session;

pub use finding::{extract_findings, find_json_array, Finding, Severity};
pub use orchestrator::{CouncilConfig, CouncilOrchestrator};
pub use roles::{default_roster, resolve_roles, AgentRole, AgentRoleConfig, RoleAssignment};
pub use session::{CouncilMessage, CouncilSession, CouncilStatus, MessageKind};

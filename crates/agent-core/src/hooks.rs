//! Observation Hooks
//!
//! Callback interfaces through which a presentation layer observes progress.
//! Every method has a no-op default so observers implement only what they
//! render.

use crate::council::CouncilSession;
use crate::error::AgentError;
use crate::trace::{Step, Trace};

/// Runner progress callbacks, invoked synchronously as steps are emitted
pub trait RunHooks: Send + Sync {
    /// A step was appended to the trace
    fn on_step_added(&self, _step: &Step) {}

    /// Running token total after a model call
    fn on_tokens_used(&self, _total_tokens: u32) {}

    /// The trace was sealed
    fn on_complete(&self, _trace: &Trace) {}

    /// The run ended on an unrecoverable error
    fn on_error(&self, _error: &AgentError) {}
}

/// Council progress callback
pub trait CouncilHooks: Send + Sync {
    /// The session changed: status, a message (new or grown), or findings
    fn on_session_update(&self, _session: &CouncilSession) {}
}

/// Hooks that observe nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl RunHooks for NoopHooks {}

impl CouncilHooks for NoopHooks {}

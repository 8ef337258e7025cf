//! Service Kit - Capability Providers
//!
//! Synthetic providers that implement `agent_core::CapabilityProvider`.

use agent_core::{AgentError, Arguments, CapabilityProvider, Result as CoreResult};

mod docs;
mod tickets;
mod utils;

pub use docs::DocsProvider;
pub use tickets::TicketsProvider;
pub use utils::{evaluate_expression, UtilsProvider};

/// Check `name` is declared and `arguments` fit its schema
fn validated(provider: &dyn CapabilityProvider, name: &str, arguments: &Arguments) -> CoreResult<()> {
    let capability = provider.capability(name).ok_or_else(|| unknown(provider, name))?;
    capability.validate(arguments)
}

fn unknown(provider: &dyn CapabilityProvider, name: &str) -> AgentError {
    AgentError::UnknownCapability {
        provider: provider.id().into(),
        capability: name.into(),
    }
}

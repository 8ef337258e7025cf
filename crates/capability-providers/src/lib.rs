//! # capability-providers
//!
//! Synthetic capability providers for the tool-calling runner: a ticket
//! tracker, a documentation store and a small utility kit.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  CapabilityRegistry                                      │
//! ├──────────────────────────────────────────────────────────┤
//! │  tickets_searchTickets   tickets_getTicket   ...         │
//! │  docs_searchPages        docs_update_page_body   ...     │
//! │  utils_currentTime       utils_calculate                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each provider owns its records; callers only reach them through
//! capabilities, resources and prompts.

mod arena;
pub mod model;
pub mod svckit;

use std::sync::Arc;

use agent_core::{CapabilityRegistry, Result};

pub use model::{Page, Priority, Ticket, TicketStatus};
pub use svckit::{DocsProvider, TicketsProvider, UtilsProvider};

/// Registry holding all three providers, seeded with sample records
pub fn default_registry() -> Result<CapabilityRegistry> {
    CapabilityRegistry::new()
        .with_provider(Arc::new(TicketsProvider::with_samples()))?
        .with_provider(Arc::new(DocsProvider::with_samples()))?
        .with_provider(Arc::new(UtilsProvider::new()))
}

/// System prompt for a runner backed by [`default_registry`]
pub const HELPDESK_PROMPT: &str = r"You are an internal helpdesk assistant with access to tools.

## Tools

- `tickets_*` - search, read, open and update support tickets
- `docs_*` - search and read internal documentation, update page bodies
- `utils_currentTime` / `utils_calculate` - clock and arithmetic

## How to work

1. Look things up before answering; never invent ticket ids or page contents
2. When a tool returns an error, read it and fix your arguments
3. Confirm what you changed after creating or updating a record
4. Keep answers short and cite ticket and page ids";

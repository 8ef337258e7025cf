//! Ticket Tracker Provider
//!
//! Search, read, create and update synthetic support tickets.

use async_trait::async_trait;
use serde_json::{json, Value};

use agent_core::{
    capability::args, AgentError, Arguments, Capability, CapabilityProvider, ParameterSchema, PromptTemplate,
    Resource, Result as CoreResult,
};

use crate::arena::Arena;
use crate::model::{Priority, Ticket, TicketStatus};

const OPEN_URI: &str = "tickets://open";
const URI_PREFIX: &str = "tickets://";

/// Ticket tracker over a private record arena
pub struct TicketsProvider {
    capabilities: Vec<Capability>,
    prompts: Vec<PromptTemplate>,
    tickets: Arena<Ticket>,
}

impl Default for TicketsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketsProvider {
    /// Empty tracker
    pub fn new() -> Self {
        Self::with_arena(Arena::new("TICKET"))
    }

    /// Tracker seeded with a handful of realistic tickets
    pub fn with_samples() -> Self {
        let seeds: [fn(String) -> Ticket; 4] = [
            |id| {
                Ticket::new(
                    id,
                    "VPN disconnects every hour",
                    "Remote staff lose the VPN tunnel roughly every 60 minutes.",
                    Priority::High,
                )
            },
            |id| {
                let mut t = Ticket::new(
                    id,
                    "Printer on floor 3 jams",
                    "Tray 2 jams on duplex jobs.",
                    Priority::Low,
                );
                t.status = TicketStatus::InProgress;
                t.assignee = Some("dana".into());
                t
            },
            |id| {
                let mut t = Ticket::new(
                    id,
                    "Password reset emails delayed",
                    "Reset emails arrive 20 minutes late.",
                    Priority::Medium,
                );
                t.status = TicketStatus::Resolved;
                t
            },
            |id| {
                Ticket::new(
                    id,
                    "Payroll export fails",
                    "The monthly CSV export times out for large departments.",
                    Priority::Critical,
                )
            },
        ];
        Self::with_arena(Arena::seeded("TICKET", seeds))
    }

    fn with_arena(tickets: Arena<Ticket>) -> Self {
        Self {
            capabilities: vec![
                Capability::new(
                    "searchTickets",
                    "Search tickets by text (matches id, title, description, status and assignee).",
                )
                .param(ParameterSchema::string("query", "Text to search for, e.g. 'vpn' or 'open'").required())
                .param(ParameterSchema::string("status", "Only tickets in this status").one_of(&TicketStatus::NAMES)),
                Capability::new("getTicket", "Get one ticket by id.")
                    .param(ParameterSchema::string("id", "Ticket id, e.g. TICKET-0001").required()),
                Capability::new("createTicket", "Open a new ticket.")
                    .param(ParameterSchema::string("title", "Short summary").required())
                    .param(ParameterSchema::string("description", "What is wrong").required())
                    .param(ParameterSchema::string("priority", "Priority (default medium)").one_of(&Priority::NAMES)),
                Capability::new("updateTicket", "Change a ticket's status, priority or assignee.")
                    .param(ParameterSchema::string("id", "Ticket id").required())
                    .param(ParameterSchema::string("status", "New status").one_of(&TicketStatus::NAMES))
                    .param(ParameterSchema::string("priority", "New priority").one_of(&Priority::NAMES))
                    .param(ParameterSchema::string("assignee", "New assignee")),
            ],
            prompts: vec![PromptTemplate::new(
                "triage",
                "Ask for a triage recommendation on one ticket",
                &["ticket_id"],
            )],
            tickets,
        }
    }

    async fn search(&self, arguments: &Arguments) -> CoreResult<Value> {
        let query = args::required_str(arguments, "query")?;
        let status = args::optional_str(arguments, "status")
            .map(|s| parse::<TicketStatus>("status", s))
            .transpose()?;

        let hits = self
            .tickets
            .filter(|t| status.is_none_or(|s| t.status == s) && t.matches(query))
            .await;
        tracing::debug!(query, hits = hits.len(), "Ticket search");

        Ok(json!({ "count": hits.len(), "tickets": hits }))
    }

    async fn get(&self, id: &str) -> CoreResult<Ticket> {
        self.tickets
            .get(id)
            .await
            .ok_or_else(|| AgentError::NotFound(format!("ticket {id}")))
    }

    async fn create(&self, arguments: &Arguments) -> CoreResult<Value> {
        let title = args::required_str(arguments, "title")?.to_string();
        let description = args::required_str(arguments, "description")?.to_string();
        let priority = args::optional_str(arguments, "priority")
            .map(|p| parse::<Priority>("priority", p))
            .transpose()?
            .unwrap_or_default();

        let ticket = self
            .tickets
            .insert_with(|id| Ticket::new(id, title, description, priority))
            .await;
        tracing::info!(ticket = %ticket.id, "Ticket created");

        Ok(serde_json::to_value(ticket)?)
    }

    async fn update(&self, arguments: &Arguments) -> CoreResult<Value> {
        let id = args::required_str(arguments, "id")?;
        let status = args::optional_str(arguments, "status")
            .map(|s| parse::<TicketStatus>("status", s))
            .transpose()?;
        let priority = args::optional_str(arguments, "priority")
            .map(|p| parse::<Priority>("priority", p))
            .transpose()?;
        let assignee = args::optional_str(arguments, "assignee").map(str::to_string);

        if status.is_none() && priority.is_none() && assignee.is_none() {
            return Err(AgentError::invalid_argument(
                "status",
                "provide at least one of status, priority or assignee",
            ));
        }

        let updated = self
            .tickets
            .update(id, |ticket| {
                if let Some(status) = status {
                    ticket.status = status;
                }
                if let Some(priority) = priority {
                    ticket.priority = priority;
                }
                if assignee.is_some() {
                    ticket.assignee = assignee;
                }
                ticket.touch();
                Ok::<(), AgentError>(())
            })
            .await
            .ok_or_else(|| AgentError::NotFound(format!("ticket {id}")))??;
        tracing::info!(ticket = %updated.id, status = %updated.status, "Ticket updated");

        Ok(serde_json::to_value(updated)?)
    }
}

fn parse<T: std::str::FromStr<Err = String>>(parameter: &str, raw: &str) -> CoreResult<T> {
    raw.parse().map_err(|reason| AgentError::invalid_argument(parameter, reason))
}

#[async_trait]
impl CapabilityProvider for TicketsProvider {
    fn id(&self) -> &str {
        "tickets"
    }

    fn name(&self) -> &str {
        "Ticket Tracker"
    }

    fn description(&self) -> &str {
        "Support tickets: search, inspect, open and update"
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::new(OPEN_URI, "Open tickets", "Tickets that are open or in progress"),
            Resource::new("tickets://{id}", "Ticket", "A single ticket by id"),
        ]
    }

    fn prompts(&self) -> &[PromptTemplate] {
        &self.prompts
    }

    async fn execute(&self, name: &str, arguments: &Arguments) -> CoreResult<Value> {
        super::validated(self, name, arguments)?;
        match name {
            "searchTickets" => self.search(arguments).await,
            "getTicket" => {
                let ticket = self.get(args::required_str(arguments, "id")?).await?;
                Ok(serde_json::to_value(ticket)?)
            }
            "createTicket" => self.create(arguments).await,
            "updateTicket" => self.update(arguments).await,
            other => Err(super::unknown(self, other)),
        }
    }

    async fn read_resource(&self, uri: &str) -> CoreResult<Value> {
        if uri == OPEN_URI {
            let open = self.tickets.filter(|t| t.status.is_active()).await;
            return Ok(serde_json::to_value(open)?);
        }
        match uri.strip_prefix(URI_PREFIX) {
            Some(id) if !id.is_empty() => Ok(serde_json::to_value(self.get(id).await?)?),
            _ => Err(AgentError::NotFound(format!("resource {uri}"))),
        }
    }

    async fn render_prompt(&self, name: &str, arguments: &Arguments) -> CoreResult<String> {
        if name != "triage" {
            return Err(AgentError::NotFound(format!("prompt {name}")));
        }
        let ticket = self.get(args::required_str(arguments, "ticket_id")?).await?;
        Ok(format!(
            "Triage ticket {id} ({status}, {priority} priority).\n\
             Title: {title}\nDescription: {description}\n\n\
             Recommend a priority, an owning team and the first diagnostic step.",
            id = ticket.id,
            status = ticket.status,
            priority = ticket.priority,
            title = ticket.title,
            description = ticket.description,
        ))
    }
}

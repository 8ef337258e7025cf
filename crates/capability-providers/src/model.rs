//! Record Types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ticket lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const NAMES: [&'static str; 4] = ["open", "in_progress", "resolved", "closed"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Still needs attention
    pub fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const NAMES: [&'static str; 4] = ["low", "medium", "high", "critical"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A support ticket
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    pub fn new(id: String, title: impl Into<String>, description: impl Into<String>, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            description: description.into(),
            status: TicketStatus::Open,
            priority,
            assignee: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive match on id, title, description, status or assignee
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [
            Some(self.id.as_str()),
            Some(self.title.as_str()),
            Some(self.description.as_str()),
            Some(self.status.as_str()),
            self.assignee.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A documentation page
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub title: String,
    pub body: String,
    /// Bumped on every body update
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn new(id: String, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            body: body.into(),
            version: 1,
            updated_at: Utc::now(),
        }
    }

    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle) || self.body.to_lowercase().contains(&needle)
    }

    /// First `max_chars` characters of the body
    pub fn excerpt(&self, max_chars: usize) -> String {
        let mut excerpt: String = self.body.chars().take(max_chars).collect();
        if self.body.chars().count() > max_chars {
            excerpt.push_str("...");
        }
        excerpt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("in_progress".parse::<TicketStatus>(), Ok(TicketStatus::InProgress));
        assert!("In Progress".parse::<TicketStatus>().is_err());
        assert!("stalled".parse::<TicketStatus>().is_err());
        assert!("High".parse::<Priority>().is_err());

        // Parsing accepts exactly the names the capability schemas advertise
        for name in TicketStatus::NAMES {
            assert_eq!(name.parse::<TicketStatus>().map(TicketStatus::as_str), Ok(name));
        }
        for name in Priority::NAMES {
            assert_eq!(name.parse::<Priority>().map(Priority::as_str), Ok(name));
        }
        assert!(TicketStatus::InProgress.is_active());
        assert!(!TicketStatus::Closed.is_active());
    }

    #[test]
    fn test_ticket_matching() {
        let mut ticket = Ticket::new("TICKET-0001".into(), "VPN drops", "Disconnects hourly", Priority::High);
        assert!(ticket.matches("vpn"));
        assert!(ticket.matches("open"));
        assert!(!ticket.matches("alice"));
        ticket.assignee = Some("Alice".into());
        assert!(ticket.matches("alice"));
    }

    #[test]
    fn test_page_excerpt() {
        let page = Page::new("PAGE-0001".into(), "Onboarding", "Welcome to the team");
        assert_eq!(page.excerpt(7), "Welcome...");
        assert_eq!(page.excerpt(100), "Welcome to the team");
    }
}

//! Conversation Messages
//!
//! Message history exchanged with the inference backend, including
//! assistant capability invocations and the tool results fed back to them.

use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A capability invocation requested by the model.
///
/// `arguments` is kept as the opaque string the backend produced; the
/// runner decodes it defensively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Invocation id assigned by the backend (or synthesized)
    pub id: String,

    /// Qualified capability name
    pub name: String,

    /// Raw argument payload
    pub arguments: String,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Capability invocations (assistant messages only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,

    /// Invocation this message answers (tool messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message that carries a capability invocation
    pub fn assistant_invocation(invocation: ToolInvocation) -> Self {
        let mut msg = Self::new(Role::Assistant, "");
        msg.tool_calls.push(invocation);
        msg
    }

    /// Create a tool result message
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Estimate token count (rough approximation)
    pub fn estimate_tokens(&self) -> u32 {
        let invocation_len: usize = self
            .tool_calls
            .iter()
            .map(|c| c.name.len() + c.arguments.len())
            .sum();
        // ~4 characters per token, +4 for role overhead
        u32::try_from((self.content.len() + invocation_len) / 4).unwrap_or(u32::MAX).saturating_add(4)
    }
}

/// Conversation history with utility methods
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,

    /// Maximum context length (in estimated tokens)
    #[serde(default = "default_max_context")]
    max_context_tokens: u32,
}

const fn default_max_context() -> u32 {
    8192
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            max_context_tokens: default_max_context(),
        }
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.push(Message::system(prompt));
        conv
    }

    /// Override the context budget used by [`Conversation::truncate_to_fit`]
    #[must_use]
    pub fn with_max_context(mut self, max_context_tokens: u32) -> Self {
        self.max_context_tokens = max_context_tokens;
        self
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Estimate total tokens in conversation
    pub fn estimate_tokens(&self) -> u32 {
        self.messages.iter().map(Message::estimate_tokens).sum()
    }

    /// Truncate to fit within token limit, preserving the system prompt,
    /// the first user message and the latest exchange. An assistant
    /// invocation leaves together with the tool messages answering it.
    pub fn truncate_to_fit(&mut self) {
        while self.estimate_tokens() > self.max_context_tokens {
            let Some(range) = self.oldest_removable() else {
                break;
            };
            self.messages.drain(range);
        }
    }

    fn oldest_removable(&self) -> Option<Range<usize>> {
        let first_user = self.messages.iter().position(|m| m.role == Role::User);
        let start = self
            .messages
            .iter()
            .enumerate()
            .position(|(i, m)| m.role != Role::System && Some(i) != first_user)?;

        let calls: Vec<&str> = self.messages[start].tool_calls.iter().map(|c| c.id.as_str()).collect();
        let mut end = start + 1;
        while self.messages.get(end).is_some_and(|m| {
            m.role == Role::Tool && m.tool_call_id.as_deref().is_some_and(|id| calls.contains(&id))
        }) {
            end += 1;
        }

        (end < self.messages.len()).then_some(start..end)
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_conversation() {
        let mut conv = Conversation::with_system_prompt("You are helpful.");
        conv.push(Message::user("Hi"));
        conv.push(Message::assistant_invocation(ToolInvocation::new("c1", "tickets_getTicket", "{}")));
        conv.push(Message::tool("{\"id\":\"TICKET-0001\"}", "c1"));

        assert_eq!(conv.len(), 4);
        assert_eq!(conv.last().unwrap().role, Role::Tool);
        assert_eq!(conv.last().unwrap().tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_truncate_keeps_system_and_query() {
        let mut conv = Conversation::with_system_prompt("sys").with_max_context(40);
        conv.push(Message::user("the query"));
        for i in 0..10 {
            conv.push(Message::tool("x".repeat(40), format!("c{i}")));
        }
        conv.truncate_to_fit();

        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.messages()[1].content, "the query");
        assert!(conv.len() >= 3);
    }

    fn roles(conv: &Conversation) -> Vec<Role> {
        conv.messages().iter().map(|m| m.role.clone()).collect()
    }

    #[test]
    fn test_truncate_keeps_latest_invocation_with_its_result() {
        let mut conv = Conversation::with_system_prompt("sys").with_max_context(200);
        conv.push(Message::user("the query"));
        conv.push(Message::assistant_invocation(ToolInvocation::new("c1", "docs_getPage", "{}")));
        conv.push(Message::tool("x".repeat(2000), "c1"));
        conv.truncate_to_fit();

        assert_eq!(roles(&conv), [Role::System, Role::User, Role::Assistant, Role::Tool]);
    }

    #[test]
    fn test_truncate_drops_invocation_and_results_together() {
        let mut conv = Conversation::with_system_prompt("sys").with_max_context(200);
        conv.push(Message::user("the query"));
        let mut first = Message::assistant_invocation(ToolInvocation::new("c1", "docs_getPage", "{}"));
        first.tool_calls.push(ToolInvocation::new("c2", "docs_searchPages", "{}"));
        conv.push(first);
        conv.push(Message::tool("x".repeat(2000), "c1"));
        conv.push(Message::tool("y".repeat(40), "c2"));
        conv.push(Message::assistant_invocation(ToolInvocation::new("c3", "tickets_getTicket", "{}")));
        conv.push(Message::tool("z".repeat(40), "c3"));
        conv.truncate_to_fit();

        assert_eq!(roles(&conv), [Role::System, Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(conv.messages()[2].tool_calls[0].id, "c3");
        assert_eq!(conv.messages()[3].tool_call_id.as_deref(), Some("c3"));
    }
}

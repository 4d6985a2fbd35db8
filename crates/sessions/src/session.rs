//! Session model: an append-only conversation tied to one profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnstile_core::message::{Message, Role};
use turnstile_core::profile::truncate_chars;
use turnstile_core::tool::{ToolCall, ToolResult};
use uuid::Uuid;

const TITLE_CHARS: usize = 50;

/// One entry in a session's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub profile_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
}

/// Listing view of a session, without its messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub profile_name: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

impl Session {
    pub fn new(profile_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("session-{}", short_id()),
            profile_name: profile_name.into(),
            created_at: now,
            updated_at: now,
            title: None,
            messages: Vec::new(),
        }
    }

    /// Append a message. The first user message also becomes the title.
    pub fn add_message(
        &mut self,
        role: Role,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
        tool_results: Vec<ToolResult>,
    ) -> &SessionMessage {
        let content = content.into();
        if self.title.is_none() && role == Role::User {
            self.title = Some(truncate_chars(&content, TITLE_CHARS));
        }

        let now = Utc::now();
        self.updated_at = now;
        self.messages.push(SessionMessage {
            id: format!("msg-{}", short_id()),
            role,
            content,
            timestamp: now,
            tool_calls,
            tool_results,
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Conversation history in the shape the backend consumes.
    pub fn history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(|m| Message::new(m.role, m.content.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            profile_name: self.profile_name.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
        }
    }
}

fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

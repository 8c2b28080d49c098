use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const NEW_CHAT_TITLE: &str = "New Chat";
pub const DEFAULT_FOLDER: &str = "Work Projects";
pub const PREVIEW_PLACEHOLDER: &str = "Say hello to start...";
pub const PREVIEW_MAX_CHARS: usize = 80;

/// Generate a random local id for conversations, messages, folders and templates.
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Leading `PREVIEW_MAX_CHARS` characters of `content`.
pub fn preview_of(content: &str) -> String {
    content.chars().take(PREVIEW_MAX_CHARS).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown message role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    /// Persona in effect when an assistant message was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            edited_at: None,
            persona_id: None,
        }
    }

    pub fn assistant(
        id: impl Into<String>,
        content: impl Into<String>,
        persona_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
            edited_at: None,
            persona_id: Some(persona_id.into()),
        }
    }
}

/// A titled thread of messages.
///
/// Values are never mutated in place by the store: every `with_*` method
/// returns a new record, and `message_count`/`preview` are recomputed on each
/// one so they always agree with `messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    id: String,
    title: String,
    updated_at: DateTime<Utc>,
    message_count: usize,
    preview: String,
    pinned: bool,
    folder: String,
    messages: Vec<Message>,
    persona_id: String,
}

impl Conversation {
    /// Create an empty conversation for the given persona
    pub fn new(persona_id: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            title: NEW_CHAT_TITLE.to_string(),
            updated_at: Utc::now(),
            message_count: 0,
            preview: PREVIEW_PLACEHOLDER.to_string(),
            pinned: false,
            folder: DEFAULT_FOLDER.to_string(),
            messages: Vec::new(),
            persona_id: persona_id.into(),
        }
    }

    /// Rebuild a conversation from persisted parts.
    pub fn from_parts(
        id: impl Into<String>,
        title: impl Into<String>,
        updated_at: DateTime<Utc>,
        persona_id: impl Into<String>,
        folder: impl Into<String>,
        messages: Vec<Message>,
    ) -> Self {
        let mut conversation = Self {
            id: id.into(),
            title: title.into(),
            updated_at,
            message_count: 0,
            preview: String::new(),
            pinned: false,
            folder: folder.into(),
            messages,
            persona_id: persona_id.into(),
        };
        conversation.refresh_summary();
        conversation
    }

    fn refresh_summary(&mut self) {
        self.message_count = self.messages.len();
        self.preview = match self.messages.last() {
            Some(last) => preview_of(&last.content),
            None => PREVIEW_PLACEHOLDER.to_string(),
        };
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn message_count(&self) -> usize {
        self.message_count
    }

    pub fn preview(&self) -> &str {
        &self.preview
    }

    pub fn pinned(&self) -> bool {
        self.pinned
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn persona_id(&self) -> &str {
        &self.persona_id
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Append a message and bump `updated_at`.
    pub fn with_message(&self, message: Message, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.messages.push(message);
        next.updated_at = now;
        next.refresh_summary();
        next
    }

    /// Replace a message's content without touching `edited_at` (streaming).
    /// Returns `None` if the message does not exist.
    pub fn with_message_content(&self, message_id: &str, content: &str) -> Option<Self> {
        let index = self.messages.iter().position(|m| m.id == message_id)?;
        let mut next = self.clone();
        next.messages[index].content = content.to_string();
        next.refresh_summary();
        Some(next)
    }

    /// Replace a message's content as a user edit, stamping `edited_at`.
    /// Returns `None` if the message does not exist.
    pub fn with_edit(&self, message_id: &str, content: &str, now: DateTime<Utc>) -> Option<Self> {
        let index = self.messages.iter().position(|m| m.id == message_id)?;
        let mut next = self.clone();
        next.messages[index].content = content.to_string();
        next.messages[index].edited_at = Some(now);
        next.refresh_summary();
        Some(next)
    }

    pub fn with_pin_toggled(&self) -> Self {
        let mut next = self.clone();
        next.pinned = !next.pinned;
        next
    }

    pub fn with_persona(&self, persona_id: &str) -> Self {
        let mut next = self.clone();
        next.persona_id = persona_id.to_string();
        next
    }

    pub fn with_title(&self, title: &str) -> Self {
        let mut next = self.clone();
        next.title = title.to_string();
        next
    }

    pub fn with_folder(&self, folder: &str) -> Self {
        let mut next = self.clone();
        next.folder = folder.to_string();
        next
    }

    /// Case-insensitive substring match over title and preview.
    pub fn matches_query(&self, lowered_query: &str) -> bool {
        self.title.to_lowercase().contains(lowered_query)
            || self.preview.to_lowercase().contains(lowered_query)
    }
}

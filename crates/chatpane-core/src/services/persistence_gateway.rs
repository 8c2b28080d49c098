use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::conversation::DEFAULT_FOLDER;
use crate::models::{Conversation, DEFAULT_PERSONA_ID, Message, Role};
use crate::repositories::{ConversationRepository, ConversationRow, MessageRow, RepositoryResult};

/// Translates between store records and repository rows, and scopes writes
/// to the signed-in user.
#[derive(Clone)]
pub struct PersistenceGateway {
    repository: Arc<dyn ConversationRepository>,
    session: Arc<Mutex<Option<String>>>,
}

impl PersistenceGateway {
    pub fn new(repository: Arc<dyn ConversationRepository>) -> Self {
        Self {
            repository,
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_session(&self, user_id: Option<String>) {
        *self.session.lock() = user_id;
    }

    /// The signed-in user, if any
    pub fn session(&self) -> Option<String> {
        self.session.lock().clone()
    }

    /// Load every conversation of `user_id` with its messages.
    ///
    /// A conversation whose messages cannot be fetched is kept as an empty
    /// placeholder. Failing to list the conversations fails the whole call.
    pub async fn hydrate(&self, user_id: &str) -> RepositoryResult<Vec<Conversation>> {
        let rows = self
            .repository
            .list_conversations(user_id)
            .await
            .inspect_err(|e| error!(user_id = %user_id, error = ?e, "Failed to load conversations"))?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in rows {
            let messages = match self.repository.list_messages(&row.id).await {
                Ok(message_rows) => message_rows.into_iter().filter_map(message_from_row).collect(),
                Err(e) => {
                    warn!(conv_id = %row.id, error = ?e, "Failed to load messages, keeping empty conversation");
                    Vec::new()
                }
            };
            conversations.push(conversation_from_row(row, messages));
        }

        info!(user_id = %user_id, count = conversations.len(), "Hydrated conversations");
        Ok(conversations)
    }

    /// Upsert the conversation and all of its messages. Does nothing when
    /// signed out; failures are logged and swallowed.
    pub async fn persist(&self, conversation: &Conversation) {
        let Some(user_id) = self.session() else {
            return;
        };

        let row = conversation_row(&user_id, conversation);
        if let Err(e) = self.repository.upsert_conversation(row).await {
            warn!(conv_id = %conversation.id(), error = ?e, "Failed to save conversation");
            return;
        }

        let messages = message_rows(conversation);
        if messages.is_empty() {
            return;
        }
        let count = messages.len();
        match self.repository.upsert_messages(messages).await {
            Ok(()) => debug!(conv_id = %conversation.id(), count, "Saved conversation"),
            Err(e) => warn!(conv_id = %conversation.id(), error = ?e, "Failed to save messages"),
        }
    }

    /// Fire-and-forget `persist` on the runtime.
    pub fn persist_in_background(&self, conversation: Conversation) -> JoinHandle<()> {
        let gateway = self.clone();
        tokio::spawn(async move { gateway.persist(&conversation).await })
    }
}

fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn conversation_row(user_id: &str, conversation: &Conversation) -> ConversationRow {
    ConversationRow {
        id: conversation.id().to_string(),
        user_id: user_id.to_string(),
        title: conversation.title().to_string(),
        persona_id: Some(conversation.persona_id().to_string()),
        folder_id: None,
        updated_at: to_millis(conversation.updated_at()),
    }
}

fn message_rows(conversation: &Conversation) -> Vec<MessageRow> {
    conversation
        .messages()
        .iter()
        .map(|m| MessageRow {
            id: m.id.clone(),
            conversation_id: conversation.id().to_string(),
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
            created_at: to_millis(m.created_at),
        })
        .collect()
}

fn message_from_row(row: MessageRow) -> Option<Message> {
    let role = match Role::from_str(&row.role) {
        Ok(role) => role,
        Err(e) => {
            warn!(message_id = %row.id, error = %e, "Skipping message with unknown role");
            return None;
        }
    };
    Some(Message {
        id: row.id,
        role,
        content: row.content,
        created_at: from_millis(row.created_at),
        edited_at: None,
        persona_id: None,
    })
}

fn conversation_from_row(row: ConversationRow, messages: Vec<Message>) -> Conversation {
    let persona_id = row
        .persona_id
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PERSONA_ID.to_string());
    let folder = row
        .folder_id
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| DEFAULT_FOLDER.to_string());
    Conversation::from_parts(
        row.id,
        row.title,
        from_millis(row.updated_at),
        persona_id,
        folder,
        messages,
    )
}

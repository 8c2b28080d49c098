use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::error::RepositoryResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Row of the `conversations` table. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub persona_id: Option<String>,
    /// Read on hydration only; upserts never write it.
    #[serde(default)]
    pub folder_id: Option<String>,
    pub updated_at: i64,
}

/// Row of the `messages` table. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: i64,
}

/// Persistence backend for a user's conversations and messages.
pub trait ConversationRepository: Send + Sync + 'static {
    /// Conversations owned by `user_id`, most recently updated first
    fn list_conversations(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, RepositoryResult<Vec<ConversationRow>>>;

    /// Messages of one conversation, oldest first
    fn list_messages(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'static, RepositoryResult<Vec<MessageRow>>>;

    /// Insert or update a conversation row
    fn upsert_conversation(&self, row: ConversationRow) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Insert or update a batch of message rows
    fn upsert_messages(&self, rows: Vec<MessageRow>) -> BoxFuture<'static, RepositoryResult<()>>;
}

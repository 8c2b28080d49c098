use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::conversation_repository::{
    BoxFuture, ConversationRepository, ConversationRow, MessageRow,
};
use super::error::{RepositoryError, RepositoryResult};

#[derive(Default)]
struct Tables {
    conversations: HashMap<String, ConversationRow>,
    messages: Vec<MessageRow>,
    conversation_upserts: usize,
    message_upserts: usize,
    fail_list: bool,
    fail_upserts: bool,
    failing_message_lists: HashSet<String>,
}

/// In-memory repository for conversations.
/// Useful for testing and for running without a database; failures can be
/// injected per operation.
#[derive(Clone, Default)]
pub struct InMemoryConversationRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `list_conversations` fail.
    pub fn fail_conversation_list(&self, fail: bool) {
        self.tables.lock().fail_list = fail;
    }

    /// Make `list_messages` fail for one conversation.
    pub fn fail_messages_for(&self, conversation_id: &str) {
        self.tables
            .lock()
            .failing_message_lists
            .insert(conversation_id.to_string());
    }

    /// Make both upsert operations fail.
    pub fn fail_upserts(&self, fail: bool) {
        self.tables.lock().fail_upserts = fail;
    }

    /// Number of successful conversation upserts so far
    pub fn conversation_upserts(&self) -> usize {
        self.tables.lock().conversation_upserts
    }

    /// Number of successful message batch upserts so far
    pub fn message_upserts(&self) -> usize {
        self.tables.lock().message_upserts
    }

    pub fn conversation(&self, id: &str) -> Option<ConversationRow> {
        self.tables.lock().conversations.get(id).cloned()
    }

    pub fn messages_of(&self, conversation_id: &str) -> Vec<MessageRow> {
        let tables = self.tables.lock();
        let mut rows: Vec<MessageRow> = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.created_at);
        rows
    }
}

impl ConversationRepository for InMemoryConversationRepository {
    fn list_conversations(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, RepositoryResult<Vec<ConversationRow>>> {
        let tables = self.tables.clone();
        let user_id = user_id.to_string();

        Box::pin(async move {
            let tables = tables.lock();
            if tables.fail_list {
                return Err(RepositoryError::BackendError {
                    message: "conversation list unavailable".to_string(),
                });
            }

            let mut result: Vec<ConversationRow> = tables
                .conversations
                .values()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .collect();
            result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(result)
        })
    }

    fn list_messages(
        &self,
        conversation_id: &str,
    ) -> BoxFuture<'static, RepositoryResult<Vec<MessageRow>>> {
        let store = self.clone();
        let conversation_id = conversation_id.to_string();

        Box::pin(async move {
            if store
                .tables
                .lock()
                .failing_message_lists
                .contains(&conversation_id)
            {
                return Err(RepositoryError::BackendError {
                    message: format!("messages unavailable for {}", conversation_id),
                });
            }
            Ok(store.messages_of(&conversation_id))
        })
    }

    fn upsert_conversation(&self, row: ConversationRow) -> BoxFuture<'static, RepositoryResult<()>> {
        let tables = self.tables.clone();

        Box::pin(async move {
            let mut tables = tables.lock();
            if tables.fail_upserts {
                return Err(RepositoryError::BackendError {
                    message: "upsert rejected".to_string(),
                });
            }
            // Mirror the SQL upsert: folder_id is never overwritten.
            let folder_id = tables
                .conversations
                .get(&row.id)
                .and_then(|existing| existing.folder_id.clone());
            tables.conversations.insert(
                row.id.clone(),
                ConversationRow {
                    folder_id: folder_id.or(row.folder_id.clone()),
                    ..row
                },
            );
            tables.conversation_upserts += 1;
            Ok(())
        })
    }

    fn upsert_messages(&self, rows: Vec<MessageRow>) -> BoxFuture<'static, RepositoryResult<()>> {
        let tables = self.tables.clone();

        Box::pin(async move {
            let mut tables = tables.lock();
            if tables.fail_upserts {
                return Err(RepositoryError::BackendError {
                    message: "upsert rejected".to_string(),
                });
            }
            for row in rows {
                match tables.messages.iter_mut().find(|m| m.id == row.id) {
                    Some(existing) => *existing = row,
                    None => tables.messages.push(row),
                }
            }
            tables.message_upserts += 1;
            Ok(())
        })
    }
}

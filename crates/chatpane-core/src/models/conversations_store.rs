use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use super::conversation::{Conversation, Message};
use super::folders::Folder;

/// Number of entries shown in the "recent" sidebar section.
pub const RECENT_LIMIT: usize = 10;

/// Store shared between the engine, the gateway and the session bridge.
/// The lock is never held across an await.
pub type SharedStore = Arc<Mutex<ConversationsStore>>;

/// How `append_or_update_assistant_message` treats the message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantMode {
    /// Insert a new assistant message created under `persona_id`.
    Create { persona_id: String },
    /// Replace the content of an existing assistant message with the full
    /// accumulated text.
    Append,
}

/// Ordered collection of conversations plus the active selection.
///
/// Every mutation swaps a freshly built `Conversation` into the slot of the
/// same id and hands a copy of it back so the caller can persist it.
pub struct ConversationsStore {
    conversations: Vec<Conversation>,
    active_conversation_id: Option<String>,
}

impl ConversationsStore {
    pub fn new() -> Self {
        Self {
            conversations: Vec::new(),
            active_conversation_id: None,
        }
    }

    pub fn shared() -> SharedStore {
        Arc::new(Mutex::new(Self::new()))
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.conversations.iter().position(|c| c.id() == id)
    }

    fn replace(&mut self, index: usize, next: Conversation) -> Conversation {
        self.conversations[index] = next.clone();
        next
    }

    /// Create an empty conversation at the head of the list and select it
    pub fn create_conversation(&mut self, persona_id: &str) -> String {
        let conversation = Conversation::new(persona_id);
        let id = conversation.id().to_string();
        self.conversations.insert(0, conversation);
        self.active_conversation_id = Some(id.clone());
        id
    }

    /// Set the active conversation; ignored if the id is unknown
    pub fn select_conversation(&mut self, id: &str) -> bool {
        if self.position(id).is_some() {
            self.active_conversation_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_conversation_id.as_deref()
    }

    pub fn selected(&self) -> Option<&Conversation> {
        self.active_id().and_then(|id| self.get(id))
    }

    pub fn clear_active(&mut self) {
        self.active_conversation_id = None;
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id() == id)
    }

    /// All conversations in store order (newest created first).
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn toggle_pin(&mut self, id: &str) -> Option<Conversation> {
        let index = self.position(id)?;
        let next = self.conversations[index].with_pin_toggled();
        Some(self.replace(index, next))
    }

    pub fn set_conversation_persona(&mut self, id: &str, persona_id: &str) -> Option<Conversation> {
        let index = self.position(id)?;
        let next = self.conversations[index].with_persona(persona_id);
        Some(self.replace(index, next))
    }

    pub fn move_to_folder(&mut self, id: &str, folder: &str) -> Option<Conversation> {
        let index = self.position(id)?;
        let next = self.conversations[index].with_folder(folder);
        Some(self.replace(index, next))
    }

    /// Append a user message. Whitespace-only content is ignored and leaves
    /// the store untouched.
    pub fn append_user_message(
        &mut self,
        conv_id: &str,
        content: &str,
    ) -> Option<(Conversation, Message)> {
        if content.trim().is_empty() {
            return None;
        }
        let index = self.position(conv_id)?;
        let message = Message::user(content);
        let next = self.conversations[index].with_message(message.clone(), Utc::now());
        Some((self.replace(index, next), message))
    }

    /// Append a complete assistant message in one step.
    pub fn append_assistant_message(
        &mut self,
        conv_id: &str,
        content: &str,
        persona_id: &str,
    ) -> Option<Conversation> {
        let index = self.position(conv_id)?;
        let message = Message::assistant(super::conversation::generate_id(), content, persona_id);
        let next = self.conversations[index].with_message(message, Utc::now());
        Some(self.replace(index, next))
    }

    /// Create or refresh an in-flight assistant message.
    ///
    /// In `Append` mode `content` is the whole reply so far, not a delta.
    pub fn append_or_update_assistant_message(
        &mut self,
        conv_id: &str,
        message_id: &str,
        content: &str,
        mode: AssistantMode,
    ) -> Option<Conversation> {
        let index = self.position(conv_id)?;
        let current = &self.conversations[index];
        let next = match mode {
            AssistantMode::Create { persona_id } => {
                let message = Message::assistant(message_id, content, persona_id);
                current.with_message(message, Utc::now())
            }
            AssistantMode::Append => current.with_message_content(message_id, content)?,
        };
        Some(self.replace(index, next))
    }

    pub fn edit_message(
        &mut self,
        conv_id: &str,
        message_id: &str,
        new_content: &str,
    ) -> Option<Conversation> {
        let index = self.position(conv_id)?;
        let next = self.conversations[index].with_edit(message_id, new_content, Utc::now())?;
        Some(self.replace(index, next))
    }

    /// Conversations whose title or preview contains `query`, ignoring case.
    pub fn filtered_view(&self, query: &str) -> Vec<&Conversation> {
        if query.trim().is_empty() {
            return self.conversations.iter().collect();
        }
        let lowered = query.to_lowercase();
        self.conversations
            .iter()
            .filter(|c| c.matches_query(&lowered))
            .collect()
    }

    /// Pinned conversations matching `query`, newest first
    pub fn pinned_view(&self, query: &str) -> Vec<&Conversation> {
        let mut convs: Vec<&Conversation> = self
            .filtered_view(query)
            .into_iter()
            .filter(|c| c.pinned())
            .collect();
        convs.sort_by_key(|c| std::cmp::Reverse(c.updated_at()));
        convs
    }

    /// Up to `RECENT_LIMIT` unpinned conversations matching `query`, newest first
    pub fn recent_view(&self, query: &str) -> Vec<&Conversation> {
        let mut convs: Vec<&Conversation> = self
            .filtered_view(query)
            .into_iter()
            .filter(|c| !c.pinned())
            .collect();
        convs.sort_by_key(|c| std::cmp::Reverse(c.updated_at()));
        convs.truncate(RECENT_LIMIT);
        convs
    }

    /// Per known folder name, the number of conversations filed under it.
    pub fn folder_counts(&self, folders: &[Folder]) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> =
            folders.iter().map(|f| (f.name.clone(), 0)).collect();
        for conversation in &self.conversations {
            if let Some(count) = counts.get_mut(conversation.folder()) {
                *count += 1;
            }
        }
        counts
    }

    /// Replace everything with hydrated conversations. Keeps the selection
    /// if it still exists, otherwise selects the first entry.
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        let still_present = self
            .active_conversation_id
            .as_deref()
            .is_some_and(|id| self.conversations.iter().any(|c| c.id() == id));
        if !still_present {
            self.active_conversation_id = self.conversations.first().map(|c| c.id().to_string());
        }
    }

    /// Drop all conversations and the selection (sign-out).
    pub fn reset(&mut self) {
        self.conversations.clear();
        self.active_conversation_id = None;
    }
}

impl Default for ConversationsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::conversation::{PREVIEW_PLACEHOLDER, Role};
    use chrono::{Duration, TimeZone};

    fn store_with_one() -> (ConversationsStore, String) {
        let mut store = ConversationsStore::new();
        let id = store.create_conversation("default");
        (store, id)
    }

    fn dated(id: &str, minutes: i64, folder: &str) -> Conversation {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Conversation::from_parts(
            id,
            format!("Conversation {}", id),
            base + Duration::minutes(minutes),
            "default",
            folder,
            Vec::new(),
        )
    }

    #[test]
    fn test_create_inserts_at_head_and_selects() {
        let mut store = ConversationsStore::new();
        let first = store.create_conversation("default");
        let second = store.create_conversation("writer");
        assert_eq!(store.conversations()[0].id(), second);
        assert_eq!(store.conversations()[1].id(), first);
        assert_eq!(store.active_id(), Some(second.as_str()));
        assert_eq!(store.selected().unwrap().persona_id(), "writer");
    }

    #[test]
    fn test_select_unknown_is_noop() {
        let (mut store, id) = store_with_one();
        assert!(!store.select_conversation("missing"));
        assert_eq!(store.active_id(), Some(id.as_str()));
    }

    #[test]
    fn test_toggle_pin() {
        let (mut store, id) = store_with_one();
        assert!(store.toggle_pin(&id).unwrap().pinned());
        assert!(!store.toggle_pin(&id).unwrap().pinned());
        assert!(store.toggle_pin("missing").is_none());
    }

    #[test]
    fn test_empty_user_message_is_ignored() {
        let (mut store, id) = store_with_one();
        let before = store.get(&id).unwrap().clone();
        assert!(store.append_user_message(&id, "").is_none());
        assert!(store.append_user_message(&id, "   \n\t").is_none());
        assert_eq!(store.get(&id).unwrap(), &before);
    }

    #[test]
    fn test_append_user_message_updates_summary() {
        let (mut store, id) = store_with_one();
        let before = store.get(&id).unwrap().updated_at();
        let (conv, message) = store.append_user_message(&id, "hello").unwrap();
        assert_eq!(message.role, Role::User);
        assert_eq!(conv.message_count(), 1);
        assert_eq!(conv.preview(), "hello");
        assert!(conv.updated_at() >= before);
    }

    #[test]
    fn test_assistant_create_then_append_replaces_content() {
        let (mut store, id) = store_with_one();
        store.append_user_message(&id, "hello").unwrap();
        store
            .append_or_update_assistant_message(
                &id,
                "a1",
                "",
                AssistantMode::Create {
                    persona_id: "developer".into(),
                },
            )
            .unwrap();
        store
            .append_or_update_assistant_message(&id, "a1", "Hi", AssistantMode::Append)
            .unwrap();
        let conv = store
            .append_or_update_assistant_message(&id, "a1", "Hi there", AssistantMode::Append)
            .unwrap();
        let reply = conv.message("a1").unwrap();
        assert_eq!(reply.content, "Hi there");
        assert_eq!(reply.persona_id.as_deref(), Some("developer"));
        assert_eq!(conv.message_count(), 2);
        assert_eq!(conv.preview(), "Hi there");
    }

    #[test]
    fn test_append_to_unknown_message_is_noop() {
        let (mut store, id) = store_with_one();
        assert!(
            store
                .append_or_update_assistant_message(&id, "ghost", "x", AssistantMode::Append)
                .is_none()
        );
        assert_eq!(store.get(&id).unwrap().message_count(), 0);
    }

    #[test]
    fn test_assistant_persona_survives_conversation_persona_change() {
        let (mut store, id) = store_with_one();
        store.append_assistant_message(&id, "reply", "teacher");
        store.set_conversation_persona(&id, "friend");
        let conv = store.get(&id).unwrap();
        assert_eq!(conv.persona_id(), "friend");
        assert_eq!(conv.messages()[0].persona_id.as_deref(), Some("teacher"));
    }

    #[test]
    fn test_edit_message_recomputes_preview_from_last() {
        let (mut store, id) = store_with_one();
        let (_, first) = store.append_user_message(&id, "first").unwrap();
        store.append_user_message(&id, "second").unwrap();
        let conv = store.edit_message(&id, &first.id, "edited").unwrap();
        assert_eq!(conv.preview(), "second");
        assert!(conv.message(&first.id).unwrap().edited_at.is_some());
    }

    #[test]
    fn test_message_count_invariant_over_operations() {
        let (mut store, id) = store_with_one();
        let (_, user) = store.append_user_message(&id, "one").unwrap();
        store.append_or_update_assistant_message(
            &id,
            "a",
            "",
            AssistantMode::Create {
                persona_id: "default".into(),
            },
        );
        store.append_or_update_assistant_message(&id, "a", "two", AssistantMode::Append);
        store.edit_message(&id, &user.id, "uno");
        store.append_user_message(&id, "");
        store.append_assistant_message(&id, "three", "default");
        let conv = store.get(&id).unwrap();
        assert_eq!(conv.message_count(), conv.messages().len());
        assert_eq!(conv.message_count(), 3);
        assert_eq!(conv.preview(), "three");
    }

    #[test]
    fn test_filtered_view_blank_query_returns_all() {
        let mut store = ConversationsStore::new();
        store.create_conversation("default");
        store.create_conversation("default");
        assert_eq!(store.filtered_view("").len(), 2);
        assert_eq!(store.filtered_view("   ").len(), 2);
    }

    #[test]
    fn test_filtered_view_matches_title_and_preview() {
        let mut store = ConversationsStore::new();
        let id = store.create_conversation("default");
        store.append_user_message(&id, "Tokio runtime question");
        store.create_conversation("default");
        let hits = store.filtered_view("TOKIO");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), id);
        assert_eq!(store.filtered_view("new chat").len(), 2);
        assert_eq!(store.filtered_view(&PREVIEW_PLACEHOLDER[..5]).len(), 1);
    }

    #[test]
    fn test_filtered_view_keeps_surrounding_whitespace() {
        let mut store = ConversationsStore::new();
        let id = store.create_conversation("default");
        store.append_user_message(&id, "rustacean");
        assert_eq!(store.filtered_view("rust").len(), 1);
        assert!(store.filtered_view(" rust").is_empty());
        assert!(store.filtered_view("rust ").is_empty());
    }

    #[test]
    fn test_pinned_and_recent_views() {
        let mut store = ConversationsStore::new();
        let convs: Vec<Conversation> = (0..15)
            .map(|i| dated(&format!("c{}", i), i, "Work Projects"))
            .collect();
        store.replace_all(convs);
        store.toggle_pin("c3");
        store.toggle_pin("c14");

        let pinned = store.pinned_view("");
        assert_eq!(
            pinned.iter().map(|c| c.id()).collect::<Vec<_>>(),
            vec!["c14", "c3"]
        );

        let recent = store.recent_view("");
        assert_eq!(recent.len(), RECENT_LIMIT);
        assert!(recent.iter().all(|c| !c.pinned()));
        assert_eq!(recent[0].id(), "c13");
        assert!(
            recent
                .windows(2)
                .all(|w| w[0].updated_at() >= w[1].updated_at())
        );
    }

    #[test]
    fn test_recent_view_ties_keep_store_order() {
        let mut store = ConversationsStore::new();
        store.replace_all(vec![dated("a", 0, "x"), dated("b", 0, "x"), dated("c", 0, "x")]);
        let ids: Vec<&str> = store.recent_view("").iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_folder_counts_exclude_unknown_folders() {
        let mut store = ConversationsStore::new();
        store.replace_all(vec![
            dated("a", 0, "Work Projects"),
            dated("b", 1, "Work Projects"),
            dated("c", 2, "Personal"),
            dated("d", 3, "Nowhere"),
        ]);
        let folders = vec![
            Folder::new("Work Projects"),
            Folder::new("Personal"),
            Folder::new("Travel"),
        ];
        let counts = store.folder_counts(&folders);
        assert_eq!(counts.len(), 3);
        assert_eq!(counts["Work Projects"], 2);
        assert_eq!(counts["Personal"], 1);
        assert_eq!(counts["Travel"], 0);
        assert!(!counts.contains_key("Nowhere"));
    }

    #[test]
    fn test_folder_counts_are_exact_match() {
        let mut store = ConversationsStore::new();
        store.replace_all(vec![dated("a", 0, "work projects")]);
        let counts = store.folder_counts(&[Folder::new("Work Projects")]);
        assert_eq!(counts["Work Projects"], 0);
    }

    #[test]
    fn test_replace_all_selects_first_when_selection_lost() {
        let (mut store, _old) = store_with_one();
        store.replace_all(vec![dated("x", 0, "f"), dated("y", 1, "f")]);
        assert_eq!(store.active_id(), Some("x"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let (mut store, _) = store_with_one();
        store.reset();
        assert!(store.is_empty());
        assert!(store.active_id().is_none());
    }
}

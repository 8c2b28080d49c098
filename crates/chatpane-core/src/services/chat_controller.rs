use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::completion_client::CompletionBackend;
use super::persistence_gateway::PersistenceGateway;
use super::reply_engine::{ReplyEngine, SendOutcome};
use super::session_bridge::{SessionBridge, SessionProvider};
use crate::config::EngineConfig;
use crate::models::preferences::Theme;
use crate::models::{
    Conversation, ConversationsStore, Folder, FolderError, FolderList, Persona, PersonaRegistry,
    Preferences, SharedStore, Template, TemplateStore,
};
use crate::repositories::{ConversationRepository, PreferencesRepository};
use crate::shortcuts::{Focus, KeyEvent, ShortcutAction, resolve_shortcut};

/// Sidebar section that can be folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebarSection {
    Pinned,
    Recent,
    Folders,
    Templates,
}

/// Wires the store, engine, gateway, session bridge and preferences together
/// and exposes the user-facing actions of the chat window.
pub struct ChatController {
    store: SharedStore,
    gateway: PersistenceGateway,
    engine: ReplyEngine,
    bridge: SessionBridge,
    registry: PersonaRegistry,
    folders: Mutex<FolderList>,
    templates: Mutex<TemplateStore>,
    preferences: Mutex<Preferences>,
    preferences_repository: Arc<dyn PreferencesRepository>,
}

impl ChatController {
    pub fn new(
        repository: Arc<dyn ConversationRepository>,
        backend: Arc<dyn CompletionBackend>,
        provider: Arc<dyn SessionProvider>,
        preferences_repository: Arc<dyn PreferencesRepository>,
        config: EngineConfig,
    ) -> Self {
        let store = ConversationsStore::shared();
        let gateway = PersistenceGateway::new(repository);
        let engine = ReplyEngine::new(store.clone(), gateway.clone(), backend, config);
        let bridge =
            SessionBridge::new(store.clone(), gateway.clone(), provider).with_engine(engine.clone());

        Self {
            store,
            gateway,
            engine,
            bridge,
            registry: PersonaRegistry::builtin(),
            folders: Mutex::new(FolderList::with_defaults()),
            templates: Mutex::new(TemplateStore::with_defaults()),
            preferences: Mutex::new(Preferences::default()),
            preferences_repository,
        }
    }

    /// Load preferences, resolve the session and make sure a conversation is
    /// selected.
    pub async fn start(&self) {
        match self.preferences_repository.load().await {
            Ok(loaded) => *self.preferences.lock() = loaded,
            Err(e) => warn!(error = ?e, "Failed to load preferences, using defaults"),
        }
        let persona = self.preferences.lock().selected_persona.clone();
        self.engine.set_default_persona(&persona);

        self.bridge.mount().await;

        if self.store.lock().selected().is_none() {
            info!("No conversation selected, creating initial conversation");
            self.create_chat();
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn engine(&self) -> &ReplyEngine {
        &self.engine
    }

    pub fn bridge(&self) -> &SessionBridge {
        &self.bridge
    }

    pub fn personas(&self) -> &'static [Persona] {
        self.registry.all()
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences.lock().clone()
    }

    pub fn selected(&self) -> Option<Conversation> {
        self.store.lock().selected().cloned()
    }

    /// Persona of the selected conversation, else the preferred one.
    pub fn current_persona(&self) -> &'static Persona {
        let id = match self.selected() {
            Some(conversation) => conversation.persona_id().to_string(),
            None => self.preferences.lock().selected_persona.clone(),
        };
        self.registry.resolve(&id)
    }

    /// Start an empty conversation with the preferred persona and select it.
    pub fn create_chat(&self) -> String {
        let persona = self.preferences.lock().selected_persona.clone();
        let (id, snapshot) = {
            let mut store = self.store.lock();
            let id = store.create_conversation(&persona);
            let snapshot = store.get(&id).cloned();
            (id, snapshot)
        };
        info!(conv_id = %id, persona = %persona, "Created conversation");
        if let Some(conversation) = snapshot {
            self.gateway.persist_in_background(conversation);
        }
        id
    }

    pub fn select(&self, conv_id: &str) -> bool {
        self.store.lock().select_conversation(conv_id)
    }

    /// Pinning is local to the session; nothing is persisted.
    pub fn toggle_pin(&self, conv_id: &str) -> bool {
        self.store.lock().toggle_pin(conv_id).is_some()
    }

    pub fn move_to_folder(&self, conv_id: &str, folder: &str) -> bool {
        self.store.lock().move_to_folder(conv_id, folder).is_some()
    }

    /// Switch persona for the selected conversation and future chats.
    pub async fn change_persona(&self, persona_id: &str) -> bool {
        let Some(persona) = self.registry.get(persona_id) else {
            debug!(persona = %persona_id, "Unknown persona");
            return false;
        };

        self.engine.set_default_persona(persona.id);
        let updated = {
            let mut store = self.store.lock();
            let selected = store.active_id().map(str::to_string);
            selected.and_then(|id| store.set_conversation_persona(&id, persona.id))
        };
        if let Some(conversation) = updated {
            self.gateway.persist_in_background(conversation);
        }

        self.update_preferences(|prefs| prefs.selected_persona = persona.id.to_string())
            .await;
        true
    }

    /// Send to the selected conversation, creating one if needed.
    pub fn send(&self, content: &str) -> SendOutcome {
        let selected = self.store.lock().active_id().map(str::to_string);
        let conv_id = match selected {
            Some(id) => id,
            None if content.trim().is_empty() => return SendOutcome::Ignored,
            None => self.create_chat(),
        };
        self.engine.send_message(&conv_id, content)
    }

    pub fn edit_message(&self, conv_id: &str, message_id: &str, content: &str) -> bool {
        let edited = self
            .store
            .lock()
            .edit_message(conv_id, message_id, content);
        match edited {
            Some(conversation) => {
                self.gateway.persist_in_background(conversation);
                true
            }
            None => false,
        }
    }

    pub fn resend(&self, conv_id: &str, message_id: &str) -> SendOutcome {
        self.engine.resend_message(conv_id, message_id)
    }

    pub fn edit_and_resend(&self, conv_id: &str, message_id: &str, content: &str) -> SendOutcome {
        self.engine.edit_and_resend(conv_id, message_id, content)
    }

    /// Pause the reply of the selected conversation.
    pub fn pause(&self) -> bool {
        let selected = self.store.lock().active_id().map(str::to_string);
        selected.is_some_and(|id| self.engine.pause(&id))
    }

    pub fn pinned(&self, query: &str) -> Vec<Conversation> {
        self.store
            .lock()
            .pinned_view(query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn recent(&self, query: &str) -> Vec<Conversation> {
        self.store
            .lock()
            .recent_view(query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn folders(&self) -> Vec<Folder> {
        self.folders.lock().all().to_vec()
    }

    pub fn folder_counts(&self) -> HashMap<String, usize> {
        let folders = self.folders();
        self.store.lock().folder_counts(&folders)
    }

    pub fn create_folder(&self, name: &str) -> Result<Folder, FolderError> {
        self.folders.lock().create(name).cloned()
    }

    pub fn rename_folder(&self, id: &str, name: &str) -> Result<Folder, FolderError> {
        self.folders.lock().rename(id, name).cloned()
    }

    pub fn templates(&self) -> Vec<Template> {
        self.templates.lock().all().to_vec()
    }

    pub fn create_template(&self, name: &str, content: &str) -> Template {
        self.templates.lock().create(name, content).clone()
    }

    pub fn update_template(&self, id: &str, name: &str, content: &str) -> Option<Template> {
        self.templates.lock().update(id, name, content).cloned()
    }

    pub fn remove_template(&self, id: &str) -> bool {
        self.templates.lock().remove(id)
    }

    pub async fn set_theme(&self, theme: Option<Theme>) {
        self.update_preferences(|prefs| prefs.theme = theme).await;
    }

    pub async fn toggle_section(&self, section: SidebarSection) {
        self.update_preferences(|prefs| {
            let flag = match section {
                SidebarSection::Pinned => &mut prefs.sections.pinned,
                SidebarSection::Recent => &mut prefs.sections.recent,
                SidebarSection::Folders => &mut prefs.sections.folders,
                SidebarSection::Templates => &mut prefs.sections.templates,
            };
            *flag = !*flag;
        })
        .await;
    }

    pub async fn set_sidebar_collapsed(&self, collapsed: bool) {
        self.update_preferences(|prefs| prefs.sidebar_collapsed = collapsed)
            .await;
    }

    /// Resolve a key press and perform the actions that belong to the core.
    /// Focus and overlay actions are returned for the front end to apply.
    pub fn handle_key(&self, event: &KeyEvent, focus: Focus, sidebar_open: bool) -> Option<ShortcutAction> {
        let action = resolve_shortcut(event, focus, sidebar_open)?;
        if action == ShortcutAction::NewChat {
            self.create_chat();
        }
        Some(action)
    }

    async fn update_preferences(&self, change: impl FnOnce(&mut Preferences)) {
        let snapshot = {
            let mut prefs = self.preferences.lock();
            change(&mut prefs);
            prefs.clone()
        };
        if let Err(e) = self.preferences_repository.save(snapshot).await {
            warn!(error = ?e, "Failed to save preferences");
        }
    }
}

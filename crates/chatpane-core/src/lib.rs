//! Headless core of the chatpane assistant: conversation state, streaming
//! replies, persistence and session handling.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod repositories;
pub mod services;
pub mod shortcuts;

pub use config::{AppConfig, ConfigError, EngineConfig};
pub use error::ChatError;
pub use models::{
    AssistantMode, Conversation, ConversationsStore, Folder, FolderList, Message, Persona,
    PersonaRegistry, Preferences, Role, SharedStore, Template, TemplateStore,
};
pub use services::{
    ChatController, PersistenceGateway, ReplyEngine, ReplyEvent, SendOutcome, SessionBridge,
    SessionEvent,
};

pub mod conversation;
pub mod conversations_store;
pub mod error_store;
pub mod folders;
pub mod persona;
pub mod preferences;
pub mod stream_manager;
pub mod templates;

pub use conversation::{Conversation, Message, Role};
pub use conversations_store::{AssistantMode, ConversationsStore, SharedStore};
pub use error_store::{ErrorEntry, ErrorLevel, ErrorStore};
pub use folders::{Folder, FolderError, FolderList};
pub use persona::{DEFAULT_PERSONA_ID, Persona, PersonaColor, PersonaRegistry};
pub use preferences::{Preferences, SidebarSections, Theme};
pub use stream_manager::{GenerationState, StreamManager, StreamTicket};
pub use templates::{Template, TemplateStore};

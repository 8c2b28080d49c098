pub mod conversation_repository;
pub mod error;
pub mod in_memory_repository;
pub mod preferences_repository;
pub mod sqlite_repository;

pub use conversation_repository::{BoxFuture, ConversationRepository, ConversationRow, MessageRow};
pub use error::{RepositoryError, RepositoryResult};
pub use in_memory_repository::InMemoryConversationRepository;
pub use preferences_repository::{
    InMemoryPreferencesRepository, PreferencesJsonRepository, PreferencesRepository,
};
pub use sqlite_repository::SqliteConversationRepository;

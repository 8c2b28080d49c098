pub mod chat_controller;
pub mod completion_client;
pub mod error_collector_layer;
pub mod persistence_gateway;
pub mod reply_engine;
pub mod session_bridge;
pub mod stream_decoder;

pub use chat_controller::{ChatController, SidebarSection};
pub use completion_client::{
    CompletionBackend, CompletionError, CompletionRequest, HttpCompletionBackend,
};
pub use error_collector_layer::ErrorCollectorLayer;
pub use persistence_gateway::PersistenceGateway;
pub use reply_engine::{FALLBACK_REPLY, ReplyEngine, ReplyEvent, ReplyHandle, SendOutcome};
pub use session_bridge::{SessionBridge, SessionEvent, SessionProvider, StaticSessionProvider};
pub use stream_decoder::{DecodeError, ReplyDecoder, StreamRecord};

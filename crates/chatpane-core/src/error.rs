use thiserror::Error;

use crate::repositories::RepositoryError;
use crate::services::completion_client::CompletionError;
use crate::services::stream_decoder::DecodeError;

/// The four failure classes a chat session can run into.
///
/// None of them is fatal: input errors are ignored, network errors become an
/// apology message, persistence errors are logged, and parse errors skip a
/// single stream record.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Empty message ignored")]
    UserInput,

    #[error("Network error: {0}")]
    Network(#[from] CompletionError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("Parse error: {0}")]
    Parse(#[from] DecodeError),
}

pub type ChatResult<T> = Result<T, ChatError>;

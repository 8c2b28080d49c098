use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle of the assistant reply for one conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed(String),
    Cancelled,
}

impl GenerationState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }
}

/// Per-conversation stream state.
///
/// The StreamManager does NOT accumulate response text; the engine owns the
/// accumulator and the store owns the message. This only tracks lifecycle,
/// the generating flag and cancellation.
struct StreamState {
    status: GenerationState,
    generating: bool,
    cancel_token: CancellationToken,
    /// Identifies which request owns the slot, so a superseded stream
    /// cannot finalize its successor.
    ticket: u64,
}

/// Handle returned when a stream is registered.
#[derive(Clone, Debug)]
pub struct StreamTicket {
    pub id: u64,
    pub cancel_token: CancellationToken,
}

/// Centralized stream lifecycle manager, one slot per conversation.
pub struct StreamManager {
    streams: HashMap<String, StreamState>,
    next_ticket: u64,
}

impl StreamManager {
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Register a new request for a conversation in the `Sending` state.
    /// If a request is already in flight for it, that one is cancelled first.
    pub fn register_stream(&mut self, conv_id: &str) -> StreamTicket {
        if let Some(existing) = self.streams.remove(conv_id)
            && existing.status.is_active()
        {
            existing.cancel_token.cancel();
            debug!(conv_id = %conv_id, "Cancelled existing stream before registering new one");
        }

        self.next_ticket += 1;
        let ticket = StreamTicket {
            id: self.next_ticket,
            cancel_token: CancellationToken::new(),
        };
        self.streams.insert(
            conv_id.to_string(),
            StreamState {
                status: GenerationState::Sending,
                generating: true,
                cancel_token: ticket.cancel_token.clone(),
                ticket: ticket.id,
            },
        );
        ticket
    }

    fn current_mut(&mut self, conv_id: &str, ticket: u64) -> Option<&mut StreamState> {
        self.streams
            .get_mut(conv_id)
            .filter(|state| state.ticket == ticket)
    }

    /// Whether `ticket` still owns the conversation's slot.
    pub fn is_current(&self, conv_id: &str, ticket: u64) -> bool {
        self.streams
            .get(conv_id)
            .is_some_and(|state| state.ticket == ticket)
    }

    pub fn mark_streaming(&mut self, conv_id: &str, ticket: u64) {
        if let Some(state) = self.current_mut(conv_id, ticket)
            && state.status == GenerationState::Sending
        {
            state.status = GenerationState::Streaming;
        }
    }

    /// Record the terminal state of a request and clear the generating flag.
    /// Returns false if the ticket was superseded.
    pub fn finalize_stream(&mut self, conv_id: &str, ticket: u64, status: GenerationState) -> bool {
        let Some(state) = self.current_mut(conv_id, ticket) else {
            debug!(conv_id = %conv_id, ticket, "finalize_stream called for a superseded stream");
            return false;
        };
        // A cancelled stream stays cancelled even if its task winds down later.
        if state.status != GenerationState::Cancelled {
            state.status = status;
        }
        state.generating = false;
        true
    }

    /// Clear the generating flag of an active request. With `cancel` the
    /// request is also cancelled so no further chunks are applied.
    /// Returns false if nothing was in flight.
    pub fn pause(&mut self, conv_id: &str, cancel: bool) -> bool {
        let Some(state) = self.streams.get_mut(conv_id) else {
            return false;
        };
        if !state.status.is_active() || !state.generating {
            return false;
        }
        state.generating = false;
        if cancel {
            state.cancel_token.cancel();
            state.status = GenerationState::Cancelled;
            debug!(conv_id = %conv_id, "Stream cancelled by pause");
        } else {
            debug!(conv_id = %conv_id, "Generating flag cleared, stream left running");
        }
        true
    }

    /// Is an assistant reply being composed (and shown as such)?
    pub fn is_generating(&self, conv_id: &str) -> bool {
        self.streams.get(conv_id).is_some_and(|s| s.generating)
    }

    pub fn state(&self, conv_id: &str) -> GenerationState {
        self.streams
            .get(conv_id)
            .map(|s| s.status.clone())
            .unwrap_or(GenerationState::Idle)
    }

    pub fn has_active_streams(&self) -> bool {
        self.streams.values().any(|s| s.status.is_active())
    }

    /// Cancel every in-flight request (shutdown, sign-out).
    pub fn stop_all(&mut self) {
        for (conv_id, state) in self.streams.iter_mut() {
            if state.status.is_active() {
                state.cancel_token.cancel();
                state.status = GenerationState::Cancelled;
                state.generating = false;
                debug!(conv_id = %conv_id, "Stream stopped");
            }
        }
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::time::SystemTime;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::models::{ErrorEntry, ErrorLevel};

/// Entries buffered between the layer and the `ErrorStore`.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }
}

/// Forwards WARN and ERROR events to a bounded channel, so background
/// failures can be listed on request instead of interrupting the chat.
pub struct ErrorCollectorLayer {
    sender: SyncSender<ErrorEntry>,
}

impl ErrorCollectorLayer {
    pub fn new() -> (Self, Receiver<ErrorEntry>) {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, Receiver<ErrorEntry>) {
        let (sender, receiver) = sync_channel(capacity);
        (Self { sender }, receiver)
    }
}

impl<S: Subscriber> Layer<S> for ErrorCollectorLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = match *metadata.level() {
            Level::ERROR => ErrorLevel::Error,
            Level::WARN => ErrorLevel::Warning,
            _ => return,
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let entry = ErrorEntry {
            timestamp: SystemTime::now(),
            level,
            message: visitor.message.unwrap_or_default(),
            target: metadata.target().to_string(),
            fields: visitor.fields,
        };

        // Drop instead of blocking when nobody drains the channel
        let _ = self.sender.try_send(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorStore;
    use tracing_subscriber::layer::SubscriberExt;

    fn collector(capacity: usize) -> (impl Subscriber, Receiver<ErrorEntry>) {
        let (layer, rx) = ErrorCollectorLayer::with_capacity(capacity);
        (tracing_subscriber::registry().with(layer), rx)
    }

    #[test]
    fn test_captures_warnings_and_errors_only() {
        let (subscriber, rx) = collector(16);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("conversation opened");
            tracing::debug!("chunk applied");
            tracing::warn!("Failed to save conversation");
            tracing::error!("Failed to load conversations");
        });

        let first = rx.try_recv().unwrap();
        assert_eq!(first.level, ErrorLevel::Warning);
        assert_eq!(first.message, "Failed to save conversation");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.level, ErrorLevel::Error);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_captures_structured_fields_and_target() {
        let (subscriber, rx) = collector(16);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "chatpane::persistence", conv_id = %"c1", retries = 0, "Failed to save messages");
        });

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.target, "chatpane::persistence");
        assert_eq!(entry.fields.get("conv_id").map(String::as_str), Some("c1"));
        assert_eq!(entry.fields.get("retries").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_full_channel_drops_entries() {
        let (subscriber, rx) = collector(2);
        tracing::subscriber::with_default(subscriber, || {
            for i in 0..10 {
                tracing::error!("overflow event {}", i);
            }
        });

        let store = ErrorStore::new(50);
        assert_eq!(store.drain_from(&rx), 2);
        assert_eq!(store.error_count(), 2);
    }
}

use std::sync::mpsc::Receiver;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::models::{ErrorEntry, ErrorStore};
use crate::services::error_collector_layer::ErrorCollectorLayer;

/// Most recent captured warnings/errors kept for `/errors`.
pub const MAX_ERROR_ENTRIES: usize = 200;

/// Captured warnings and errors, filled by the collector layer.
pub struct Diagnostics {
    store: ErrorStore,
    receiver: Mutex<Receiver<ErrorEntry>>,
}

impl Diagnostics {
    pub fn new(receiver: Receiver<ErrorEntry>) -> Self {
        Self {
            store: ErrorStore::new(MAX_ERROR_ENTRIES),
            receiver: Mutex::new(receiver),
        }
    }

    /// Pull pending entries from the collector and return everything kept.
    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.store.drain_from(&self.receiver.lock());
        self.store.get_all_entries()
    }

    pub fn store(&self) -> &ErrorStore {
        &self.store
    }
}

/// Install the global subscriber: formatted output on stderr filtered by
/// `RUST_LOG` (or `default_filter`), plus the error collector.
pub fn init(default_filter: &str) -> Result<Diagnostics, TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let (collector, receiver) = ErrorCollectorLayer::new();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(collector)
        .try_init()?;

    Ok(Diagnostics::new(receiver))
}

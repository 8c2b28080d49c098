use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorLevel {
    Warning,
    Error,
}

/// A warning or error captured from the log stream.
#[derive(Clone, Debug)]
pub struct ErrorEntry {
    pub timestamp: SystemTime,
    pub level: ErrorLevel,
    pub message: String,
    pub target: String,
    pub fields: HashMap<String, String>,
}

/// Bounded log of background failures (persistence, malformed stream
/// records) that are never shown inline. Oldest entries are evicted first.
#[derive(Clone)]
pub struct ErrorStore {
    entries: Arc<Mutex<VecDeque<ErrorEntry>>>,
    max_entries: usize,
}

impl ErrorStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::new())),
            max_entries,
        }
    }

    pub fn add_entry(&self, entry: ErrorEntry) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Move everything waiting on the collector channel into the store.
    pub fn drain_from(&self, receiver: &std::sync::mpsc::Receiver<ErrorEntry>) -> usize {
        let mut drained = 0;
        while let Ok(entry) = receiver.try_recv() {
            self.add_entry(entry);
            drained += 1;
        }
        drained
    }

    pub fn get_all_entries(&self) -> Vec<ErrorEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == ErrorLevel::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == ErrorLevel::Warning)
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

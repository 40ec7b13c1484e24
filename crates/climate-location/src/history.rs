//! Recent selections, most recent first, one row per coordinate pair.

use std::collections::HashSet;
use std::sync::Arc;

use climate_core::StorageError;
use parking_lot::RwLock;

use crate::notify::ChangeNotifier;
use crate::store::{load_json, save_json, KeyValueStore};
use crate::types::HistoryEntry;

pub const HISTORY_KEY: &str = "search-history";

pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    entries: RwLock<Vec<HistoryEntry>>,
    notifier: ChangeNotifier,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>, capacity: usize, notifier: ChangeNotifier) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            entries: RwLock::new(Vec::new()),
            notifier,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace in-memory state with what the store holds. A missing or
    /// corrupt document leaves the history empty.
    pub fn load(&self) {
        let mut loaded: Vec<HistoryEntry> =
            load_json(self.store.as_ref(), HISTORY_KEY).unwrap_or_default();

        // Older documents may carry duplicates or exceed a lowered capacity.
        let mut seen = HashSet::new();
        loaded.retain(|entry| seen.insert(entry.key()));
        loaded.truncate(self.capacity);

        tracing::debug!("Loaded {} history entries", loaded.len());
        *self.entries.write() = loaded;
        self.notifier.notify();
    }

    /// Put `entry` at the front. An entry at the same coordinates is replaced
    /// rather than duplicated, and the oldest row falls off past capacity.
    pub fn record(&self, entry: HistoryEntry) {
        {
            let mut entries = self.entries.write();
            let key = entry.key();
            entries.retain(|existing| existing.key() != key);
            entries.insert(0, entry);
            if entries.len() > self.capacity {
                let evicted = entries.len() - self.capacity;
                entries.truncate(self.capacity);
                tracing::debug!("History full, evicted {} oldest entries", evicted);
            }
        }
        self.changed();
    }

    pub fn list(&self) -> Vec<HistoryEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.changed();
    }

    /// Write the current list to the store.
    pub fn flush(&self) -> Result<(), StorageError> {
        let entries = self.entries.read().clone();
        save_json(self.store.as_ref(), HISTORY_KEY, &entries)
    }

    fn changed(&self) {
        self.notifier.notify();
        if let Err(err) = self.flush() {
            tracing::warn!("Failed to persist history: {}", err);
        }
    }
}

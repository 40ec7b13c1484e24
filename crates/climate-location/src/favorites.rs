//! User-pinned places. Never evicted, insertion order preserved.

use std::sync::Arc;

use chrono::Utc;
use climate_core::StorageError;
use parking_lot::RwLock;

use crate::notify::ChangeNotifier;
use crate::store::{load_json, save_json, KeyValueStore};
use crate::types::{Coordinates, FavoriteEntry, Place};

pub const FAVORITES_KEY: &str = "favorites";

pub struct FavoritesStore {
    store: Arc<dyn KeyValueStore>,
    entries: RwLock<Vec<FavoriteEntry>>,
    notifier: ChangeNotifier,
}

impl FavoritesStore {
    pub fn new(store: Arc<dyn KeyValueStore>, notifier: ChangeNotifier) -> Self {
        Self {
            store,
            entries: RwLock::new(Vec::new()),
            notifier,
        }
    }

    pub fn load(&self) {
        let loaded: Vec<FavoriteEntry> =
            load_json(self.store.as_ref(), FAVORITES_KEY).unwrap_or_default();

        let mut entries: Vec<FavoriteEntry> = Vec::with_capacity(loaded.len());
        for entry in loaded {
            if !entries.iter().any(|e| e.id == entry.id || e.key() == entry.key()) {
                entries.push(entry);
            }
        }

        tracing::debug!("Loaded {} favorites", entries.len());
        *self.entries.write() = entries;
        self.notifier.notify();
    }

    /// Pin `place` under an id derived from its coordinates. Returns `false`
    /// if it was already pinned.
    pub fn add(&self, place: Place) -> bool {
        let id = FavoriteEntry::derived_id(&place);
        self.add_with_id(id, place)
    }

    /// Pin `place` under an external id. No-op if the id or the coordinates
    /// are already present.
    pub fn add_with_id(&self, id: impl Into<String>, place: Place) -> bool {
        let entry = FavoriteEntry {
            id: id.into(),
            place,
            added_at: Utc::now(),
        };

        {
            let mut entries = self.entries.write();
            if entries
                .iter()
                .any(|e| e.id == entry.id || e.key() == entry.key())
            {
                return false;
            }
            tracing::info!("Added favorite {}", entry.place.label());
            entries.push(entry);
        }
        self.changed();
        true
    }

    pub fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|e| e.id != id);
            entries.len() != before
        };
        if removed {
            self.changed();
        }
        removed
    }

    /// Add `place` if it is not pinned, remove it if it is. Returns whether
    /// it is pinned afterwards.
    pub fn toggle(&self, place: Place) -> bool {
        let key = place.key();
        let existing = self
            .entries
            .read()
            .iter()
            .find(|e| e.key() == key)
            .map(|e| e.id.clone());

        match existing {
            Some(id) => {
                self.remove(&id);
                false
            }
            None => self.add(place),
        }
    }

    pub fn list(&self) -> Vec<FavoriteEntry> {
        self.entries.read().clone()
    }

    pub fn is_favorite(&self, coords: Coordinates) -> bool {
        let key = coords.key();
        self.entries.read().iter().any(|e| e.key() == key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        let entries = self.entries.read().clone();
        save_json(self.store.as_ref(), FAVORITES_KEY, &entries)
    }

    fn changed(&self) {
        self.notifier.notify();
        if let Err(err) = self.flush() {
            tracing::warn!("Failed to persist favorites: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tokyo() -> Place {
        Place {
            name: "Tokyo".into(),
            country: "JP".into(),
            state: None,
            lat: 35.6895,
            lon: 139.6917,
        }
    }

    fn favorites() -> FavoritesStore {
        FavoritesStore::new(Arc::new(MemoryStore::new()), ChangeNotifier::new())
    }

    #[test]
    fn test_add_is_idempotent() {
        let favorites = favorites();
        assert!(favorites.add(tokyo()));
        assert!(!favorites.add(tokyo()));
        assert!(!favorites.add_with_id("custom", tokyo()));
        assert_eq!(favorites.len(), 1);
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let favorites = favorites();
        assert!(favorites.add_with_id("home", tokyo()));

        let mut elsewhere = tokyo();
        elsewhere.lat = 10.0;
        assert!(!favorites.add_with_id("home", elsewhere));
    }

    #[test]
    fn test_insertion_order_and_remove() {
        let favorites = favorites();
        let mut osaka = tokyo();
        osaka.name = "Osaka".into();
        osaka.lat = 34.69;
        osaka.lon = 135.50;

        favorites.add(tokyo());
        favorites.add(osaka.clone());
        let names: Vec<_> = favorites.list().into_iter().map(|f| f.place.name).collect();
        assert_eq!(names, vec!["Tokyo", "Osaka"]);

        let id = FavoriteEntry::derived_id(&tokyo());
        assert!(favorites.remove(&id));
        assert!(!favorites.remove(&id));
        assert!(!favorites.is_favorite(tokyo().coordinates()));
        assert!(favorites.is_favorite(osaka.coordinates()));
    }

    #[test]
    fn test_toggle() {
        let favorites = favorites();
        assert!(favorites.toggle(tokyo()));
        assert!(favorites.is_favorite(Coordinates::new(35.6895, 139.6917)));
        assert!(!favorites.toggle(tokyo()));
        assert!(favorites.is_empty());
    }

    #[test]
    fn test_persisted_independently() {
        let store = Arc::new(MemoryStore::new());
        let favorites = FavoritesStore::new(store.clone(), ChangeNotifier::new());
        favorites.add(tokyo());

        let reloaded = FavoritesStore::new(store.clone(), ChangeNotifier::new());
        reloaded.load();
        assert_eq!(reloaded.len(), 1);
        assert!(store.load(crate::history::HISTORY_KEY).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_store_resets_to_empty() {
        let store = Arc::new(MemoryStore::new());
        store.save(FAVORITES_KEY, b"[{\"id\": 3}]").unwrap();

        let favorites = FavoritesStore::new(store, ChangeNotifier::new());
        favorites.load();
        assert!(favorites.is_empty());
    }
}

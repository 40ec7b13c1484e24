//! Explicitly constructed container for the location subsystem.
//!
//! Construct once, call [`LocationService::initialize`] to load persisted
//! state, and [`LocationService::shutdown`] to flush it.

use std::sync::Arc;

use chrono::Utc;
use climate_core::{LocationConfig, StorageError};
use tokio::sync::watch;

use crate::current::{CurrentLocation, CurrentLocationState};
use crate::error::LookupError;
use crate::favorites::FavoritesStore;
use crate::geocode::{Geocoder, LocationResolver};
use crate::history::HistoryStore;
use crate::location::{CoordinateProvider, PositionOptions, PositionSource};
use crate::merge::{merge, MergedList};
use crate::notify::ChangeNotifier;
use crate::provider::WeatherSource;
use crate::search::{LocationSearch, SearchOptions, SearchOutcome};
use crate::store::KeyValueStore;
use crate::types::{Coordinates, Forecast, HistoryEntry, Place, WeatherReport};
use crate::weather::WeatherFeed;

/// External collaborators the service is built from.
pub struct ServiceDeps {
    pub store: Arc<dyn KeyValueStore>,
    pub geocoder: Arc<dyn Geocoder>,
    pub weather: Arc<dyn WeatherSource>,
    pub position: Arc<dyn PositionSource>,
}

pub struct LocationService {
    notifier: ChangeNotifier,
    history: HistoryStore,
    favorites: FavoritesStore,
    search: LocationSearch,
    resolver: Arc<LocationResolver>,
    weather: Arc<WeatherFeed>,
    current: CurrentLocation,
}

impl LocationService {
    pub fn new(config: &LocationConfig, deps: ServiceDeps) -> Self {
        let notifier = ChangeNotifier::new();
        let ttl = config.cache_ttl();

        let resolver = Arc::new(LocationResolver::new(
            Arc::clone(&deps.geocoder),
            ttl,
            notifier.clone(),
        ));
        let weather = Arc::new(WeatherFeed::new(deps.weather, ttl, notifier.clone()));
        let provider = Arc::new(CoordinateProvider::new(
            deps.position,
            PositionOptions::from(config),
        ));

        Self {
            history: HistoryStore::new(
                Arc::clone(&deps.store),
                config.history_capacity,
                notifier.clone(),
            ),
            favorites: FavoritesStore::new(deps.store, notifier.clone()),
            search: LocationSearch::new(deps.geocoder, SearchOptions::from(config), notifier.clone()),
            current: CurrentLocation::new(provider, Arc::clone(&resolver), Arc::clone(&weather)),
            resolver,
            weather,
            notifier,
        }
    }

    /// Load history and favorites. Corrupt data is logged and replaced by empty lists.
    pub fn initialize(&self) {
        self.history.load();
        self.favorites.load();
        tracing::info!(
            "Location service ready: {} recent, {} favorites",
            self.history.len(),
            self.favorites.len()
        );
    }

    /// Stop pending searches and write both stores.
    pub fn shutdown(&self) -> Result<(), StorageError> {
        self.search.cancel_pending();
        let history = self.history.flush();
        let favorites = self.favorites.flush();
        tracing::info!("Location service shut down");
        history.and(favorites)
    }

    /// Revision bumped whenever history, favorites or a lookup changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }

    pub fn location_updates(&self) -> watch::Receiver<CurrentLocationState> {
        self.current.subscribe()
    }

    pub async fn search(&self, text: &str) -> SearchOutcome {
        self.search.search(text).await
    }

    pub async fn search_debounced(&self, text: &str) -> SearchOutcome {
        self.search.search_debounced(text).await
    }

    /// The display list for the current input, from current snapshots.
    pub fn merged(&self, text: &str) -> MergedList {
        merge(
            &self.favorites.list(),
            &self.history.list(),
            &self.search.snapshot(text),
        )
    }

    /// Record that the user picked `place` after typing `query`.
    pub fn select(&self, place: Place, query: &str) -> HistoryEntry {
        let entry = HistoryEntry::new(place, query.trim(), Utc::now());
        tracing::info!("Selected {}", entry.place);
        self.history.record(entry.clone());
        entry
    }

    pub async fn locate(&self) -> CurrentLocationState {
        self.current.run().await
    }

    pub async fn resolve(&self, coords: Coordinates) -> Result<Option<Place>, LookupError> {
        self.resolver.resolve(coords).await
    }

    pub async fn weather(&self, coords: Coordinates) -> Result<WeatherReport, LookupError> {
        self.weather.current(coords).await
    }

    pub async fn forecast(&self, coords: Coordinates) -> Result<Forecast, LookupError> {
        self.weather.forecast(coords).await
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }
}

//! Location resolution for Climate
//!
//! Resolves free-text queries, device position and remembered places into
//! canonical places, and feeds their coordinates to weather lookups while
//! keeping network traffic to one request per distinct key.

pub mod cache;
pub mod current;
pub mod error;
pub mod favorites;
pub mod geocode;
pub mod history;
pub mod location;
pub mod merge;
pub mod notify;
pub mod provider;
pub mod search;
pub mod service;
pub mod store;
pub mod types;
pub mod weather;

pub use cache::{CacheEntry, EntryStatus, QueryCache, QueryOptions, QueryResult, QueryStatus};
pub use current::{CurrentLocation, CurrentLocationState};
pub use error::{ErrorKind, LocationError, LookupError};
pub use favorites::FavoritesStore;
pub use geocode::{Geocoder, LocationResolver};
pub use history::HistoryStore;
pub use location::{
    CoordinateProvider, FixedPosition, IpPositionSource, NoPosition, PositionOptions,
    PositionSource,
};
pub use merge::{merge, MergedList, Row, Section, SectionKind, SuggestionState};
pub use notify::ChangeNotifier;
pub use provider::{OpenWeatherClient, WeatherSource};
pub use search::{LocationSearch, SearchOptions, SearchOutcome, SearchSnapshot};
pub use service::{LocationService, ServiceDeps};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use types::*;
pub use weather::WeatherFeed;

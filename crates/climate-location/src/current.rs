//! "Use my location": device position, then reverse geocode, then weather.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{ErrorKind, LocationError, LookupError};
use crate::geocode::LocationResolver;
use crate::location::CoordinateProvider;
use crate::types::{Coordinates, Place, WeatherReport};
use crate::weather::WeatherFeed;

#[derive(Debug, Clone, PartialEq)]
pub enum CurrentLocationState {
    Idle,
    Locating,
    Resolving {
        coords: Coordinates,
    },
    FetchingWeather {
        coords: Coordinates,
        place: Option<Place>,
    },
    Ready {
        coords: Coordinates,
        /// `None` when reverse geocoding found nothing or failed
        place: Option<Place>,
        place_error: Option<ErrorKind>,
        weather: WeatherReport,
    },
    /// The device position could not be obtained; weather was not requested
    LocationFailed(LocationError),
    WeatherFailed {
        coords: Coordinates,
        place: Option<Place>,
        error: LookupError,
    },
}

impl CurrentLocationState {
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Locating | Self::Resolving { .. } | Self::FetchingWeather { .. }
        )
    }

    /// Message for a failed state, one per error kind.
    pub fn error_message(&self) -> Option<&'static str> {
        match self {
            Self::LocationFailed(err) => Some(err.user_message()),
            Self::WeatherFailed { error, .. } => Some(error.user_message()),
            _ => None,
        }
    }
}

/// Runs the current-location flow and publishes each step. Starting a new run
/// silences any run still in progress.
pub struct CurrentLocation {
    provider: Arc<CoordinateProvider>,
    resolver: Arc<LocationResolver>,
    weather: Arc<WeatherFeed>,
    state: watch::Sender<CurrentLocationState>,
    generation: AtomicU64,
}

impl CurrentLocation {
    pub fn new(
        provider: Arc<CoordinateProvider>,
        resolver: Arc<LocationResolver>,
        weather: Arc<WeatherFeed>,
    ) -> Self {
        let (state, _rx) = watch::channel(CurrentLocationState::Idle);
        Self {
            provider,
            resolver,
            weather,
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CurrentLocationState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> CurrentLocationState {
        self.state.borrow().clone()
    }

    /// Run the whole flow. Returns the state this run reached; it is only
    /// published if no newer run has started since.
    pub async fn run(&self) -> CurrentLocationState {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(generation, CurrentLocationState::Locating);

        let coords = match self.provider.request_current_position().await {
            Ok(coords) => coords,
            Err(err) => {
                let state = CurrentLocationState::LocationFailed(err);
                self.publish(generation, state.clone());
                return state;
            }
        };

        let state = CurrentLocationState::Resolving { coords };
        if !self.publish(generation, state.clone()) {
            return state;
        }

        let (place, place_error) = match self.resolver.resolve(coords).await {
            Ok(place) => (place, None),
            Err(err) => {
                // Weather is keyed by coordinates, so a missing name is not fatal.
                tracing::warn!("Reverse geocode failed for {}: {}", coords, err);
                (None, Some(err.kind()))
            }
        };

        let state = CurrentLocationState::FetchingWeather {
            coords,
            place: place.clone(),
        };
        if !self.publish(generation, state.clone()) {
            return state;
        }

        let state = match self.weather.current(coords).await {
            Ok(weather) => CurrentLocationState::Ready {
                coords,
                place,
                place_error,
                weather,
            },
            Err(error) => CurrentLocationState::WeatherFailed {
                coords,
                place,
                error,
            },
        };
        self.publish(generation, state.clone());
        state
    }

    fn publish(&self, generation: u64, state: CurrentLocationState) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("Dropping update from superseded location run");
            return false;
        }
        self.state.send_replace(state);
        true
    }
}

//! Forward geocoding for typed text: normalization, length gate, debounce,
//! and caching.

use std::sync::Arc;
use std::time::Duration;

use climate_core::LocationConfig;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::cache::{QueryCache, QueryOptions, QueryStatus};
use crate::error::LookupError;
use crate::geocode::Geocoder;
use crate::notify::ChangeNotifier;
use crate::types::Place;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub min_len: usize,
    pub limit: usize,
    pub debounce: Duration,
    pub ttl: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_len: 3,
            limit: 5,
            debounce: Duration::from_millis(300),
            ttl: Duration::from_secs(300),
        }
    }
}

impl From<&LocationConfig> for SearchOptions {
    fn from(config: &LocationConfig) -> Self {
        Self {
            min_len: config.search_min_len,
            limit: config.search_limit,
            debounce: config.search_debounce(),
            ttl: config.cache_ttl(),
        }
    }
}

/// Outcome of one search call.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Input shorter than the minimum; nothing was requested
    TooShort,
    /// A newer keystroke arrived during the quiet window
    Superseded,
    Results(Vec<Place>),
    /// The lookup worked and found nothing
    NoMatches,
    /// The lookup itself failed
    Unavailable(LookupError),
}

/// What the search section should show for the current text right now.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchSnapshot {
    NotEligible,
    /// Waiting for results; carries the last known results for this text
    Loading(Vec<Place>),
    Results(Vec<Place>),
    Failed(LookupError),
}

/// Cache key for typed text.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Timer-based coalescing: each call cancels the one before it, and only a
/// call that sees a full quiet window goes through.
pub struct Debouncer {
    window: Duration,
    pending: Mutex<Option<CancellationToken>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
        }
    }

    /// Wait out the quiet window. Returns `false` if a newer call arrived.
    pub async fn settle(&self) -> bool {
        let token = self.restart();
        tokio::select! {
            () = token.cancelled() => false,
            () = tokio::time::sleep(self.window) => true,
        }
    }

    /// Cancel whatever is waiting without starting a new wait.
    pub fn cancel(&self) {
        if let Some(previous) = self.pending.lock().take() {
            previous.cancel();
        }
    }

    fn restart(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.pending.lock().replace(token.clone()) {
            previous.cancel();
        }
        token
    }
}

pub struct LocationSearch {
    geocoder: Arc<dyn Geocoder>,
    cache: QueryCache<String, Vec<Place>>,
    debouncer: Debouncer,
    options: SearchOptions,
}

impl LocationSearch {
    pub fn new(geocoder: Arc<dyn Geocoder>, options: SearchOptions, notifier: ChangeNotifier) -> Self {
        Self {
            geocoder,
            cache: QueryCache::with_notifier("location-search", notifier),
            debouncer: Debouncer::new(options.debounce),
            options,
        }
    }

    pub fn options(&self) -> SearchOptions {
        self.options
    }

    pub fn is_eligible(&self, text: &str) -> bool {
        normalize_query(text).chars().count() >= self.options.min_len
    }

    /// Search immediately, skipping the debounce window.
    pub async fn search(&self, text: &str) -> SearchOutcome {
        if !self.is_eligible(text) {
            return SearchOutcome::TooShort;
        }

        let geocoder = Arc::clone(&self.geocoder);
        let limit = self.options.limit;
        let query = text.trim().to_string();
        let result = self
            .cache
            .get(normalize_query(text), QueryOptions::new(self.options.ttl), move || {
                let request = geocoder.search(query, limit);
                async move {
                    // Zero results is an answer, not a failure.
                    let mut places = match request.await {
                        Err(LookupError::NotFound) => Vec::new(),
                        other => other?,
                    };
                    places.truncate(limit);
                    Ok::<_, LookupError>(places)
                }
                .boxed()
            })
            .await;

        match result.into_result() {
            Ok(Some(places)) if places.is_empty() => SearchOutcome::NoMatches,
            Ok(Some(places)) => SearchOutcome::Results(places),
            Ok(None) | Err(LookupError::NotFound) => SearchOutcome::NoMatches,
            Err(err) => SearchOutcome::Unavailable(err),
        }
    }

    /// Search once the text has been stable for the debounce window.
    ///
    /// Short input cancels any pending search and returns `TooShort` right away.
    pub async fn search_debounced(&self, text: &str) -> SearchOutcome {
        if !self.is_eligible(text) {
            self.debouncer.cancel();
            return SearchOutcome::TooShort;
        }

        if !self.debouncer.settle().await {
            tracing::debug!("Search for '{}' superseded by newer input", text.trim());
            return SearchOutcome::Superseded;
        }

        self.search(text).await
    }

    /// Drop any search still waiting out its debounce window.
    pub fn cancel_pending(&self) {
        self.debouncer.cancel();
    }

    /// Current state for `text` without issuing any request.
    pub fn snapshot(&self, text: &str) -> SearchSnapshot {
        if !self.is_eligible(text) {
            return SearchSnapshot::NotEligible;
        }

        let state = self.cache.peek(&normalize_query(text));
        match state.status {
            QueryStatus::Success => SearchSnapshot::Results(state.value.unwrap_or_default()),
            QueryStatus::Error if state.error == Some(LookupError::NotFound) => {
                SearchSnapshot::Results(Vec::new())
            }
            QueryStatus::Error => SearchSnapshot::Failed(
                state
                    .error
                    .unwrap_or_else(|| LookupError::Unknown("search failed".into())),
            ),
            // Eligible but not requested yet means a debounce window is running.
            QueryStatus::Idle | QueryStatus::Loading => {
                SearchSnapshot::Loading(state.value.unwrap_or_default())
            }
        }
    }
}

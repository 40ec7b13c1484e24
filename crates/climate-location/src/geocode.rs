//! Reverse geocoding: coordinates to a human-readable place, through the
//! query cache.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::cache::{QueryCache, QueryOptions, QueryResult};
use crate::error::LookupError;
use crate::notify::ChangeNotifier;
use crate::types::{CoordKey, Coordinates, Place};

/// Forward and reverse geocoding backend.
///
/// Futures are `'static` because the cache drives them on their own task.
pub trait Geocoder: Send + Sync {
    /// Candidates for free text, most relevant first.
    fn search(&self, query: String, limit: usize)
        -> BoxFuture<'static, Result<Vec<Place>, LookupError>>;

    /// The place at `coords`, or `None` when nothing is known there.
    fn reverse(&self, coords: Coordinates) -> BoxFuture<'static, Result<Option<Place>, LookupError>>;
}

pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
    cache: QueryCache<CoordKey, Option<Place>>,
    ttl: Duration,
}

impl LocationResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, ttl: Duration, notifier: ChangeNotifier) -> Self {
        Self {
            geocoder,
            cache: QueryCache::with_notifier("reverse-geocode", notifier),
            ttl,
        }
    }

    /// Resolve `coords`. `Ok(None)` means the lookup worked but found nothing.
    pub async fn resolve(&self, coords: Coordinates) -> Result<Option<Place>, LookupError> {
        let geocoder = Arc::clone(&self.geocoder);
        self.cache
            .get(coords.key(), QueryOptions::new(self.ttl), move || {
                let request = geocoder.reverse(coords);
                async move {
                    match request.await {
                        Err(LookupError::NotFound) => Ok(None),
                        other => other,
                    }
                }
                .boxed()
            })
            .await
            .into_result()
            .map(Option::flatten)
    }

    pub fn peek(&self, coords: Coordinates) -> QueryResult<Option<Place>> {
        self.cache.peek(&coords.key())
    }
}

//! Weather and forecast lookups for resolved coordinates, cached the same way
//! as geocoding.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{QueryCache, QueryOptions, QueryResult};
use crate::error::LookupError;
use crate::notify::ChangeNotifier;
use crate::provider::WeatherSource;
use crate::types::{CoordKey, Coordinates, Forecast, WeatherReport};

pub struct WeatherFeed {
    source: Arc<dyn WeatherSource>,
    current: QueryCache<CoordKey, WeatherReport>,
    forecast: QueryCache<CoordKey, Forecast>,
    ttl: Duration,
}

impl WeatherFeed {
    pub fn new(source: Arc<dyn WeatherSource>, ttl: Duration, notifier: ChangeNotifier) -> Self {
        Self {
            source,
            current: QueryCache::with_notifier("weather", notifier.clone()),
            forecast: QueryCache::with_notifier("forecast", notifier),
            ttl,
        }
    }

    pub async fn current(&self, coords: Coordinates) -> Result<WeatherReport, LookupError> {
        let source = Arc::clone(&self.source);
        self.current
            .get(coords.key(), QueryOptions::new(self.ttl), move || source.current(coords))
            .await
            .into_result()?
            .ok_or_else(|| LookupError::Unknown("weather request returned nothing".into()))
    }

    pub async fn forecast(&self, coords: Coordinates) -> Result<Forecast, LookupError> {
        let source = Arc::clone(&self.source);
        self.forecast
            .get(coords.key(), QueryOptions::new(self.ttl), move || source.forecast(coords))
            .await
            .into_result()?
            .ok_or_else(|| LookupError::Unknown("forecast request returned nothing".into()))
    }

    /// Force a new current-conditions request, bypassing freshness.
    pub async fn refresh(&self, coords: Coordinates) -> Result<WeatherReport, LookupError> {
        let source = Arc::clone(&self.source);
        self.forecast.invalidate(&coords.key());
        self.current
            .refetch(coords.key(), QueryOptions::new(self.ttl), move || source.current(coords))
            .await
            .into_result()?
            .ok_or_else(|| LookupError::Unknown("weather request returned nothing".into()))
    }

    pub fn peek_current(&self, coords: Coordinates) -> QueryResult<WeatherReport> {
        self.current.peek(&coords.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WeatherCondition;
    use chrono::Utc;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        current_calls: AtomicUsize,
        forecast_calls: AtomicUsize,
    }

    impl WeatherSource for CountingSource {
        fn current(&self, coords: Coordinates) -> BoxFuture<'static, Result<WeatherReport, LookupError>> {
            let n = self.current_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(WeatherReport {
                    coordinates: coords,
                    temperature: 20.0 + n as f64,
                    feels_like: 20.0,
                    temp_min: 18.0,
                    temp_max: 22.0,
                    humidity: 50,
                    wind_speed: 1.0,
                    condition: WeatherCondition::Clear,
                    description: "clear sky".into(),
                    icon: "01d".into(),
                    fetched_at: Utc::now(),
                })
            }
            .boxed()
        }

        fn forecast(&self, coords: Coordinates) -> BoxFuture<'static, Result<Forecast, LookupError>> {
            self.forecast_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(Forecast {
                    coordinates: coords,
                    entries: Vec::new(),
                })
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_keyed_by_coordinates() {
        let source = Arc::new(CountingSource::default());
        let feed = WeatherFeed::new(source.clone(), Duration::from_secs(60), ChangeNotifier::new());

        let here = Coordinates::new(40.71, -74.0);
        feed.current(here).await.unwrap();
        feed.current(Coordinates::new(40.710_000_2, -74.0)).await.unwrap();
        feed.forecast(here).await.unwrap();
        feed.forecast(here).await.unwrap();

        assert_eq!(source.current_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.forecast_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let source = Arc::new(CountingSource::default());
        let feed = WeatherFeed::new(source.clone(), Duration::from_secs(60), ChangeNotifier::new());

        let here = Coordinates::new(40.71, -74.0);
        let first = feed.current(here).await.unwrap();
        let second = feed.refresh(here).await.unwrap();

        assert!(second.temperature > first.temperature);
        assert_eq!(source.current_calls.load(Ordering::SeqCst), 2);
        assert!(feed.peek_current(here).is_success());
    }
}

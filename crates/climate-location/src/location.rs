//! Device position: a platform source wrapped with timeout, fix reuse and
//! error classification.

use std::sync::Arc;
use std::time::Duration;

use climate_core::{LocationConfig, ReqwestErrorExt};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;

use crate::error::LocationError;
use crate::types::Coordinates;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Reuse a previous fix younger than this; zero always asks the platform
    pub max_cache_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_millis(5000),
            max_cache_age: Duration::ZERO,
        }
    }
}

impl From<&LocationConfig> for PositionOptions {
    fn from(config: &LocationConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: config.timeout(),
            max_cache_age: config.max_cache_age(),
        }
    }
}

/// Platform capability that reports where the device is.
pub trait PositionSource: Send + Sync {
    fn current_position(
        &self,
        options: PositionOptions,
    ) -> BoxFuture<'_, Result<Coordinates, LocationError>>;
}

/// Coordinate provider used by the rest of the crate.
pub struct CoordinateProvider {
    source: Arc<dyn PositionSource>,
    options: PositionOptions,
    last_fix: Mutex<Option<(Instant, Coordinates)>>,
}

impl CoordinateProvider {
    pub fn new(source: Arc<dyn PositionSource>, options: PositionOptions) -> Self {
        Self {
            source,
            options,
            last_fix: Mutex::new(None),
        }
    }

    pub fn options(&self) -> PositionOptions {
        self.options
    }

    /// Ask for the current position. Every call issues a new platform request
    /// unless a fix younger than `max_cache_age` is on hand.
    pub async fn request_current_position(&self) -> Result<Coordinates, LocationError> {
        if let Some(coords) = self.recent_fix() {
            tracing::debug!("Reusing recent position fix {}", coords);
            return Ok(coords);
        }

        let request = self.source.current_position(self.options);
        let coords = match tokio::time::timeout(self.options.timeout, request).await {
            Ok(Ok(coords)) if coords.is_valid() => coords,
            Ok(Ok(coords)) => {
                tracing::warn!("Platform returned out-of-range position {}", coords);
                return Err(LocationError::Unknown(format!(
                    "invalid coordinates {}",
                    coords
                )));
            }
            Ok(Err(err)) => {
                tracing::warn!("Position request failed: {}", err);
                return Err(err);
            }
            Err(_) => {
                tracing::warn!(
                    "Position request timed out after {:?}",
                    self.options.timeout
                );
                return Err(LocationError::Timeout);
            }
        };

        tracing::info!("Got position: {}", coords);
        *self.last_fix.lock() = Some((Instant::now(), coords));
        Ok(coords)
    }

    fn recent_fix(&self) -> Option<Coordinates> {
        if self.options.max_cache_age.is_zero() {
            return None;
        }
        let guard = self.last_fix.lock();
        let (at, coords) = (*guard)?;
        (at.elapsed() < self.options.max_cache_age).then_some(coords)
    }
}

/// A position that never changes; useful for manual overrides and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Coordinates);

impl PositionSource for FixedPosition {
    fn current_position(
        &self,
        _options: PositionOptions,
    ) -> BoxFuture<'_, Result<Coordinates, LocationError>> {
        let coords = self.0;
        async move { Ok(coords) }.boxed()
    }
}

/// Platform without positioning support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPosition;

impl PositionSource for NoPosition {
    fn current_position(
        &self,
        _options: PositionOptions,
    ) -> BoxFuture<'_, Result<Coordinates, LocationError>> {
        async { Err(LocationError::Unavailable) }.boxed()
    }
}

const IP_LOCATE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct IpLocateResponse {
    /// "lat,lon"
    loc: String,
}

/// Approximate position from the caller's public IP.
#[derive(Debug, Clone)]
pub struct IpPositionSource {
    client: Client,
    url: String,
}

impl IpPositionSource {
    pub fn new(url: impl Into<String>) -> Result<Self, LocationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(IP_LOCATE_TIMEOUT_SECS))
            .build()
            .map_err(|e| LocationError::Unknown(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn locate(&self) -> Result<Coordinates, LocationError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            tracing::debug!("IP locate request failed: {}", e.into_network_error());
            LocationError::Unavailable
        })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LocationError::PermissionDenied);
        }
        if !status.is_success() {
            tracing::debug!("IP locate returned status {}", status);
            return Err(LocationError::Unavailable);
        }

        let body: IpLocateResponse = response
            .json()
            .await
            .map_err(|e| LocationError::Unknown(format!("parse error: {}", e)))?;

        parse_loc(&body.loc)
            .ok_or_else(|| LocationError::Unknown(format!("unexpected position '{}'", body.loc)))
    }
}

impl PositionSource for IpPositionSource {
    fn current_position(
        &self,
        _options: PositionOptions,
    ) -> BoxFuture<'_, Result<Coordinates, LocationError>> {
        self.locate().boxed()
    }
}

fn parse_loc(loc: &str) -> Option<Coordinates> {
    let (lat, lon) = loc.split_once(',')?;
    let coords = Coordinates::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?);
    coords.is_valid().then_some(coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        result: Result<Coordinates, LocationError>,
        calls: AtomicUsize,
    }

    impl PositionSource for Scripted {
        fn current_position(
            &self,
            _options: PositionOptions,
        ) -> BoxFuture<'_, Result<Coordinates, LocationError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self.result.clone();
            async move { result }.boxed()
        }
    }

    struct Hanging;

    impl PositionSource for Hanging {
        fn current_position(
            &self,
            _options: PositionOptions,
        ) -> BoxFuture<'_, Result<Coordinates, LocationError>> {
            futures::future::pending().boxed()
        }
    }

    fn scripted(result: Result<Coordinates, LocationError>) -> Arc<Scripted> {
        Arc::new(Scripted {
            result,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_permission_denied_is_preserved() {
        let provider = CoordinateProvider::new(
            scripted(Err(LocationError::PermissionDenied)),
            PositionOptions::default(),
        );
        assert_eq!(
            provider.request_current_position().await,
            Err(LocationError::PermissionDenied)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_platform_times_out() {
        let provider = CoordinateProvider::new(Arc::new(Hanging), PositionOptions::default());
        assert_eq!(
            provider.request_current_position().await,
            Err(LocationError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_each_call_asks_again_without_cache_age() {
        let source = scripted(Ok(Coordinates::new(59.33, 18.07)));
        let provider = CoordinateProvider::new(source.clone(), PositionOptions::default());

        provider.request_current_position().await.unwrap();
        provider.request_current_position().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_fix_is_reused() {
        let source = scripted(Ok(Coordinates::new(59.33, 18.07)));
        let options = PositionOptions {
            max_cache_age: Duration::from_secs(30),
            ..PositionOptions::default()
        };
        let provider = CoordinateProvider::new(source.clone(), options);

        provider.request_current_position().await.unwrap();
        provider.request_current_position().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        provider.request_current_position().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_position_is_rejected() {
        let provider = CoordinateProvider::new(
            scripted(Ok(Coordinates::new(120.0, 0.0))),
            PositionOptions::default(),
        );
        assert!(matches!(
            provider.request_current_position().await,
            Err(LocationError::Unknown(_))
        ));
    }

    #[tokio::test]
    async fn test_no_position_is_unavailable() {
        let provider = CoordinateProvider::new(Arc::new(NoPosition), PositionOptions::default());
        assert_eq!(
            provider.request_current_position().await,
            Err(LocationError::Unavailable)
        );
    }

    #[test]
    fn test_parse_loc() {
        let coords = parse_loc("12.9719,77.5937").unwrap();
        assert!((coords.lat - 12.9719).abs() < 1e-9);
        assert!(parse_loc("12.9").is_none());
        assert!(parse_loc("abc,def").is_none());
        assert!(parse_loc("95.0,0.0").is_none());
    }
}

//! OpenWeather client: geocoding plus current conditions and forecast.
//!
//! Readings come back in Kelvin and are converted to Celsius here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use climate_core::{ApiConfig, ReqwestErrorExt};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::instrument;

use crate::error::LookupError;
use crate::geocode::Geocoder;
use crate::types::{
    kelvin_to_celsius, Coordinates, Forecast, ForecastEntry, Place, WeatherCondition,
    WeatherReport,
};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("climate/", env!("CARGO_PKG_VERSION"));

/// Downstream weather lookups keyed by resolved coordinates.
pub trait WeatherSource: Send + Sync {
    fn current(&self, coords: Coordinates) -> BoxFuture<'static, Result<WeatherReport, LookupError>>;
    fn forecast(&self, coords: Coordinates) -> BoxFuture<'static, Result<Forecast, LookupError>>;
}

#[derive(Debug, Deserialize)]
struct GeoResult {
    name: String,
    lat: f64,
    lon: f64,
    country: String,
    state: Option<String>,
}

impl From<GeoResult> for Place {
    fn from(geo: GeoResult) -> Self {
        Place {
            name: geo.name,
            country: geo.country,
            state: geo.state,
            lat: geo.lat,
            lon: geo.lon,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    id: i32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    icon: String,
}

#[derive(Debug, Deserialize)]
struct ApiMain {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize, Default)]
struct ApiWind {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    weather: Vec<ApiCondition>,
    main: ApiMain,
    #[serde(default)]
    wind: ApiWind,
    dt: i64,
}

#[derive(Debug, Deserialize)]
struct ForecastSlot {
    dt: i64,
    main: ApiMain,
    weather: Vec<ApiCondition>,
    /// Probability of precipitation, 0.0 to 1.0
    #[serde(default)]
    pop: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastSlot>,
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

fn report_from(coords: Coordinates, body: CurrentResponse) -> WeatherReport {
    let (condition, description, icon) = match body.weather.into_iter().next() {
        Some(c) => (WeatherCondition::from_condition_id(c.id), c.description, c.icon),
        None => (WeatherCondition::default(), String::new(), String::new()),
    };

    WeatherReport {
        coordinates: coords,
        temperature: kelvin_to_celsius(body.main.temp),
        feels_like: kelvin_to_celsius(body.main.feels_like),
        temp_min: kelvin_to_celsius(body.main.temp_min),
        temp_max: kelvin_to_celsius(body.main.temp_max),
        humidity: body.main.humidity,
        wind_speed: body.wind.speed,
        condition,
        description,
        icon,
        fetched_at: timestamp(body.dt),
    }
}

fn forecast_from(coords: Coordinates, body: ForecastResponse) -> Forecast {
    let entries = body
        .list
        .into_iter()
        .map(|slot| ForecastEntry {
            time: timestamp(slot.dt),
            temperature: kelvin_to_celsius(slot.main.temp),
            condition: slot
                .weather
                .first()
                .map(|c| WeatherCondition::from_condition_id(c.id))
                .unwrap_or_default(),
            precipitation_chance: (slot.pop.clamp(0.0, 1.0) * 100.0).round() as u8,
        })
        .collect();

    Forecast {
        coordinates: coords,
        entries,
    }
}

/// HTTP client for the OpenWeather geocoding and weather APIs.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LookupError::Unknown(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build from config. Fails with `Auth` when no key is configured.
    pub fn from_config(config: &ApiConfig) -> Result<Self, LookupError> {
        let api_key = config.resolved_api_key().ok_or(LookupError::Auth)?;
        Self::new(&config.base_url, &api_key)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn search_places(&self, query: &str, limit: usize) -> Result<Vec<Place>, LookupError> {
        let limit = limit.to_string();
        let results: Vec<GeoResult> = self
            .get_json("/geo/1.0/direct", &[("q", query), ("limit", &limit)])
            .await?;
        Ok(results.into_iter().map(Place::from).collect())
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn reverse_geocode(&self, coords: Coordinates) -> Result<Option<Place>, LookupError> {
        let (lat, lon) = (coords.lat.to_string(), coords.lon.to_string());
        let results: Vec<GeoResult> = self
            .get_json("/geo/1.0/reverse", &[("lat", &lat), ("lon", &lon), ("limit", "1")])
            .await?;
        Ok(results.into_iter().next().map(Place::from))
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn current_weather(&self, coords: Coordinates) -> Result<WeatherReport, LookupError> {
        let (lat, lon) = (coords.lat.to_string(), coords.lon.to_string());
        let body: CurrentResponse = self
            .get_json("/data/2.5/weather", &[("lat", &lat), ("lon", &lon)])
            .await?;
        Ok(report_from(coords, body))
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn forecast_weather(&self, coords: Coordinates) -> Result<Forecast, LookupError> {
        let (lat, lon) = (coords.lat.to_string(), coords.lon.to_string());
        let body: ForecastResponse = self
            .get_json("/data/2.5/forecast", &[("lat", &lat), ("lon", &lon)])
            .await?;
        Ok(forecast_from(coords, body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, LookupError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| LookupError::from(e.into_network_error()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} returned status {}", path, status);
            return Err(LookupError::from_status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| LookupError::Unknown(format!("JSON parse error: {}", e)))
    }
}

impl Geocoder for OpenWeatherClient {
    fn search(&self, query: String, limit: usize) -> BoxFuture<'static, Result<Vec<Place>, LookupError>> {
        let client = self.clone();
        async move { client.search_places(&query, limit).await }.boxed()
    }

    fn reverse(&self, coords: Coordinates) -> BoxFuture<'static, Result<Option<Place>, LookupError>> {
        let client = self.clone();
        async move { client.reverse_geocode(coords).await }.boxed()
    }
}

impl WeatherSource for OpenWeatherClient {
    fn current(&self, coords: Coordinates) -> BoxFuture<'static, Result<WeatherReport, LookupError>> {
        let client = self.clone();
        async move { client.current_weather(coords).await }.boxed()
    }

    fn forecast(&self, coords: Coordinates) -> BoxFuture<'static, Result<Forecast, LookupError>> {
        let client = self.clone();
        async move { client.forecast_weather(coords).await }.boxed()
    }
}

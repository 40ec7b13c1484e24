use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Coordinates are compared at this many steps per degree (~0.1m).
const COORD_SCALE: f64 = 1_000_000.0;

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Hashable identity used for cache keys and de-duplication.
    pub fn key(&self) -> CoordKey {
        CoordKey {
            lat: (self.lat * COORD_SCALE).round() as i64,
            lon: (self.lon * COORD_SCALE).round() as i64,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// Value identity of a coordinate pair, in micro-degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoordKey {
    lat: i64,
    lon: i64,
}

impl fmt::Display for CoordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lat, self.lon)
    }
}

/// A named place produced by geocoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl Place {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }

    pub fn key(&self) -> CoordKey {
        self.coordinates().key()
    }

    /// "Name, State" when a state is known, otherwise just the name.
    pub fn label(&self) -> String {
        match self.state.as_deref().filter(|s| !s.is_empty() && *s != self.name) {
            Some(state) => format!("{}, {}", self.name, state),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.label(), self.country)
    }
}

/// A past selection, most recent first in the history list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub place: Place,
    /// Text the user typed when the place was picked
    #[serde(default)]
    pub query: String,
    pub searched_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(place: Place, query: impl Into<String>, searched_at: DateTime<Utc>) -> Self {
        Self {
            place,
            query: query.into(),
            searched_at,
        }
    }

    pub fn key(&self) -> CoordKey {
        self.place.key()
    }
}

/// A pinned place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteEntry {
    pub id: String,
    #[serde(flatten)]
    pub place: Place,
    pub added_at: DateTime<Utc>,
}

impl FavoriteEntry {
    /// Id derived from the coordinate pair, used when no external id exists.
    pub fn derived_id(place: &Place) -> String {
        format!("{}-{}", place.lat, place.lon)
    }

    pub fn key(&self) -> CoordKey {
        self.place.key()
    }
}

/// Weather condition categories mapped from OpenWeather condition ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_condition_id(id: i32) -> Self {
        match id {
            200..=232 => Self::Thunderstorm,
            300..=321 => Self::Drizzle,
            502..=504 | 522 | 531 => Self::HeavyRain,
            511 => Self::Sleet, // Freezing rain
            500..=599 => Self::Rain,
            611..=616 => Self::Sleet,
            600..=699 => Self::Snow,
            701..=781 => Self::Fog,
            800 => Self::Clear,
            801 | 802 => Self::PartlyCloudy,
            803 | 804 => Self::Cloudy,
            _ => Self::Clear,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }
}

/// Convert the API's Kelvin readings for display.
pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - 273.15
}

/// Current conditions at a coordinate pair. Temperatures are in Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub coordinates: Coordinates,
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub condition: WeatherCondition,
    /// Provider text, e.g. "scattered clouds"
    pub description: String,
    pub icon: String,
    pub fetched_at: DateTime<Utc>,
}

/// One three-hourly forecast slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEntry {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub condition: WeatherCondition,
    pub precipitation_chance: u8,
}

/// Daily summary derived from forecast slots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayForecast {
    pub date: NaiveDate,
    pub high: f64,
    pub low: f64,
    pub condition: WeatherCondition,
    pub precipitation_chance: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub coordinates: Coordinates,
    pub entries: Vec<ForecastEntry>,
}

impl Forecast {
    /// Group slots by UTC date. The condition of the first slot of the day wins.
    pub fn daily(&self) -> Vec<DayForecast> {
        let mut days: Vec<DayForecast> = Vec::new();
        for entry in &self.entries {
            let date = entry.time.date_naive();
            match days.last_mut() {
                Some(day) if day.date == date => {
                    day.high = day.high.max(entry.temperature);
                    day.low = day.low.min(entry.temperature);
                    day.precipitation_chance =
                        day.precipitation_chance.max(entry.precipitation_chance);
                }
                _ => days.push(DayForecast {
                    date,
                    high: entry.temperature,
                    low: entry.temperature,
                    condition: entry.condition,
                    precipitation_chance: entry.precipitation_chance,
                }),
            }
        }
        days
    }
}

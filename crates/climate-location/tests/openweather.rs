//! Integration tests for the OpenWeather client and IP position source using wiremock.

use std::sync::Arc;
use std::time::Duration;

use climate_location::{
    ChangeNotifier, Coordinates, Geocoder, IpPositionSource, LocationError, LocationResolver,
    LocationSearch, LookupError, OpenWeatherClient, PositionOptions, PositionSource, SearchOptions,
    SearchOutcome, WeatherCondition, WeatherSource,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn geo_result(name: &str, country: &str, state: Option<&str>, lat: f64, lon: f64) -> serde_json::Value {
    let mut value = serde_json::json!({
        "name": name,
        "local_names": { "en": name },
        "lat": lat,
        "lon": lon,
        "country": country
    });
    if let Some(state) = state {
        value["state"] = serde_json::Value::String(state.to_string());
    }
    value
}

fn client(server: &MockServer) -> OpenWeatherClient {
    OpenWeatherClient::new(&server.uri(), "test-key").unwrap()
}

#[tokio::test]
async fn test_search_returns_places() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .and(query_param("q", "Bengaluru"))
        .and(query_param("limit", "5"))
        .and(query_param("appid", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            geo_result("Bengaluru", "IN", Some("Karnataka"), 12.97, 77.59)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let places = client(&mock_server)
        .search("Bengaluru".to_string(), 5)
        .await
        .unwrap();

    assert_eq!(places.len(), 1);
    assert_eq!(places[0].name, "Bengaluru");
    assert_eq!(places[0].country, "IN");
    assert_eq!(places[0].state.as_deref(), Some("Karnataka"));
    assert!((places[0].lat - 12.97).abs() < 1e-9);
}

#[tokio::test]
async fn test_search_empty_is_not_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&mock_server)
        .await;

    let places = client(&mock_server).search("Xyzzy".to_string(), 5).await.unwrap();
    assert!(places.is_empty());
}

#[tokio::test]
async fn test_status_codes_are_classified() {
    let cases = [
        (401, LookupError::Auth),
        (403, LookupError::Auth),
        (429, LookupError::RateLimited),
        (404, LookupError::NotFound),
    ];

    for (status, expected) in cases {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&mock_server)
            .await;

        let err = client(&mock_server)
            .search("Berlin".to_string(), 5)
            .await
            .unwrap_err();
        assert_eq!(err, expected, "status {}", status);
    }
}

#[tokio::test]
async fn test_server_error_is_network() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .current(Coordinates::new(52.52, 13.405))
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::Network(_)));
}

#[tokio::test]
async fn test_reverse_geocode_takes_first_result() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/1.0/reverse"))
        .and(query_param("lat", "51.5073"))
        .and(query_param("lon", "-0.1276"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            geo_result("London", "GB", Some("England"), 51.5073, -0.1276)
        ])))
        .mount(&mock_server)
        .await;

    let place = client(&mock_server)
        .reverse(Coordinates::new(51.5073, -0.1276))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(place.label(), "London, England");
}

#[tokio::test]
async fn test_reverse_geocode_nothing_there() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/1.0/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&mock_server)
        .await;

    let place = client(&mock_server)
        .reverse(Coordinates::new(0.0, -160.0))
        .await
        .unwrap();
    assert!(place.is_none());
}

#[tokio::test]
async fn test_current_weather() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("lat", "12.97"))
        .and(query_param("lon", "77.59"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "coord": { "lon": 77.59, "lat": 12.97 },
            "weather": [{ "id": 500, "main": "Rain", "description": "light rain", "icon": "10d" }],
            "main": {
                "temp": 295.15,
                "feels_like": 295.65,
                "temp_min": 294.15,
                "temp_max": 296.15,
                "pressure": 1010,
                "humidity": 88
            },
            "wind": { "speed": 4.1, "deg": 250 },
            "dt": 1_767_225_600,
            "sys": { "country": "IN" },
            "name": "Bengaluru"
        })))
        .mount(&mock_server)
        .await;

    let report = client(&mock_server)
        .current(Coordinates::new(12.97, 77.59))
        .await
        .unwrap();

    assert!((report.temperature - 22.0).abs() < 1e-9);
    assert_eq!(report.condition, WeatherCondition::Rain);
    assert_eq!(report.humidity, 88);
    assert_eq!(report.icon, "10d");
}

#[tokio::test]
async fn test_forecast() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "cnt": 2,
            "list": [
                {
                    "dt": 1_767_225_600,
                    "main": { "temp": 280.15, "feels_like": 278.0, "temp_min": 279.0, "temp_max": 281.0, "humidity": 90 },
                    "weather": [{ "id": 601, "description": "snow", "icon": "13d" }],
                    "pop": 0.8
                },
                {
                    "dt": 1_767_236_400,
                    "main": { "temp": 282.15, "feels_like": 280.0, "temp_min": 281.0, "temp_max": 283.0, "humidity": 85 },
                    "weather": [{ "id": 804, "description": "overcast clouds", "icon": "04d" }],
                    "pop": 0.1
                }
            ]
        })))
        .mount(&mock_server)
        .await;

    let forecast = client(&mock_server)
        .forecast(Coordinates::new(59.91, 10.75))
        .await
        .unwrap();

    assert_eq!(forecast.entries.len(), 2);
    assert_eq!(forecast.entries[0].condition, WeatherCondition::Snow);
    assert_eq!(forecast.entries[0].precipitation_chance, 80);
    let days = forecast.daily();
    assert_eq!(days.len(), 1);
    assert!((days[0].high - 9.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_not_found_status_means_no_matches() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/geo/1.0/reverse"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = Arc::new(client(&mock_server));
    let search = LocationSearch::new(client.clone(), SearchOptions::default(), ChangeNotifier::new());
    assert_eq!(search.search("Atlantis").await, SearchOutcome::NoMatches);

    let resolver = LocationResolver::new(client, Duration::from_secs(60), ChangeNotifier::new());
    assert_eq!(resolver.resolve(Coordinates::new(-48.87, -123.39)).await, Ok(None));
}

#[tokio::test]
async fn test_search_through_cache_hits_network_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            geo_result("Berlin", "DE", Some("Land Berlin"), 52.52, 13.405),
            geo_result("Berlin", "US", Some("New Hampshire"), 44.47, -71.18)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let search = LocationSearch::new(
        Arc::new(client(&mock_server)),
        SearchOptions {
            debounce: Duration::from_millis(10),
            ..SearchOptions::default()
        },
        ChangeNotifier::new(),
    );

    let (a, b) = tokio::join!(search.search("Berlin"), search.search("  berlin "));
    assert_eq!(a, b);
    assert!(matches!(a, SearchOutcome::Results(ref places) if places.len() == 2));
    assert_eq!(search.search("ab").await, SearchOutcome::TooShort);
}

#[tokio::test]
async fn test_ip_position_source() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ip": "203.0.113.7",
            "city": "Bengaluru",
            "region": "Karnataka",
            "country": "IN",
            "loc": "12.9719,77.5937"
        })))
        .mount(&mock_server)
        .await;

    let source = IpPositionSource::new(format!("{}/json", mock_server.uri())).unwrap();
    let coords = source
        .current_position(PositionOptions::default())
        .await
        .unwrap();
    assert!((coords.lat - 12.9719).abs() < 1e-9);
    assert!((coords.lon - 77.5937).abs() < 1e-9);
}

#[tokio::test]
async fn test_ip_position_source_forbidden() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/json"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let source = IpPositionSource::new(format!("{}/json", mock_server.uri())).unwrap();
    let err = source
        .current_position(PositionOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, LocationError::PermissionDenied);
}

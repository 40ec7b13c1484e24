use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use climate_core::Config;
use climate_location::{
    CurrentLocationState, FileStore, IpPositionSource, LocationService, OpenWeatherClient,
    SearchOutcome, ServiceDeps, WeatherReport,
};

/// Climate - find a place and check its weather
#[derive(Parser)]
#[command(name = "climate", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search places by name
    Search {
        /// Free text, at least three characters
        text: String,

        /// Pick the Nth result (1-based), record it and show its weather
        #[arg(long)]
        pick: Option<usize>,
    },
    /// Weather at the current position
    Here,
    /// Recent selections
    History {
        /// Forget all recent selections
        #[arg(long)]
        clear: bool,
    },
    /// Pinned places
    Favorites {
        #[command(subcommand)]
        action: Option<FavoritesAction>,
    },
}

#[derive(Subcommand)]
enum FavoritesAction {
    /// Pin the first search result for TEXT
    Add { text: String },
    /// Unpin by id
    Remove { id: String },
    List,
}

fn print_weather(label: &str, report: &WeatherReport) {
    println!("{}", label);
    println!(
        "  {:.1}°C (feels like {:.1}°C), {}",
        report.temperature, report.feels_like, report.description
    );
    println!(
        "  low {:.1}°C / high {:.1}°C, humidity {}%, wind {:.1} m/s",
        report.temp_min, report.temp_max, report.humidity, report.wind_speed
    );
}

async fn run(service: &LocationService, command: Command) -> Result<()> {
    match command {
        Command::Search { text, pick } => {
            let places = match service.search(&text).await {
                SearchOutcome::Results(places) => places,
                SearchOutcome::TooShort => bail!("Type at least three characters to search"),
                SearchOutcome::NoMatches => {
                    println!("No matches for '{}'", text.trim());
                    return Ok(());
                }
                SearchOutcome::Superseded => bail!("Search was interrupted by newer input"),
                SearchOutcome::Unavailable(err) => bail!("Search unavailable: {}", err.user_message()),
            };

            let Some(n) = pick else {
                for (i, place) in places.iter().enumerate() {
                    println!("{:>2}. {} ({})", i + 1, place, place.coordinates());
                }
                return Ok(());
            };

            let place = places
                .get(n.saturating_sub(1))
                .cloned()
                .with_context(|| format!("No result number {}", n))?;
            service.select(place.clone(), &text);
            let report = service.weather(place.coordinates()).await?;
            print_weather(&place.to_string(), &report);
        }
        Command::Here => match service.locate().await {
            CurrentLocationState::Ready {
                coords,
                place,
                weather,
                ..
            } => {
                let label = place.map_or_else(|| coords.to_string(), |p| p.to_string());
                print_weather(&label, &weather);
            }
            state => {
                let message = state.error_message().unwrap_or("Location lookup did not finish");
                bail!("{}", message);
            }
        },
        Command::History { clear } => {
            if clear {
                service.history().clear();
                println!("History cleared");
                return Ok(());
            }
            for entry in service.history().list() {
                println!(
                    "{}  {}  (searched \"{}\")",
                    entry.searched_at.format("%Y-%m-%d %H:%M"),
                    entry.place,
                    entry.query
                );
            }
        }
        Command::Favorites { action } => match action.unwrap_or(FavoritesAction::List) {
            FavoritesAction::Add { text } => {
                let place = match service.search(&text).await {
                    SearchOutcome::Results(places) => places.into_iter().next(),
                    SearchOutcome::Unavailable(err) => {
                        bail!("Search unavailable: {}", err.user_message())
                    }
                    _ => None,
                };
                let place = place.with_context(|| format!("No place found for '{}'", text))?;
                if service.favorites().add(place.clone()) {
                    println!("Pinned {}", place);
                } else {
                    println!("{} is already pinned", place);
                }
            }
            FavoritesAction::Remove { id } => {
                if !service.favorites().remove(&id) {
                    bail!("No favorite with id '{}'", id);
                }
                println!("Removed {}", id);
            }
            FavoritesAction::List => {
                for favorite in service.favorites().list() {
                    println!("{:<24} {}", favorite.id, favorite.place);
                }
            }
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    climate_core::init()?;

    let (config, _) = Config::load_validated()?;

    // A missing key was already reported by validation; lookups answer `Auth`.
    let api_key = config.api.resolved_api_key().unwrap_or_default();
    let client = Arc::new(OpenWeatherClient::new(&config.api.base_url, &api_key)?);
    let position = IpPositionSource::new(config.api.ip_locate_url.clone())?;

    let service = LocationService::new(
        &config.location,
        ServiceDeps {
            store: Arc::new(FileStore::new(config.store_dir())),
            geocoder: client.clone(),
            weather: client,
            position: Arc::new(position),
        },
    );
    service.initialize();

    let result = run(&service, cli.command).await;

    // Graceful shutdown
    service.shutdown()?;
    result
}

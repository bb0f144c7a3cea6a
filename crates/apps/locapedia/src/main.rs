//! Headless driver: boots the engine against live Wikipedia and Nominatim,
//! replays the requested interactions and prints the final snapshot as JSON.

mod device;
mod http;
mod nominatim;
mod wikipedia;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use catalog::{InMemoryLocationStore, JsonFileLocationStore, LocationStore};
use clap::Parser;
use engine::{Command, Engine, EngineConfig, EngineEvent, Ports, Snapshot};
use foundation::math::viewport_bounds;
use foundation::LatLon;
use runtime::Latency;
use scene::{MemoryNavigation, NavigationPort, OpenContext, UrlNavigation};
use serde::Serialize;
use streaming::ViewportSettled;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::device::CliDevice;
use crate::nominatim::NominatimGeocoder;
use crate::wikipedia::WikipediaSource;

#[derive(Debug, Parser)]
#[command(name = "locapedia", about = "Browse Wikipedia articles around a place")]
struct Args {
    /// Settle the viewport here after start-up.
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
    #[arg(long)]
    zoom: Option<u8>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,

    /// Shareable link; its `location` parameter names an article to open.
    #[arg(long)]
    link: Option<String>,
    /// Type this into the search box and report the suggestions.
    #[arg(long)]
    suggest: Option<String>,
    /// Commit a place-name search.
    #[arg(long)]
    search: Option<String>,
    /// Open an article by title once points are loaded.
    #[arg(long)]
    select: Option<String>,
    #[arg(long)]
    expanded: bool,

    #[arg(long, allow_hyphen_values = true)]
    device_lat: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    device_lon: Option<f64>,
    #[arg(long)]
    deny_location: bool,

    /// JSON file holding the persisted user location.
    #[arg(long)]
    store: Option<PathBuf>,
    #[arg(long, default_value = wikipedia::DEFAULT_ENDPOINT)]
    wikipedia_endpoint: Url,
    #[arg(long, default_value = nominatim::DEFAULT_ENDPOINT)]
    nominatim_endpoint: Url,
    #[arg(long, default_value_t = 15_000)]
    http_timeout_ms: u64,
    /// Include the event log in the report.
    #[arg(long)]
    events: bool,
}

#[derive(Serialize)]
struct Report {
    snapshot: Snapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<Vec<EngineEvent>>,
    metrics: BTreeMap<&'static str, u64>,
    latencies: BTreeMap<&'static str, LatencySummary>,
}

#[derive(Debug, Serialize)]
struct LatencySummary {
    count: u64,
    mean_ms: Option<u64>,
    min_ms: u64,
    max_ms: u64,
}

impl From<Latency> for LatencySummary {
    fn from(l: Latency) -> Self {
        Self {
            count: l.count,
            mean_ms: l.mean_ms(),
            min_ms: l.min_ms,
            max_ms: l.max_ms,
        }
    }
}

fn build_report(engine: &Engine, with_events: bool) -> Report {
    let metrics = engine.metrics();
    Report {
        snapshot: engine.snapshot(),
        events: with_events.then(|| engine.events().cloned().collect()),
        metrics: metrics.counters().collect(),
        latencies: metrics
            .latencies()
            .map(|(name, l)| (name, LatencySummary::from(l)))
            .collect(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let report = run(Args::parse()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn engine_config(args: &Args) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    if let Some(width) = args.width {
        config.viewport_width_px = width;
    }
    if let Some(height) = args.height {
        config.viewport_height_px = height;
    }
    config.validated()
}

fn settled_at(config: &EngineConfig, center: LatLon, zoom: u8) -> ViewportSettled {
    ViewportSettled {
        center,
        zoom,
        bounds: viewport_bounds(
            center,
            f64::from(zoom),
            f64::from(config.viewport_width_px),
            f64::from(config.viewport_height_px),
        ),
    }
}

async fn run(args: Args) -> Result<Report, Box<dyn std::error::Error>> {
    let config = engine_config(&args);
    let client = reqwest::Client::builder()
        .user_agent(http::USER_AGENT)
        .timeout(Duration::from_millis(args.http_timeout_ms))
        .build()?;

    let store: Box<dyn LocationStore> = match &args.store {
        Some(path) => Box::new(JsonFileLocationStore::new(path)),
        None => Box::new(InMemoryLocationStore::new()),
    };
    let navigation: Box<dyn NavigationPort> = match &args.link {
        Some(link) => Box::new(UrlNavigation::parse(link)?),
        None => Box::new(MemoryNavigation::default()),
    };
    let ports = Ports {
        source: Arc::new(WikipediaSource::new(
            args.wikipedia_endpoint.clone(),
            client.clone(),
        )),
        geocoder: Arc::new(NominatimGeocoder::new(
            args.nominatim_endpoint.clone(),
            client,
        )),
        device: Arc::new(CliDevice::from_args(
            args.device_lat,
            args.device_lon,
            args.deny_location,
        )),
        store,
        navigation,
    };

    let mut engine = Engine::new(config, ports);
    engine.settle().await;
    info!(points = engine.points().len(), "start-up settled");

    if let (Some(lat), Some(lon)) = (args.lat, args.lon) {
        let zoom = args.zoom.unwrap_or(engine.config().default_zoom);
        let settled = settled_at(engine.config(), LatLon::new(lat, lon), zoom);
        engine.dispatch(Command::ViewportSettled(settled));
        engine.settle().await;
    }
    if let Some(text) = &args.search {
        engine.dispatch(Command::SubmitSearch(text.clone()));
        engine.settle().await;
    }
    if let Some(text) = &args.suggest {
        engine.dispatch(Command::InputChanged(text.clone()));
        engine.settle().await;
    }
    if let Some(title) = &args.select {
        let context = if args.expanded {
            OpenContext::Full
        } else {
            OpenContext::Preview
        };
        engine.dispatch(Command::SelectPoint {
            title: title.clone(),
            context,
        });
    }

    let report = build_report(&engine, args.events);
    engine.teardown();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{build_report, engine_config, settled_at, Args};
    use clap::Parser;
    use engine::testing::{FakeGeoSource, HarnessBuilder};
    use foundation::LatLon;

    #[test]
    fn parses_negative_coordinates() {
        let args = Args::try_parse_from([
            "locapedia",
            "--lat",
            "-33.8688",
            "--lon",
            "151.2093",
            "--zoom",
            "14",
        ])
        .expect("args");
        assert_eq!(args.lat, Some(-33.8688));
        assert_eq!(args.zoom, Some(14));
    }

    #[test]
    fn lat_without_lon_is_rejected() {
        assert!(Args::try_parse_from(["locapedia", "--lat", "10"]).is_err());
    }

    #[test]
    fn viewport_size_flags_shape_the_bounds() {
        let args =
            Args::try_parse_from(["locapedia", "--width", "400", "--height", "300"]).expect("args");
        let config = engine_config(&args);
        assert_eq!(config.viewport_width_px, 400);
        let settled = settled_at(&config, LatLon::new(23.8, 90.4), 15);
        assert!(settled.bounds.contains(LatLon::new(23.8, 90.4)));
    }

    #[tokio::test(start_paused = true)]
    async fn report_carries_counters_latencies_and_optional_events() {
        let mut h = HarnessBuilder::new()
            .source(FakeGeoSource::new().with_place(
                "Chittagong Court Building",
                LatLon::new(22.3960, 91.8230),
                "A colonial court building.",
            ))
            .build();
        h.engine.settle().await;

        let json = serde_json::to_value(build_report(&h.engine, false)).expect("json");
        assert_eq!(json["snapshot"]["points"][0]["title"], "Chittagong Court Building");
        assert_eq!(json["metrics"]["fetch.completed"], 1);
        assert_eq!(json["latencies"]["fetch"]["count"], 1);
        assert!(json.get("events").is_none());

        let with_events = build_report(&h.engine, true);
        assert!(with_events.events.is_some_and(|events| !events.is_empty()));
    }
}

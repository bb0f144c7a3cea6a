//! In-process fakes for every engine port.
//!
//! Each fake records the calls it receives so tests can assert on call
//! counts and arguments. Optional latency uses `tokio::time::sleep`, which
//! pairs with paused-clock tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use catalog::{InMemoryLocationStore, LocationStore};
use foundation::LatLon;
use foundation::math::haversine_m;
use scene::{MemoryNavigation, NavigationPort};
use streaming::{
    BoxFuture, GeoHit, GeoQuery, GeoSource, Geocoder, PageDetail, PlaceSuggestion, SourceError,
};

use crate::config::EngineConfig;
use crate::engine::{Engine, Ports};
use crate::geolocation::{DeviceLocator, LocateError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn delay(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// Content service over a fixed list of places. Geosearch returns the
/// places within the query radius, in insertion order.
#[derive(Debug, Default)]
pub struct FakeGeoSource {
    places: Vec<GeoHit>,
    details: HashMap<String, PageDetail>,
    failing_details: Vec<String>,
    coordinates: HashMap<String, LatLon>,
    title_lookup_fails: bool,
    geosearch_error: Mutex<Option<SourceError>>,
    latency: Duration,
    geosearch_calls: Mutex<Vec<GeoQuery>>,
    coordinate_calls: Mutex<Vec<String>>,
}

impl FakeGeoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, title: &str, position: LatLon, text: &str) -> Self {
        self.places.push(GeoHit {
            title: title.to_string(),
            position,
        });
        self.details.insert(
            title.to_string(),
            PageDetail {
                full_text: text.to_string(),
                image_url: None,
            },
        );
        self
    }

    /// A place whose detail call fails.
    pub fn with_undescribed_place(mut self, title: &str, position: LatLon) -> Self {
        self.places.push(GeoHit {
            title: title.to_string(),
            position,
        });
        self.failing_details.push(title.to_string());
        self
    }

    /// Coordinates answered by the title lookup, independent of the places.
    pub fn with_title_coordinates(mut self, title: &str, position: LatLon) -> Self {
        self.coordinates.insert(title.to_string(), position);
        self
    }

    /// Makes every title lookup fail with a transport error.
    pub fn with_failing_title_lookup(mut self) -> Self {
        self.title_lookup_fails = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every following geosearch fail with `error`; `None` restores it.
    pub fn fail_geosearch(&self, error: Option<SourceError>) {
        *lock(&self.geosearch_error) = error;
    }

    pub fn geosearch_calls(&self) -> Vec<GeoQuery> {
        lock(&self.geosearch_calls).clone()
    }

    pub fn coordinate_calls(&self) -> Vec<String> {
        lock(&self.coordinate_calls).clone()
    }
}

impl GeoSource for FakeGeoSource {
    fn geosearch(&self, query: GeoQuery) -> BoxFuture<'_, Result<Vec<GeoHit>, SourceError>> {
        Box::pin(async move {
            lock(&self.geosearch_calls).push(query);
            delay(self.latency).await;
            if let Some(err) = lock(&self.geosearch_error).clone() {
                return Err(err);
            }
            Ok(self
                .places
                .iter()
                .filter(|p| haversine_m(p.position, query.center) <= f64::from(query.radius_m))
                .cloned()
                .collect())
        })
    }

    fn page_detail<'a>(
        &'a self,
        title: &'a str,
    ) -> BoxFuture<'a, Result<Option<PageDetail>, SourceError>> {
        Box::pin(async move {
            delay(self.latency).await;
            if self.failing_details.iter().any(|t| t == title) {
                return Err(SourceError::Transport(format!("detail for {title} failed")));
            }
            Ok(self.details.get(title).cloned())
        })
    }

    fn title_coordinates<'a>(
        &'a self,
        title: &'a str,
    ) -> BoxFuture<'a, Result<Option<LatLon>, SourceError>> {
        Box::pin(async move {
            lock(&self.coordinate_calls).push(title.to_string());
            delay(self.latency).await;
            if self.title_lookup_fails {
                return Err(SourceError::Transport("coordinates lookup failed".into()));
            }
            Ok(self.coordinates.get(title).copied())
        })
    }
}

/// Geocoder over a fixed gazetteer. Suggestions match case-insensitively on
/// a substring of the display name.
#[derive(Debug, Default)]
pub struct FakeGeocoder {
    places: Vec<PlaceSuggestion>,
    fails: bool,
    latency: Duration,
    suggest_calls: Mutex<Vec<String>>,
    locate_calls: Mutex<Vec<String>>,
}

impl FakeGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, display_name: &str, position: LatLon) -> Self {
        self.places.push(PlaceSuggestion {
            display_name: display_name.to_string(),
            position,
        });
        self
    }

    pub fn failing(mut self) -> Self {
        self.fails = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn suggest_calls(&self) -> Vec<String> {
        lock(&self.suggest_calls).clone()
    }

    pub fn locate_calls(&self) -> Vec<String> {
        lock(&self.locate_calls).clone()
    }

    fn matching(&self, text: &str) -> impl Iterator<Item = &PlaceSuggestion> + '_ {
        let needle = text.to_lowercase();
        self.places
            .iter()
            .filter(move |p| p.display_name.to_lowercase().contains(&needle))
    }
}

impl Geocoder for FakeGeocoder {
    fn suggest<'a>(
        &'a self,
        text: &'a str,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<PlaceSuggestion>, SourceError>> {
        Box::pin(async move {
            lock(&self.suggest_calls).push(text.to_string());
            delay(self.latency).await;
            if self.fails {
                return Err(SourceError::Transport("geocoder down".into()));
            }
            Ok(self.matching(text).take(limit).cloned().collect())
        })
    }

    fn locate<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<LatLon>, SourceError>> {
        Box::pin(async move {
            lock(&self.locate_calls).push(name.to_string());
            delay(self.latency).await;
            if self.fails {
                return Err(SourceError::Transport("geocoder down".into()));
            }
            Ok(self.matching(name).next().map(|p| p.position))
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum DeviceBehavior {
    Fix(LatLon),
    Deny,
    Hang,
    Absent,
}

#[derive(Debug)]
pub struct FakeDevice {
    behavior: DeviceBehavior,
    calls: Mutex<usize>,
}

impl FakeDevice {
    fn with(behavior: DeviceBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(0),
        }
    }

    pub fn at(position: LatLon) -> Self {
        Self::with(DeviceBehavior::Fix(position))
    }

    pub fn denied() -> Self {
        Self::with(DeviceBehavior::Deny)
    }

    /// Never answers; the engine's timeout has to fire.
    pub fn hanging() -> Self {
        Self::with(DeviceBehavior::Hang)
    }

    pub fn absent() -> Self {
        Self::with(DeviceBehavior::Absent)
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

impl DeviceLocator for FakeDevice {
    fn is_available(&self) -> bool {
        !matches!(self.behavior, DeviceBehavior::Absent)
    }

    fn current_position(&self) -> BoxFuture<'_, Result<LatLon, LocateError>> {
        Box::pin(async move {
            *lock(&self.calls) += 1;
            match self.behavior {
                DeviceBehavior::Fix(position) => Ok(position),
                DeviceBehavior::Deny => Err(LocateError::PermissionDenied),
                DeviceBehavior::Absent => Err(LocateError::Unavailable),
                DeviceBehavior::Hang => std::future::pending().await,
            }
        })
    }
}

/// Fakes plus the engine built on them.
pub struct Harness {
    pub source: Arc<FakeGeoSource>,
    pub geocoder: Arc<FakeGeocoder>,
    pub device: Arc<FakeDevice>,
    pub engine: Engine,
}

/// Collects fakes and seeds before building an [`Engine`].
pub struct HarnessBuilder {
    config: EngineConfig,
    source: FakeGeoSource,
    geocoder: FakeGeocoder,
    device: FakeDevice,
    store: Box<dyn LocationStore>,
    navigation: Box<dyn NavigationPort>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            source: FakeGeoSource::new(),
            geocoder: FakeGeocoder::new(),
            device: FakeDevice::absent(),
            store: Box::new(InMemoryLocationStore::new()),
            navigation: Box::new(MemoryNavigation::default()),
        }
    }
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn source(mut self, source: FakeGeoSource) -> Self {
        self.source = source;
        self
    }

    pub fn geocoder(mut self, geocoder: FakeGeocoder) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub fn device(mut self, device: FakeDevice) -> Self {
        self.device = device;
        self
    }

    pub fn persisted(mut self, location: LatLon) -> Self {
        self.store = Box::new(InMemoryLocationStore::with_location(location));
        self
    }

    pub fn store(mut self, store: Box<dyn LocationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn reference(mut self, title: &str) -> Self {
        self.navigation = Box::new(MemoryNavigation::new(Some(title.to_string())));
        self
    }

    pub fn navigation(mut self, navigation: Box<dyn NavigationPort>) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn build(self) -> Harness {
        let source = Arc::new(self.source);
        let geocoder = Arc::new(self.geocoder);
        let device = Arc::new(self.device);
        let engine = Engine::new(
            self.config,
            Ports {
                source: source.clone(),
                geocoder: geocoder.clone(),
                device: device.clone(),
                store: self.store,
                navigation: self.navigation,
            },
        );
        Harness {
            source,
            geocoder,
            device,
            engine,
        }
    }
}

//! Single-task driver that wires the sync components to their ports.
//!
//! Everything runs on one task. The loop wakes for three reasons only: a
//! command arrives, the earliest component deadline passes, or a port future
//! completes. Component state is only touched between those wake-ups, so no
//! locking is needed.

use std::sync::Arc;

use catalog::LocationStore;
use foundation::math::viewport_bounds;
use foundation::{GeoBounds, LatLon};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use runtime::{EventBus, Metrics, earliest, sleep_until_opt};
use scene::{
    NavigationPort, OpenContext, OverlayMode, Point, PointSet, ResolutionStep, Selection,
    SelectionBinder,
};
use serde::Serialize;
use streaming::{
    BoxFuture, FetchGate, FetchState, FetchTicket, GeoQuery, GeoSource, Geocoder, PlaceSuggestion,
    SourceError, Viewport, ViewportSettled, ViewportTracker, fetch_points,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::geolocation::{
    DeviceLocator, DeviceOutcome, GeolocationAcquirer, LocateError, UserLocation,
    locate_with_timeout,
};
use crate::search::{Key, KeyOutcome, SearchSuggestionController};

/// Shown while the last geosearch failed.
pub const FETCH_ERROR_MESSAGE: &str = "Failed to fetch locations. Please try again later.";
/// Page title when nothing is selected.
pub const DEFAULT_PAGE_TITLE: &str = "Locapedia";
pub const FIT_BOUNDS_PADDING_PX: u32 = 20;
pub const FIT_BOUNDS_MAX_ZOOM: u8 = 16;

/// External collaborators injected into the engine.
pub struct Ports {
    pub source: Arc<dyn GeoSource>,
    pub geocoder: Arc<dyn Geocoder>,
    pub device: Arc<dyn DeviceLocator>,
    pub store: Box<dyn LocationStore>,
    pub navigation: Box<dyn NavigationPort>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// The map surface finished a pan or zoom.
    ViewportSettled(ViewportSettled),
    SelectPoint { title: String, context: OpenContext },
    CloseSelection,
    SetExpanded(bool),
    ToggleExpanded,
    InputChanged(String),
    Key(Key),
    SelectSuggestion(usize),
    SubmitSearch(String),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Recentered { center: LatLon, zoom: u8 },
    FetchStarted { generation: u64, query: GeoQuery },
    FetchCompleted { generation: u64, points: usize },
    FetchFailed { generation: u64, message: String },
    SelectionChanged { title: Option<String>, overlay: OverlayMode },
    SuggestionsUpdated { query: String, count: usize },
    LocationResolved { location: UserLocation },
    ReferenceNotFound { title: String },
    /// Presentation hint: bring every fetched point into view.
    FitBounds { bounds: GeoBounds, padding_px: u32, max_zoom: u8 },
}

/// Everything a presentation layer needs to render one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub page_title: String,
    pub viewport: Option<Viewport>,
    pub fetch_state: FetchState,
    pub error: Option<String>,
    pub points: Vec<Point>,
    pub selection: Option<Selection>,
    pub overlay: OverlayMode,
    pub navigation_reference: Option<String>,
    pub resolving_reference: bool,
    pub user_location: Option<UserLocation>,
    pub search_input: String,
    pub suggestions: Vec<PlaceSuggestion>,
    pub highlighted: Option<usize>,
}

enum Completion {
    Points {
        ticket: FetchTicket,
        started: Instant,
        result: Result<Vec<Point>, SourceError>,
    },
    TitleCoordinates(Result<Option<LatLon>, SourceError>),
    NameCoordinates(Result<Option<LatLon>, SourceError>),
    Device(Result<LatLon, LocateError>),
    Suggestions {
        query: String,
        result: Result<Vec<PlaceSuggestion>, SourceError>,
    },
    SearchLocated {
        text: String,
        result: Result<Option<LatLon>, SourceError>,
    },
}

pub struct Engine {
    config: EngineConfig,
    source: Arc<dyn GeoSource>,
    geocoder: Arc<dyn Geocoder>,
    device: Arc<dyn DeviceLocator>,
    store: Box<dyn LocationStore>,

    tracker: ViewportTracker,
    gate: FetchGate,
    points: PointSet,
    binder: SelectionBinder,
    geolocation: GeolocationAcquirer,
    search: SearchSuggestionController,

    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    events: EventBus<EngineEvent>,
    metrics: Metrics,
    error: Option<String>,
    started: bool,
    torn_down: bool,
}

impl Engine {
    pub fn new(config: EngineConfig, ports: Ports) -> Self {
        let config = config.validated();
        Self {
            gate: FetchGate::new(config.fetch_interval()),
            search: SearchSuggestionController::new(
                config.suggestion_debounce(),
                config.suggestion_limit,
            ),
            binder: SelectionBinder::new(ports.navigation),
            source: ports.source,
            geocoder: ports.geocoder,
            device: ports.device,
            store: ports.store,
            tracker: ViewportTracker::new(),
            points: PointSet::new(),
            geolocation: GeolocationAcquirer::new(),
            in_flight: FuturesUnordered::new(),
            events: EventBus::new(),
            metrics: Metrics::new(),
            error: None,
            started: false,
            torn_down: false,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Recently emitted events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &EngineEvent> + '_ {
        self.events.events()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn points(&self) -> &PointSet {
        &self.points
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.tracker.current()
    }

    pub fn fetch_state(&self) -> FetchState {
        self.gate.state()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn binder(&self) -> &SelectionBinder {
        &self.binder
    }

    pub fn search(&self) -> &SearchSuggestionController {
        &self.search
    }

    pub fn user_location(&self) -> Option<&UserLocation> {
        self.geolocation.location()
    }

    pub fn store(&self) -> &dyn LocationStore {
        self.store.as_ref()
    }

    pub fn page_title(&self) -> &str {
        self.binder
            .selection()
            .map_or(DEFAULT_PAGE_TITLE, Selection::title)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Nothing armed and nothing in flight.
    pub fn is_idle(&self) -> bool {
        self.next_deadline().is_none() && self.in_flight.is_empty()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            page_title: self.page_title().to_string(),
            viewport: self.tracker.current().copied(),
            fetch_state: self.gate.state(),
            error: self.error.clone(),
            points: self.points.as_slice().to_vec(),
            selection: self.binder.selection().cloned(),
            overlay: self.binder.overlay(),
            navigation_reference: self.binder.navigation_reference(),
            resolving_reference: self.binder.is_resolving(),
            user_location: self.geolocation.location().copied(),
            search_input: self.search.input().to_string(),
            suggestions: self.search.suggestions().to_vec(),
            highlighted: self.search.highlighted(),
        }
    }

    /// Runs the startup chain: initial location, first fetch, and
    /// resolution of a navigation reference. Only the first call does work.
    pub fn start(&mut self, now: Instant) {
        if self.started || self.torn_down {
            return;
        }
        self.started = true;

        let initial = self.geolocation.init(
            now,
            self.store.as_ref(),
            self.device.is_available(),
            self.config.default_center,
            self.config.geolocation_delay(),
        );
        if let Some(initial) = initial {
            self.events
                .emit(EngineEvent::LocationResolved { location: initial });
            let settled = self.settled_at(initial.position, self.config.default_zoom);
            self.tracker.jump_to(settled);
            self.events.emit(EngineEvent::Recentered {
                center: initial.position,
                zoom: self.config.default_zoom,
            });
            self.gate.request(
                now,
                GeoQuery::new(initial.position, self.config.default_radius_m),
            );
        }

        let before = self.selection_key();
        let step = self.binder.resolve_from_navigation_reference(&self.points);
        self.apply_step(now, step);
        self.observe_selection(before);
    }

    /// Handles a command stamped with the current time.
    pub fn dispatch(&mut self, command: Command) {
        self.handle(Instant::now(), command);
    }

    /// Starts the engine first if it has not started yet.
    pub fn handle(&mut self, now: Instant, command: Command) {
        if self.torn_down {
            debug!(?command, "engine torn down, dropping command");
            return;
        }
        self.start(now);
        let before = self.selection_key();
        match command {
            Command::ViewportSettled(settled) => match self.tracker.on_settled(settled) {
                Some(query) => {
                    self.gate.request(now, query);
                }
                None => self.metrics.inc("viewport.deduplicated"),
            },
            Command::SelectPoint { title, context } => {
                match self.points.find_by_title(&title).cloned() {
                    Some(point) => self.binder.select_by_user_click(point, context),
                    None => warn!(%title, "selected point is not in the current set"),
                }
            }
            Command::CloseSelection => self.binder.close_selection(),
            Command::SetExpanded(expanded) => self.binder.set_expanded(expanded),
            Command::ToggleExpanded => self.binder.toggle_expanded(),
            Command::InputChanged(text) => self.search.on_input_changed(now, text),
            Command::Key(key) => match self.search.on_key(key) {
                KeyOutcome::Commit(text) => self.launch_search(text),
                KeyOutcome::Handled => {}
                KeyOutcome::Unhandled => {
                    if key == Key::Escape && self.binder.selection().is_some() {
                        self.binder.close_selection();
                    }
                }
            },
            Command::SelectSuggestion(index) => {
                if let Some(text) = self.search.select(index) {
                    self.launch_search(text);
                }
            }
            Command::SubmitSearch(text) => {
                if let Some(text) = self.search.submit(&text) {
                    self.launch_search(text);
                }
            }
            Command::Shutdown => self.teardown(),
        }
        self.observe_selection(before);
    }

    /// Drives the engine until no timer is armed and nothing is in flight.
    pub async fn settle(&mut self) {
        self.start(Instant::now());
        while !self.torn_down {
            self.fire_due(Instant::now());
            let deadline = self.next_deadline();
            if deadline.is_none() && self.in_flight.is_empty() {
                break;
            }
            tokio::select! {
                Some(done) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.on_completion(Instant::now(), done);
                }
                () = sleep_until_opt(deadline) => {}
            }
        }
    }

    /// Drives the engine from a command channel until it closes or a
    /// `Shutdown` arrives, then tears down.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        self.start(Instant::now());
        while !self.torn_down {
            self.fire_due(Instant::now());
            let deadline = self.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(Instant::now(), command),
                },
                Some(done) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.on_completion(Instant::now(), done);
                }
                () = sleep_until_opt(deadline) => {}
            }
        }
        self.teardown();
    }

    /// Cancels every timer and drops in-flight work. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let cancelled = [
            self.gate.cancel(),
            self.search.cancel(),
            self.geolocation.cancel(),
        ]
        .into_iter()
        .filter(|armed| *armed)
        .count();
        let dropped = self.in_flight.len();
        self.in_flight.clear();
        debug!(cancelled, dropped, "engine torn down");
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.gate.deadline(),
            self.search.deadline(),
            self.geolocation.deadline(),
        ])
    }

    fn fire_due(&mut self, now: Instant) {
        if self.geolocation.poll(now) {
            self.launch_device();
        }
        if let Some(query) = self.search.poll(now) {
            self.launch_suggest(query);
        }
        if let Some(ticket) = self.gate.poll(now) {
            self.launch_fetch(now, ticket);
        }
    }

    fn on_completion(&mut self, now: Instant, done: Completion) {
        let before = self.selection_key();
        match done {
            Completion::Points {
                ticket,
                started,
                result,
            } => self.on_points(now, ticket, started, result),
            Completion::TitleCoordinates(result) => {
                let found = found_or_log("title coordinates", result);
                let step = self.binder.on_title_coordinates(found);
                self.apply_step(now, step);
            }
            Completion::NameCoordinates(result) => {
                let found = found_or_log("name geocoding", result);
                let step = self.binder.on_name_coordinates(found);
                self.apply_step(now, step);
            }
            Completion::Device(result) => {
                let resolving = self.binder.is_resolving();
                match self
                    .geolocation
                    .on_device_result(result, self.store.as_mut(), resolving)
                {
                    DeviceOutcome::Recenter(location) => {
                        self.events.emit(EngineEvent::LocationResolved { location });
                        self.jump_to(now, location.position, self.config.device_zoom);
                    }
                    DeviceOutcome::Suppressed(location) => {
                        self.events.emit(EngineEvent::LocationResolved { location });
                    }
                    DeviceOutcome::Failed(_) => self.metrics.inc("device.failed"),
                }
            }
            Completion::Suggestions { query, result } => {
                if self.search.on_suggestions(&query, result) {
                    let count = self.search.suggestions().len();
                    self.events
                        .emit(EngineEvent::SuggestionsUpdated { query, count });
                }
            }
            Completion::SearchLocated { text, result } => {
                if let Some(position) = self.search.on_commit_located(&text, result) {
                    info!(%text, %position, "search committed");
                    self.events.emit(EngineEvent::SuggestionsUpdated {
                        query: text,
                        count: 0,
                    });
                    self.jump_to(now, position, self.current_zoom());
                }
            }
        }
        self.observe_selection(before);
    }

    fn on_points(
        &mut self,
        now: Instant,
        ticket: FetchTicket,
        started: Instant,
        result: Result<Vec<Point>, SourceError>,
    ) {
        let generation = ticket.generation;
        self.metrics
            .record_latency("fetch", now.saturating_duration_since(started));
        match result {
            Ok(points) => {
                self.gate.complete(generation, Ok(()));
                self.error = None;
                self.points.replace(points, generation);
                self.metrics.inc("fetch.completed");
                info!(generation, points = self.points.len(), "point set applied");
                self.events.emit(EngineEvent::FetchCompleted {
                    generation,
                    points: self.points.len(),
                });

                let step = self.binder.on_points_applied(generation, &self.points);
                self.apply_step(now, step);
                self.fit_to_points();
            }
            Err(err) => {
                self.gate.complete(generation, Err(&err));
                self.error = Some(FETCH_ERROR_MESSAGE.to_string());
                self.metrics.inc("fetch.failed");
                self.events.emit(EngineEvent::FetchFailed {
                    generation,
                    message: err.to_string(),
                });

                let step = self.binder.on_fetch_failed(generation);
                self.apply_step(now, step);
            }
        }
    }

    fn apply_step(&mut self, now: Instant, step: ResolutionStep) {
        match step {
            ResolutionStep::LookupTitle(title) => {
                let source = Arc::clone(&self.source);
                self.in_flight.push(Box::pin(async move {
                    Completion::TitleCoordinates(source.title_coordinates(&title).await)
                }));
            }
            ResolutionStep::LookupName(title) => {
                let geocoder = Arc::clone(&self.geocoder);
                self.in_flight.push(Box::pin(async move {
                    Completion::NameCoordinates(geocoder.locate(&title).await)
                }));
            }
            ResolutionStep::Recenter(center) => {
                let generation = self.jump_to(now, center, self.current_zoom());
                self.binder.await_fetch(generation);
            }
            ResolutionStep::NotFound(title) => {
                self.events.emit(EngineEvent::ReferenceNotFound { title });
            }
            ResolutionStep::Resolved | ResolutionStep::Ignored => {}
        }
    }

    /// Programmatic move followed by a fetch request. Returns the request's
    /// generation.
    fn jump_to(&mut self, now: Instant, center: LatLon, zoom: u8) -> u64 {
        let settled = self.settled_at(center, zoom);
        let query = self.tracker.jump_to(settled);
        self.events.emit(EngineEvent::Recentered { center, zoom });
        self.gate.request(now, query)
    }

    fn settled_at(&self, center: LatLon, zoom: u8) -> ViewportSettled {
        ViewportSettled {
            center,
            zoom,
            bounds: viewport_bounds(
                center,
                f64::from(zoom),
                f64::from(self.config.viewport_width_px),
                f64::from(self.config.viewport_height_px),
            ),
        }
    }

    fn current_zoom(&self) -> u8 {
        self.tracker
            .current()
            .map_or(self.config.default_zoom, |v| v.zoom)
    }

    fn fit_to_points(&mut self) {
        if self.current_zoom() > self.config.fit_bounds_max_zoom {
            return;
        }
        if let Some(bounds) = self.points.bounds() {
            self.events.emit(EngineEvent::FitBounds {
                bounds,
                padding_px: FIT_BOUNDS_PADDING_PX,
                max_zoom: FIT_BOUNDS_MAX_ZOOM,
            });
        }
    }

    fn launch_fetch(&mut self, now: Instant, ticket: FetchTicket) {
        self.metrics.inc("fetch.started");
        self.events.emit(EngineEvent::FetchStarted {
            generation: ticket.generation,
            query: ticket.query,
        });
        let source = Arc::clone(&self.source);
        self.in_flight.push(Box::pin(async move {
            let result = fetch_points(source.as_ref(), ticket.query).await;
            Completion::Points {
                ticket,
                started: now,
                result,
            }
        }));
    }

    fn launch_device(&mut self) {
        self.metrics.inc("device.requests");
        let device = Arc::clone(&self.device);
        let timeout = self.config.geolocation_timeout();
        self.in_flight.push(Box::pin(async move {
            Completion::Device(locate_with_timeout(device.as_ref(), timeout).await)
        }));
    }

    fn launch_suggest(&mut self, query: String) {
        self.metrics.inc("suggest.requests");
        let geocoder = Arc::clone(&self.geocoder);
        let limit = self.search.limit();
        self.in_flight.push(Box::pin(async move {
            let result = geocoder.suggest(&query, limit).await;
            Completion::Suggestions { query, result }
        }));
    }

    fn launch_search(&mut self, text: String) {
        self.metrics.inc("search.commits");
        let geocoder = Arc::clone(&self.geocoder);
        self.in_flight.push(Box::pin(async move {
            let result = geocoder.locate(&text).await;
            Completion::SearchLocated { text, result }
        }));
    }

    fn selection_key(&self) -> (Option<String>, OverlayMode) {
        (
            self.binder.selection().map(|s| s.title().to_string()),
            self.binder.overlay(),
        )
    }

    fn observe_selection(&mut self, before: (Option<String>, OverlayMode)) {
        let (title, overlay) = self.selection_key();
        if (&title, overlay) != (&before.0, before.1) {
            self.events
                .emit(EngineEvent::SelectionChanged { title, overlay });
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("viewport", &self.tracker.current())
            .field("fetch_state", &self.gate.state())
            .field("points", &self.points.len())
            .field("binder", &self.binder)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

fn found_or_log(what: &str, result: Result<Option<LatLon>, SourceError>) -> Option<LatLon> {
    result.unwrap_or_else(|err| {
        warn!(error = %err, "{what} failed");
        None
    })
}

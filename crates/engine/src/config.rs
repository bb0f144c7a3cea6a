use std::str::FromStr;
use std::time::Duration;

use foundation::LatLon;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const MIN_SUGGESTION_DEBOUNCE_MS: u64 = 300;
pub const MAX_SUGGESTION_DEBOUNCE_MS: u64 = 1000;

/// Tunables for the sync engine. `Default` holds the production values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fetch_interval_ms: u64,
    pub suggestion_debounce_ms: u64,
    pub geolocation_delay_ms: u64,
    pub geolocation_timeout_ms: u64,
    pub default_center: LatLon,
    pub default_zoom: u8,
    /// Zoom applied when a device fix recenters the map.
    pub device_zoom: u8,
    pub default_radius_m: f64,
    pub suggestion_limit: usize,
    /// Fetched points are fitted into view at or below this zoom.
    pub fit_bounds_max_zoom: u8,
    pub viewport_width_px: u32,
    pub viewport_height_px: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_interval_ms: 2000,
            suggestion_debounce_ms: 300,
            geolocation_delay_ms: 3000,
            geolocation_timeout_ms: 10_000,
            default_center: LatLon::new(22.3934, 91.821),
            default_zoom: 17,
            device_zoom: 13,
            default_radius_m: 10_000.0,
            suggestion_limit: 5,
            fit_bounds_max_zoom: 10,
            viewport_width_px: 1024,
            viewport_height_px: 768,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `LOCAPEDIA_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let l = &lookup;
        override_from(l, "LOCAPEDIA_FETCH_INTERVAL_MS", &mut cfg.fetch_interval_ms);
        override_from(l, "LOCAPEDIA_SUGGESTION_DEBOUNCE_MS", &mut cfg.suggestion_debounce_ms);
        override_from(l, "LOCAPEDIA_GEOLOCATION_DELAY_MS", &mut cfg.geolocation_delay_ms);
        override_from(l, "LOCAPEDIA_GEOLOCATION_TIMEOUT_MS", &mut cfg.geolocation_timeout_ms);
        override_from(l, "LOCAPEDIA_DEFAULT_LAT", &mut cfg.default_center.lat);
        override_from(l, "LOCAPEDIA_DEFAULT_LON", &mut cfg.default_center.lon);
        override_from(l, "LOCAPEDIA_DEFAULT_ZOOM", &mut cfg.default_zoom);
        override_from(l, "LOCAPEDIA_DEVICE_ZOOM", &mut cfg.device_zoom);
        override_from(l, "LOCAPEDIA_SUGGESTION_LIMIT", &mut cfg.suggestion_limit);
        override_from(l, "LOCAPEDIA_VIEWPORT_WIDTH_PX", &mut cfg.viewport_width_px);
        override_from(l, "LOCAPEDIA_VIEWPORT_HEIGHT_PX", &mut cfg.viewport_height_px);
        cfg.validated()
    }

    /// Brings out-of-range values back into their allowed ranges.
    pub fn validated(mut self) -> Self {
        let debounce = self
            .suggestion_debounce_ms
            .clamp(MIN_SUGGESTION_DEBOUNCE_MS, MAX_SUGGESTION_DEBOUNCE_MS);
        if debounce != self.suggestion_debounce_ms {
            warn!(
                requested = self.suggestion_debounce_ms,
                using = debounce,
                "suggestion debounce out of range"
            );
            self.suggestion_debounce_ms = debounce;
        }
        if !self.default_center.is_valid() {
            warn!(center = %self.default_center, "invalid default center, using built-in");
            self.default_center = Self::default().default_center;
        }
        self.fetch_interval_ms = self.fetch_interval_ms.max(1);
        self.suggestion_limit = self.suggestion_limit.max(1);
        self.viewport_width_px = self.viewport_width_px.max(1);
        self.viewport_height_px = self.viewport_height_px.max(1);
        self
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }

    pub fn suggestion_debounce(&self) -> Duration {
        Duration::from_millis(self.suggestion_debounce_ms)
    }

    pub fn geolocation_delay(&self) -> Duration {
        Duration::from_millis(self.geolocation_delay_ms)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_millis(self.geolocation_timeout_ms)
    }
}

fn override_from<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, name: &str, slot: &mut T) {
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!(var = name, value = %raw, "ignoring unparsable setting"),
    }
}

use std::time::Duration;

use catalog::LocationStore;
use foundation::LatLon;
use runtime::OneShotTimer;
use serde::Serialize;
use streaming::BoxFuture;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    Unavailable,
    #[error("location request timed out")]
    Timeout,
}

/// The device's positioning service.
pub trait DeviceLocator: Send + Sync {
    fn is_available(&self) -> bool;
    fn current_position(&self) -> BoxFuture<'_, Result<LatLon, LocateError>>;
}

/// Bounds a device request by `timeout`; expiry becomes [`LocateError::Timeout`].
pub async fn locate_with_timeout(
    device: &dyn DeviceLocator,
    timeout: Duration,
) -> Result<LatLon, LocateError> {
    tokio::time::timeout(timeout, device.current_position())
        .await
        .unwrap_or(Err(LocateError::Timeout))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Device,
    Persisted,
    Default,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct UserLocation {
    #[serde(flatten)]
    pub position: LatLon,
    pub source: LocationSource,
}

/// Outcome of a device reading.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum DeviceOutcome {
    /// The map should move here.
    Recenter(UserLocation),
    /// Reading stored, but recentering is held off while a reference resolves.
    Suppressed(UserLocation),
    /// Prior center kept.
    Failed(LocateError),
}

/// Startup location chain: persisted value, then default, then a deferred
/// device reading that supersedes either.
#[derive(Debug)]
pub struct GeolocationAcquirer {
    location: Option<UserLocation>,
    device_timer: OneShotTimer,
    initialized: bool,
}

impl Default for GeolocationAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl GeolocationAcquirer {
    pub fn new() -> Self {
        Self {
            location: None,
            device_timer: OneShotTimer::new(),
            initialized: false,
        }
    }

    pub fn location(&self) -> Option<&UserLocation> {
        self.location.as_ref()
    }

    /// Picks the initial center and schedules the device request.
    ///
    /// Returns `None` on every call after the first.
    pub fn init(
        &mut self,
        now: Instant,
        store: &dyn LocationStore,
        device_available: bool,
        default_center: LatLon,
        device_delay: Duration,
    ) -> Option<UserLocation> {
        if self.initialized {
            return None;
        }
        self.initialized = true;

        let persisted = match store.load() {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "could not read persisted location");
                None
            }
        };
        let initial = match persisted {
            Some(position) => UserLocation {
                position,
                source: LocationSource::Persisted,
            },
            None => UserLocation {
                position: default_center,
                source: LocationSource::Default,
            },
        };
        info!(position = %initial.position, source = ?initial.source, "initial location");
        self.location = Some(initial);

        if device_available {
            self.device_timer.arm(now, device_delay);
        } else {
            debug!("device location unavailable");
        }
        Some(initial)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.device_timer.deadline()
    }

    /// `true` once, when the device request is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.device_timer.fire(now)
    }

    pub fn on_device_result(
        &mut self,
        result: Result<LatLon, LocateError>,
        store: &mut dyn LocationStore,
        resolving_reference: bool,
    ) -> DeviceOutcome {
        let position = match result {
            Ok(position) => position,
            Err(err) => {
                warn!(error = %err, "device location failed, keeping current center");
                return DeviceOutcome::Failed(err);
            }
        };

        let location = UserLocation {
            position,
            source: LocationSource::Device,
        };
        self.location = Some(location);
        if let Err(err) = store.save(position) {
            warn!(error = %err, "could not persist device location");
        }

        if resolving_reference {
            debug!(%position, "device fix held back while resolving reference");
            DeviceOutcome::Suppressed(location)
        } else {
            info!(%position, "device location acquired");
            DeviceOutcome::Recenter(location)
        }
    }

    pub fn cancel(&mut self) -> bool {
        self.device_timer.cancel()
    }
}

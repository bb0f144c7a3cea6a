use foundation::{GeoBounds, LatLon};
use serde::Serialize;
use tracing::trace;

use crate::request::GeoQuery;

/// A pan or zoom gesture has ended.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewportSettled {
    pub center: LatLon,
    pub zoom: u8,
    pub bounds: GeoBounds,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Viewport {
    pub center: LatLon,
    pub zoom: u8,
    /// Half the great-circle distance between the bounding corners.
    pub radius_m: f64,
}

impl Viewport {
    fn from_settled(settled: &ViewportSettled) -> Self {
        Self {
            center: settled.center,
            zoom: settled.zoom,
            radius_m: settled.bounds.diagonal_m() / 2.0,
        }
    }

    pub fn query(&self) -> GeoQuery {
        GeoQuery::new(self.center, self.radius_m)
    }
}

/// Turns settled viewport reports into fetch queries.
///
/// A pan is deduplicated on exact center equality. Any zoom change yields a
/// query.
#[derive(Debug, Default)]
pub struct ViewportTracker {
    current: Option<Viewport>,
}

impl ViewportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Viewport> {
        self.current.as_ref()
    }

    pub fn on_settled(&mut self, settled: ViewportSettled) -> Option<GeoQuery> {
        let next = Viewport::from_settled(&settled);
        let changed = match &self.current {
            None => true,
            Some(prev) => prev.zoom != next.zoom || prev.center != next.center,
        };
        self.current = Some(next);
        if !changed {
            trace!(center = %next.center, "viewport unchanged");
            return None;
        }
        Some(next.query())
    }

    /// Programmatic move. Always yields a query.
    pub fn jump_to(&mut self, settled: ViewportSettled) -> GeoQuery {
        let next = Viewport::from_settled(&settled);
        self.current = Some(next);
        next.query()
    }
}

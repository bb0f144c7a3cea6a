use foundation::LatLon;
use serde::Serialize;

/// Smallest search radius the geosearch endpoint accepts, in meters.
pub const MIN_RADIUS_M: u32 = 10;
/// Largest search radius the geosearch endpoint accepts, in meters.
pub const MAX_RADIUS_M: u32 = 10_000;

/// A geosearch around `center`. The radius is already rounded and clamped.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct GeoQuery {
    pub center: LatLon,
    pub radius_m: u32,
}

impl GeoQuery {
    pub fn new(center: LatLon, radius_m: f64) -> Self {
        Self {
            center,
            radius_m: clamp_radius(radius_m),
        }
    }
}

pub fn clamp_radius(radius_m: f64) -> u32 {
    if !radius_m.is_finite() {
        return if radius_m == f64::INFINITY {
            MAX_RADIUS_M
        } else {
            MIN_RADIUS_M
        };
    }
    radius_m
        .round()
        .clamp(MIN_RADIUS_M as f64, MAX_RADIUS_M as f64) as u32
}

/// A query released by the fetch gate, tagged with the request generation it
/// answers. Generations grow with every `request` call.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct FetchTicket {
    pub generation: u64,
    pub query: GeoQuery,
}

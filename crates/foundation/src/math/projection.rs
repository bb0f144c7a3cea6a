//! Spherical Web Mercator, the projection slippy-map surfaces report viewports in.

use crate::bounds::GeoBounds;
use crate::geo::LatLon;

/// Pixel edge length of one tile at zoom 0.
pub const TILE_SIZE_PX: f64 = 256.0;

/// Latitude limit of the square Web Mercator world.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_6;

/// Global pixel position; y grows southwards.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

fn world_size_px(zoom: f64) -> f64 {
    TILE_SIZE_PX * 2f64.powf(zoom)
}

/// Projects a position to global pixel coordinates at `zoom`.
pub fn project(p: LatLon, zoom: f64) -> PixelPoint {
    let size = world_size_px(zoom);
    let lat = p.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = (p.lon + 180.0) / 360.0 * size;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0 * size;
    PixelPoint { x, y }
}

/// Inverse of [`project`].
pub fn unproject(px: PixelPoint, zoom: f64) -> LatLon {
    let size = world_size_px(zoom);
    let lon = px.x / size * 360.0 - 180.0;
    let n = std::f64::consts::PI - 2.0 * std::f64::consts::PI * px.y / size;
    let lat = (0.5 * (n.exp() - (-n).exp())).atan().to_degrees();
    LatLon::new(lat, lon)
}

/// Geographic bounds of a `width_px` x `height_px` viewport centered on `center`.
pub fn viewport_bounds(center: LatLon, zoom: f64, width_px: f64, height_px: f64) -> GeoBounds {
    let c = project(center, zoom);
    let (dx, dy) = (width_px / 2.0, height_px / 2.0);
    let sw = unproject(PixelPoint { x: c.x - dx, y: c.y + dy }, zoom);
    let ne = unproject(PixelPoint { x: c.x + dx, y: c.y - dy }, zoom);
    GeoBounds::new(sw, ne)
}

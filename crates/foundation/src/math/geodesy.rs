use crate::geo::LatLon;

/// Mean Earth radius (meters), the sphere web map libraries measure distances on.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two positions using the haversine formula.
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lon1) = a.to_radians();
    let (lat2, lon2) = b.to_radians();

    let sin_dlat = ((lat2 - lat1) / 2.0).sin();
    let sin_dlon = ((lon2 - lon1) / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;

    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Position reached by travelling `distance_m` from `origin` along `bearing_deg`.
pub fn destination(origin: LatLon, bearing_deg: f64, distance_m: f64) -> LatLon {
    let (lat1, lon1) = origin.to_radians();
    let bearing = bearing_deg.to_radians();
    let delta = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    LatLon::new(lat2.to_degrees(), lon2.to_degrees())
}

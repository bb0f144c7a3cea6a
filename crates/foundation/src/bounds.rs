use serde::{Deserialize, Serialize};

use crate::geo::LatLon;
use crate::math::geodesy::haversine_m;

/// Geographic bounding box described by its south-west and north-east corners.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub south_west: LatLon,
    pub north_east: LatLon,
}

impl GeoBounds {
    pub fn new(south_west: LatLon, north_east: LatLon) -> Self {
        GeoBounds {
            south_west,
            north_east,
        }
    }

    /// Smallest box containing every position, or `None` for an empty input.
    pub fn from_positions(positions: impl IntoIterator<Item = LatLon>) -> Option<Self> {
        let mut iter = positions.into_iter();
        let first = iter.next()?;
        let mut sw = first;
        let mut ne = first;
        for p in iter {
            sw.lat = sw.lat.min(p.lat);
            sw.lon = sw.lon.min(p.lon);
            ne.lat = ne.lat.max(p.lat);
            ne.lon = ne.lon.max(p.lon);
        }
        Some(GeoBounds::new(sw, ne))
    }

    pub fn center(&self) -> LatLon {
        LatLon::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lon + self.north_east.lon) / 2.0,
        )
    }

    pub fn contains(&self, p: LatLon) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&p.lat)
            && (self.south_west.lon..=self.north_east.lon).contains(&p.lon)
    }

    /// Great-circle distance between the two corners, in meters.
    pub fn diagonal_m(&self) -> f64 {
        haversine_m(self.north_east, self.south_west)
    }
}

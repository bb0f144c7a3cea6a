use std::collections::HashSet;

use foundation::GeoBounds;
use tracing::debug;

use crate::point::Point;

/// The point set currently on display.
///
/// Only ever replaced wholesale; there is no incremental merge.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PointSet {
    points: Vec<Point>,
    generation: u64,
}

impl PointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every point, keeping the first occurrence of a repeated title.
    /// Points with a blank title are dropped, since no navigation reference
    /// can name them.
    ///
    /// `generation` identifies the fetch request the points answer.
    pub fn replace(&mut self, points: Vec<Point>, generation: u64) {
        let mut seen = HashSet::with_capacity(points.len());
        let before = points.len();
        self.points = points
            .into_iter()
            .filter(|p| !p.title.trim().is_empty() && seen.insert(p.title.clone()))
            .collect();
        if self.points.len() != before {
            debug!(
                dropped = before - self.points.len(),
                "dropped points with blank or duplicate titles"
            );
        }
        self.generation = generation;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> + '_ {
        self.points.iter()
    }

    pub fn as_slice(&self) -> &[Point] {
        &self.points
    }

    pub fn find_by_title(&self, title: &str) -> Option<&Point> {
        self.points.iter().find(|p| p.title == title)
    }

    pub fn bounds(&self) -> Option<GeoBounds> {
        GeoBounds::from_positions(self.points.iter().map(|p| p.position))
    }
}

#[cfg(test)]
mod tests {
    use super::PointSet;
    use crate::point::Point;
    use foundation::LatLon;

    fn p(title: &str, lat: f64, lon: f64) -> Point {
        Point::without_detail(title, LatLon::new(lat, lon))
    }

    #[test]
    fn replace_is_wholesale() {
        let mut set = PointSet::new();
        set.replace(vec![p("a", 1.0, 1.0), p("b", 2.0, 2.0)], 1);
        set.replace(vec![p("c", 3.0, 3.0)], 2);
        assert_eq!(set.len(), 1);
        assert!(set.find_by_title("a").is_none());
        assert_eq!(set.generation(), 2);
    }

    #[test]
    fn duplicate_titles_keep_first() {
        let mut set = PointSet::new();
        set.replace(vec![p("a", 1.0, 1.0), p("a", 9.0, 9.0)], 1);
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.find_by_title("a").map(|p| p.position),
            Some(LatLon::new(1.0, 1.0))
        );
    }

    #[test]
    fn blank_titles_are_dropped() {
        let mut set = PointSet::new();
        set.replace(vec![p("", 1.0, 1.0), p("  ", 2.0, 2.0), p("b", 3.0, 3.0)], 1);
        assert_eq!(set.len(), 1);
        assert!(set.find_by_title("").is_none());
    }

    #[test]
    fn bounds_cover_points() {
        let mut set = PointSet::new();
        assert!(set.bounds().is_none());
        set.replace(vec![p("a", 1.0, 5.0), p("b", 2.0, 3.0)], 1);
        let b = set.bounds().expect("bounds");
        assert_eq!(b.south_west, LatLon::new(1.0, 3.0));
        assert_eq!(b.north_east, LatLon::new(2.0, 5.0));
    }
}

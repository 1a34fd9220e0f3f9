//! Location primitives shared by every stage of the address pipeline.

use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// Type of OSM object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmType {
    Node,
    Way,
    Relation,
}

impl std::fmt::Display for OsmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsmType::Node => write!(f, "node"),
            OsmType::Way => write!(f, "way"),
            OsmType::Relation => write!(f, "relation"),
        }
    }
}

/// OSM object identity: element type plus the id inside that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId {
    pub osm_type: OsmType,
    pub id: i64,
}

impl EntityId {
    pub fn new(osm_type: OsmType, id: i64) -> Self {
        Self { osm_type, id }
    }

    /// Single integer key unique across element types.
    ///
    /// Nodes, ways and relations share one id space in every persisted row,
    /// so the element type lives in the two low bits.
    pub fn packed(&self) -> i64 {
        let tag = match self.osm_type {
            OsmType::Node => 0,
            OsmType::Way => 1,
            OsmType::Relation => 2,
        };
        (self.id << 2) | tag
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.osm_type, self.id)
    }
}

/// Geographic point (lat/lon)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// geo uses x = lon, y = lat
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// Great-circle distance in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        Haversine.distance(self.to_point(), other.to_point())
    }

    /// Average of a set of points, `None` when empty.
    pub fn mean<I: IntoIterator<Item = GeoPoint>>(points: I) -> Option<GeoPoint> {
        let (mut lat, mut lon, mut n) = (0.0, 0.0, 0usize);
        for p in points {
            lat += p.lat;
            lon += p.lon;
            n += 1;
        }
        if n == 0 {
            return None;
        }
        Some(GeoPoint::new(lat / n as f64, lon / n as f64))
    }
}

impl From<Point<f64>> for GeoPoint {
    fn from(p: Point<f64>) -> Self {
        GeoPoint::new(p.y(), p.x())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = a.distance_m(&b);
        assert!((d - 111_195.0).abs() < 200.0, "got {}", d);
    }

    #[test]
    fn test_packed_ids_do_not_collide() {
        let node = EntityId::new(OsmType::Node, 42).packed();
        let way = EntityId::new(OsmType::Way, 42).packed();
        let rel = EntityId::new(OsmType::Relation, 42).packed();
        assert_ne!(node, way);
        assert_ne!(way, rel);
        assert_ne!(node, rel);
    }

    #[test]
    fn test_mean_of_points() {
        let m = GeoPoint::mean(vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(2.0, 4.0)]).unwrap();
        assert_eq!(m, GeoPoint::new(1.0, 2.0));
        assert!(GeoPoint::mean(Vec::new()).is_none());
    }
}

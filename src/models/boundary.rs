//! Administrative and place boundaries.

use geo::{Centroid, Contains, MultiPolygon};

use super::{CityType, GeoPoint};

/// Handle into the boundary arena of [`crate::storage::CityStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundaryId(pub u32);

/// A named closed area built from an OSM relation or closed way.
#[derive(Debug, Clone)]
pub struct Boundary {
    /// Packed source entity id
    pub id: i64,
    pub name: String,
    /// `short_name` of the source entity
    pub alt_name: Option<String>,
    /// OSM admin_level; `None` when absent or unparseable
    pub admin_level: Option<i32>,
    /// Set when the boundary carries its own `place=*` tag
    pub city_type: Option<CityType>,
    /// Packed id of the `admin_centre` (or `label`) node
    pub admin_center_id: Option<i64>,
    pub geometry: MultiPolygon<f64>,
}

impl Boundary {
    pub fn new(id: i64, name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            id,
            name: name.into(),
            alt_name: None,
            admin_level: None,
            city_type: None,
            admin_center_id: None,
            geometry,
        }
    }

    pub fn center(&self) -> Option<GeoPoint> {
        self.geometry.centroid().map(GeoPoint::from)
    }

    pub fn contains(&self, location: GeoPoint) -> bool {
        self.geometry.contains(&location.to_point())
    }

    /// A boundary is usable when it has a name, some area, and is not a
    /// country or macro region.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
            && self.center().is_some()
            && self.admin_level.map_or(true, |level| level >= 4)
    }

    /// Case-insensitive comparison against the name and the alternative name.
    pub fn name_matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.name.to_lowercase() == name
            || self
                .alt_name
                .as_deref()
                .is_some_and(|alt| alt.to_lowercase() == name)
    }

    /// Absorb the other boundary's rings into this one.
    pub fn merge(&mut self, other: &Boundary) {
        self.geometry.0.extend(other.geometry.0.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]])
    }

    #[test]
    fn test_contains_and_center() {
        let b = Boundary::new(1, "Square", square(0.0, 0.0, 2.0));
        assert!(b.contains(GeoPoint::new(1.0, 1.0)));
        assert!(!b.contains(GeoPoint::new(3.0, 1.0)));
        let c = b.center().unwrap();
        assert!((c.lat - 1.0).abs() < 1e-9 && (c.lon - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_validity() {
        let mut b = Boundary::new(1, "Square", square(0.0, 0.0, 1.0));
        assert!(b.is_valid());
        b.admin_level = Some(2);
        assert!(!b.is_valid());
        b.admin_level = Some(4);
        assert!(b.is_valid());

        let unnamed = Boundary::new(2, "", square(0.0, 0.0, 1.0));
        assert!(!unnamed.is_valid());
        let empty = Boundary::new(3, "Empty", MultiPolygon::new(vec![]));
        assert!(!empty.is_valid());
    }

    #[test]
    fn test_merge_extends_area() {
        let mut a = Boundary::new(1, "A", square(0.0, 0.0, 1.0));
        let b = Boundary::new(2, "A", square(5.0, 5.0, 1.0));
        a.merge(&b);
        assert!(a.contains(GeoPoint::new(5.5, 5.5)));
        assert!(a.contains(GeoPoint::new(0.5, 0.5)));
    }

    #[test]
    fn test_name_matches_alt_name() {
        let mut b = Boundary::new(1, "Saint Petersburg", square(0.0, 0.0, 1.0));
        b.alt_name = Some("SPb".to_string());
        assert!(b.name_matches("spb"));
        assert!(b.name_matches("SAINT PETERSBURG"));
        assert!(!b.name_matches("Moscow"));
    }
}

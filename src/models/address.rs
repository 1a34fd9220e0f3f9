//! Streets, buildings and street geometry rows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::GeoPoint;

/// How house numbers between two address points are filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildingInterpolation {
    All,
    Even,
    Odd,
    Alphabetic,
}

impl BuildingInterpolation {
    /// Parse an `addr:interpolation` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "all" => Some(BuildingInterpolation::All),
            "even" => Some(BuildingInterpolation::Even),
            "odd" => Some(BuildingInterpolation::Odd),
            "alphabetic" => Some(BuildingInterpolation::Alphabetic),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            BuildingInterpolation::All => 1,
            BuildingInterpolation::Even => 2,
            BuildingInterpolation::Odd => 3,
            BuildingInterpolation::Alphabetic => 4,
        }
    }
}

/// An addressable point: one house number, or an interpolated range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    /// Packed source entity id
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub localized: BTreeMap<String, String>,
    pub location: GeoPoint,
    /// Last number of an interpolated range
    #[serde(default)]
    pub name2: Option<String>,
    #[serde(default)]
    pub location2: Option<GeoPoint>,
    #[serde(default)]
    pub postcode: Option<String>,
    /// Explicit numeric step (`addr:interpolation=2`), 0 when unused
    #[serde(default)]
    pub interpolation_interval: i32,
    #[serde(default)]
    pub interpolation_type: Option<BuildingInterpolation>,
}

impl Building {
    pub fn new(id: i64, name: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id,
            name: name.into(),
            localized: BTreeMap::new(),
            location,
            name2: None,
            location2: None,
            postcode: None,
            interpolation_interval: 0,
            interpolation_type: None,
        }
    }
}

/// Persisted street row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetRow {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub localized: BTreeMap<String, String>,
    pub location: GeoPoint,
    /// Packed id of the owning city
    pub city_id: i64,
    /// Suburb/district the street lies in, if any
    #[serde(default)]
    pub sub_area: Option<String>,
}

/// One node of a highway way registered under a street.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetNode {
    pub id: i64,
    pub way_id: i64,
    pub location: GeoPoint,
}

/// A street as loaded for serialization, with its buildings and geometry.
#[derive(Debug, Clone)]
pub struct Street {
    pub id: i64,
    /// Name as written to the index, sub-area suffix included
    pub name: String,
    /// Name as stored, used to group streets for merging
    pub base_name: String,
    pub localized: BTreeMap<String, String>,
    pub location: GeoPoint,
    /// Packed id of the city the street was loaded from
    pub city_id: i64,
    pub buildings: Vec<Building>,
    pub way_nodes: Vec<GeoPoint>,
}

impl Street {
    pub fn from_row(row: StreetRow, name: String) -> Self {
        Self {
            id: row.id,
            name,
            base_name: row.name,
            localized: row.localized,
            location: row.location,
            city_id: row.city_id,
            buildings: Vec::new(),
            way_nodes: Vec::new(),
        }
    }

    /// Add a building unless one with the same id is already present.
    pub fn add_building_check_by_id(&mut self, building: Building) -> bool {
        if self.buildings.iter().any(|b| b.id == building.id) {
            return false;
        }
        self.buildings.push(building);
        true
    }

    /// Smallest distance between the two streets' nodes, falling back to the
    /// street location when a street has no geometry.
    pub fn min_distance_m(&self, other: &Street) -> f64 {
        let own = if self.way_nodes.is_empty() {
            std::slice::from_ref(&self.location)
        } else {
            &self.way_nodes[..]
        };
        let theirs = if other.way_nodes.is_empty() {
            std::slice::from_ref(&other.location)
        } else {
            &other.way_nodes[..]
        };

        let mut best = f64::INFINITY;
        for a in own {
            for b in theirs {
                best = best.min(a.distance_m(b));
            }
        }
        best
    }

    /// Take over the other street's buildings and geometry.
    pub fn merge_with(&mut self, other: Street) {
        for building in other.buildings {
            self.add_building_check_by_id(building);
        }
        self.way_nodes.extend(other.way_nodes);
        for (lang, name) in other.localized {
            self.localized.entry(lang).or_insert(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn street(id: i64, nodes: Vec<GeoPoint>) -> Street {
        let row = StreetRow {
            id,
            name: "Main".to_string(),
            localized: BTreeMap::new(),
            location: nodes.first().copied().unwrap_or(GeoPoint::new(0.0, 0.0)),
            city_id: 1,
            sub_area: None,
        };
        let mut s = Street::from_row(row, "Main".to_string());
        s.way_nodes = nodes;
        s
    }

    #[test]
    fn test_add_building_check_by_id() {
        let mut s = street(1, vec![]);
        assert!(s.add_building_check_by_id(Building::new(5, "1", GeoPoint::new(0.0, 0.0))));
        assert!(!s.add_building_check_by_id(Building::new(5, "1a", GeoPoint::new(0.0, 0.0))));
        assert_eq!(s.buildings.len(), 1);
        assert_eq!(s.buildings[0].name, "1");
    }

    #[test]
    fn test_min_distance_uses_closest_nodes() {
        let a = street(1, vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01)]);
        let b = street(2, vec![GeoPoint::new(0.0, 0.011), GeoPoint::new(0.0, 0.05)]);
        let d = a.min_distance_m(&b);
        assert!(d > 100.0 && d < 120.0, "got {}", d);
    }

    #[test]
    fn test_merge_with_unions_buildings() {
        let mut a = street(1, vec![GeoPoint::new(0.0, 0.0)]);
        a.add_building_check_by_id(Building::new(1, "1", GeoPoint::new(0.0, 0.0)));
        let mut b = street(2, vec![GeoPoint::new(0.0, 0.001)]);
        b.add_building_check_by_id(Building::new(1, "1", GeoPoint::new(0.0, 0.0)));
        b.add_building_check_by_id(Building::new(2, "2", GeoPoint::new(0.0, 0.001)));

        a.merge_with(b);
        assert_eq!(a.id, 1);
        assert_eq!(a.buildings.len(), 2);
        assert_eq!(a.way_nodes.len(), 2);
    }

    #[test]
    fn test_interpolation_parse() {
        assert_eq!(BuildingInterpolation::parse("Even"), Some(BuildingInterpolation::Even));
        assert_eq!(BuildingInterpolation::parse("2"), None);
    }
}

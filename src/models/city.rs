//! Settlements and their classification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::GeoPoint;

/// Settlement classification, parsed from the OSM `place` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CityType {
    City,
    Town,
    Village,
    Hamlet,
    Suburb,
    District,
    Neighbourhood,
    IsolatedDwelling,
    Locality,
    /// Synthetic city grouping addresses of one postcode
    Postcode,
    /// Synthetic city standing for an unmatched boundary
    Boundary,
}

impl CityType {
    /// Parse a `place=*` value.
    pub fn from_place(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "city" => Some(CityType::City),
            "town" => Some(CityType::Town),
            "village" => Some(CityType::Village),
            "hamlet" => Some(CityType::Hamlet),
            "suburb" => Some(CityType::Suburb),
            "district" | "borough" => Some(CityType::District),
            "neighbourhood" | "neighborhood" | "quarter" => Some(CityType::Neighbourhood),
            "isolated_dwelling" => Some(CityType::IsolatedDwelling),
            "locality" => Some(CityType::Locality),
            _ => None,
        }
    }

    /// Influence radius in meters used when no override is configured.
    pub fn default_radius(&self) -> f64 {
        match self {
            CityType::City => 10_000.0,
            CityType::Town => 4_000.0,
            CityType::Village => 1_300.0,
            CityType::Hamlet => 1_000.0,
            CityType::Suburb => 400.0,
            CityType::District => 400.0,
            CityType::Neighbourhood => 300.0,
            CityType::IsolatedDwelling => 100.0,
            CityType::Locality => 1_000.0,
            CityType::Postcode => 500.0,
            CityType::Boundary => 1.0,
        }
    }

    /// Cities and towns live in the coarse search grid and the settlement block.
    pub fn is_settlement(&self) -> bool {
        matches!(self, CityType::City | CityType::Town)
    }

    /// Whether this type is emitted as a top-level entry of an address block.
    ///
    /// The excluded types still act as sub-areas and as attached places.
    pub fn stored_as_separate(&self) -> bool {
        !matches!(
            self,
            CityType::District
                | CityType::Neighbourhood
                | CityType::IsolatedDwelling
                | CityType::Locality
        )
    }

    /// Types stamped with their parent's name when found inside its boundary.
    pub fn is_minor_place(&self) -> bool {
        matches!(
            self,
            CityType::Hamlet
                | CityType::Neighbourhood
                | CityType::IsolatedDwelling
                | CityType::Locality
        )
    }

    /// Wire code used in the binary index.
    pub fn code(&self) -> u8 {
        match self {
            CityType::City => 0,
            CityType::Town => 1,
            CityType::Village => 2,
            CityType::Hamlet => 3,
            CityType::Suburb => 4,
            CityType::District => 5,
            CityType::Neighbourhood => 6,
            CityType::IsolatedDwelling => 7,
            CityType::Locality => 8,
            CityType::Postcode => 9,
            CityType::Boundary => 10,
        }
    }

    pub fn all() -> &'static [CityType] {
        &[
            CityType::City,
            CityType::Town,
            CityType::Village,
            CityType::Hamlet,
            CityType::Suburb,
            CityType::District,
            CityType::Neighbourhood,
            CityType::IsolatedDwelling,
            CityType::Locality,
            CityType::Postcode,
            CityType::Boundary,
        ]
    }
}

/// Handle into the city arena of [`crate::storage::CityStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CityId(pub u32);

/// A named settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct City {
    /// Packed source entity id
    pub id: i64,
    pub name: String,
    /// Names keyed by language code
    #[serde(default)]
    pub localized: BTreeMap<String, String>,
    pub city_type: CityType,
    pub location: GeoPoint,
    /// Name of the enclosing place, set during boundary resolution
    #[serde(default)]
    pub is_in: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(skip)]
    pub closest_city: Option<CityId>,
}

impl City {
    pub fn new(id: i64, name: impl Into<String>, city_type: CityType, location: GeoPoint) -> Self {
        Self {
            id,
            name: name.into(),
            localized: BTreeMap::new(),
            city_type,
            location,
            is_in: None,
            postcode: None,
            closest_city: None,
        }
    }

    pub fn name_eq_ignore_case(&self, other: &str) -> bool {
        self.name.to_lowercase() == other.to_lowercase()
    }
}

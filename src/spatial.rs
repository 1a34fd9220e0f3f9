//! Two-granularity nearest-settlement index.
//!
//! Cities and towns go into a coarse tree searched over a wide radius, all
//! other places into a fine tree searched over a short one.

use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::config::SpatialSettings;
use crate::models::{CityId, CityType, GeoPoint};

type IndexedCity = GeomWithData<[f64; 2], CityId>;

/// Rough meters per degree of latitude, used only to size the envelope query.
const METERS_PER_DEGREE: f64 = 111_320.0;

pub struct CityIndex {
    settlements: RTree<IndexedCity>,
    villages: RTree<IndexedCity>,
    settlement_radius_m: f64,
    village_radius_m: f64,
}

impl CityIndex {
    pub fn new(settings: &SpatialSettings) -> Self {
        Self {
            settlements: RTree::new(),
            villages: RTree::new(),
            settlement_radius_m: settings.settlement_radius_m,
            village_radius_m: settings.village_radius_m,
        }
    }

    pub fn register(&mut self, location: GeoPoint, city_type: CityType, city: CityId) {
        let entry = GeomWithData::new([location.lon, location.lat], city);
        if city_type.is_settlement() {
            self.settlements.insert(entry);
        } else {
            self.villages.insert(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.settlements.size() + self.villages.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidate cities around `location`: settlements first, then villages,
    /// each group ordered by distance and cut to `limit` entries when given.
    pub fn nearest(&self, location: GeoPoint, limit: Option<usize>) -> Vec<CityId> {
        let mut result = Self::within(&self.settlements, location, self.settlement_radius_m, limit);
        result.extend(Self::within(&self.villages, location, self.village_radius_m, limit));
        result
    }

    fn within(
        tree: &RTree<IndexedCity>,
        location: GeoPoint,
        radius_m: f64,
        limit: Option<usize>,
    ) -> Vec<CityId> {
        // Longitude degrees shrink towards the poles; size the query in
        // longitude degrees so nothing inside the radius is missed.
        let cos_lat = location.lat.to_radians().cos().abs().max(0.01);
        let radius_deg = radius_m / (METERS_PER_DEGREE * cos_lat);

        let mut hits: Vec<(f64, CityId)> = tree
            .locate_within_distance([location.lon, location.lat], radius_deg * radius_deg)
            .map(|entry| {
                let [lon, lat] = *entry.geom();
                (location.distance_m(&GeoPoint::new(lat, lon)), entry.data)
            })
            .filter(|(d, _)| *d <= radius_m)
            .collect();

        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let take = limit.unwrap_or(hits.len());
        hits.into_iter().take(take).map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> CityIndex {
        CityIndex::new(&SpatialSettings::default())
    }

    #[test]
    fn test_settlements_before_villages() {
        let mut idx = index();
        idx.register(GeoPoint::new(50.0, 10.0), CityType::Village, CityId(0));
        idx.register(GeoPoint::new(50.05, 10.0), CityType::Town, CityId(1));

        let found = idx.nearest(GeoPoint::new(50.0, 10.0), None);
        assert_eq!(found, vec![CityId(1), CityId(0)]);
    }

    #[test]
    fn test_ordered_by_distance_and_limited() {
        let mut idx = index();
        idx.register(GeoPoint::new(50.0, 10.03), CityType::City, CityId(0));
        idx.register(GeoPoint::new(50.0, 10.01), CityType::City, CityId(1));
        idx.register(GeoPoint::new(50.0, 10.02), CityType::Town, CityId(2));

        let found = idx.nearest(GeoPoint::new(50.0, 10.0), Some(2));
        assert_eq!(found, vec![CityId(1), CityId(2)]);
    }

    #[test]
    fn test_village_radius_is_shorter() {
        let mut idx = index();
        // ~22 km away: inside settlement radius, outside village radius
        idx.register(GeoPoint::new(50.2, 10.0), CityType::Village, CityId(0));
        idx.register(GeoPoint::new(50.2, 10.0), CityType::Town, CityId(1));

        let found = idx.nearest(GeoPoint::new(50.0, 10.0), None);
        assert_eq!(found, vec![CityId(1)]);
        assert_eq!(idx.len(), 2);
    }
}

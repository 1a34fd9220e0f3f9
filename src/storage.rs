//! In-memory arena of cities and boundaries plus the relations between them.
//!
//! Cities and boundaries are addressed by dense handles; every cross
//! reference (city -> boundary, boundary -> city, boundary -> contained
//! cities) is a handle lookup in this storage.

use hashbrown::HashMap;

use crate::config::SpatialSettings;
use crate::models::{Boundary, BoundaryId, City, CityId, GeoPoint};
use crate::spatial::CityIndex;

pub struct CityStorage {
    cities: Vec<City>,
    boundaries: Vec<Boundary>,
    index: CityIndex,
    by_source: HashMap<i64, CityId>,
    /// Boundary adopted by a city
    city_boundary: HashMap<CityId, BoundaryId>,
    /// City a boundary was matched to when it was indexed
    boundary_city: HashMap<BoundaryId, CityId>,
    /// Cities whose point lies inside the boundary
    contained: HashMap<BoundaryId, Vec<CityId>>,
    not_assigned: Vec<BoundaryId>,
}

impl CityStorage {
    pub fn new(settings: &SpatialSettings) -> Self {
        Self {
            cities: Vec::new(),
            boundaries: Vec::new(),
            index: CityIndex::new(settings),
            by_source: HashMap::new(),
            city_boundary: HashMap::new(),
            boundary_city: HashMap::new(),
            contained: HashMap::new(),
            not_assigned: Vec::new(),
        }
    }

    /// Register a city, returning the existing handle if its source entity was
    /// registered before.
    pub fn register_city(&mut self, city: City) -> CityId {
        if let Some(existing) = self.by_source.get(&city.id) {
            return *existing;
        }
        let id = CityId(self.cities.len() as u32);
        self.index.register(city.location, city.city_type, id);
        self.by_source.insert(city.id, id);
        self.cities.push(city);
        id
    }

    pub fn city(&self, id: CityId) -> &City {
        &self.cities[id.0 as usize]
    }

    pub fn city_mut(&mut self, id: CityId) -> &mut City {
        &mut self.cities[id.0 as usize]
    }

    pub fn cities(&self) -> impl Iterator<Item = (CityId, &City)> {
        self.cities
            .iter()
            .enumerate()
            .map(|(i, c)| (CityId(i as u32), c))
    }

    pub fn city_count(&self) -> usize {
        self.cities.len()
    }

    /// Candidate cities around a point, settlements first.
    pub fn nearest(&self, location: GeoPoint, limit: Option<usize>) -> Vec<CityId> {
        self.index.nearest(location, limit)
    }

    pub fn add_boundary(&mut self, boundary: Boundary) -> BoundaryId {
        let id = BoundaryId(self.boundaries.len() as u32);
        self.boundaries.push(boundary);
        id
    }

    pub fn boundary(&self, id: BoundaryId) -> &Boundary {
        &self.boundaries[id.0 as usize]
    }

    pub fn boundary_mut(&mut self, id: BoundaryId) -> &mut Boundary {
        &mut self.boundaries[id.0 as usize]
    }

    pub fn boundary_count(&self) -> usize {
        self.boundaries.len()
    }

    pub fn boundary_of(&self, city: CityId) -> Option<BoundaryId> {
        self.city_boundary.get(&city).copied()
    }

    pub fn set_boundary_of(&mut self, city: CityId, boundary: BoundaryId) {
        self.city_boundary.insert(city, boundary);
    }

    pub fn city_of_boundary(&self, boundary: BoundaryId) -> Option<CityId> {
        self.boundary_city.get(&boundary).copied()
    }

    pub fn set_city_of_boundary(&mut self, boundary: BoundaryId, city: CityId) {
        self.boundary_city.insert(boundary, city);
    }

    pub fn contained_cities(&self, boundary: BoundaryId) -> &[CityId] {
        self.contained
            .get(&boundary)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_contained_cities(&mut self, boundary: BoundaryId, cities: Vec<CityId>) {
        self.contained.insert(boundary, cities);
    }

    /// Boundaries that recorded at least one contained city.
    pub fn populated_boundaries(&self) -> impl Iterator<Item = (BoundaryId, &Boundary)> {
        let mut ids: Vec<BoundaryId> = self.contained.keys().copied().collect();
        ids.sort();
        ids.into_iter().map(move |id| (id, self.boundary(id)))
    }

    pub fn not_assigned(&self) -> &[BoundaryId] {
        &self.not_assigned
    }

    pub fn push_not_assigned(&mut self, boundary: BoundaryId) {
        self.not_assigned.push(boundary);
    }

    pub fn remove_not_assigned(&mut self, boundary: BoundaryId) {
        self.not_assigned.retain(|b| *b != boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CityType;

    #[test]
    fn test_register_city_is_idempotent_per_source() {
        let mut storage = CityStorage::new(&SpatialSettings::default());
        let a = storage.register_city(City::new(
            10,
            "Springfield",
            CityType::Town,
            GeoPoint::new(10.0, 10.0),
        ));
        let b = storage.register_city(City::new(
            10,
            "Springfield",
            CityType::Town,
            GeoPoint::new(10.0, 10.0),
        ));
        assert_eq!(a, b);
        assert_eq!(storage.city_count(), 1);
        assert_eq!(storage.nearest(GeoPoint::new(10.0, 10.0), None), vec![a]);
    }

    #[test]
    fn test_not_assigned_pool() {
        let mut storage = CityStorage::new(&SpatialSettings::default());
        let b = storage.add_boundary(Boundary::new(1, "X", geo::MultiPolygon::new(vec![])));
        storage.push_not_assigned(b);
        assert_eq!(storage.not_assigned(), &[b]);
        storage.remove_not_assigned(b);
        assert!(storage.not_assigned().is_empty());
    }
}

//! Boundary extraction and boundary-to-city resolution.

use tracing::{debug, info, warn};

use super::AddressIndexer;
use crate::models::{Boundary, BoundaryId, City, CityId, CityType, GeoPoint, OsmType};
use crate::osm::rings::{assemble_multipolygon, way_coords};
use crate::osm::Entity;
use crate::progress::Progress;

/// Lower is better. Place boundaries named like the city win outright,
/// then municipal levels (8, 7, 6) ahead of districts (9, 10).
fn admin_level_importance(level: Option<i32>) -> i32 {
    match level {
        Some(8) => 1,
        Some(7) => 2,
        Some(6) => 3,
        Some(9) => 4,
        Some(10) => 5,
        Some(_) => 6,
        None => 5,
    }
}

/// How well `boundary` describes `city`; lower is better.
pub fn boundary_importance(boundary: &Boundary, city: &City) -> i32 {
    let level = admin_level_importance(boundary.admin_level);
    let is_center = boundary.admin_center_id == Some(city.id);
    if boundary.name_matches(&city.name) {
        if boundary.city_type.is_some() {
            0
        } else if is_center || boundary.admin_center_id.is_none() {
            level
        } else {
            10 + level
        }
    } else if is_center {
        20 + level
    } else {
        30 + level
    }
}

/// "lower " at the start, " lower" at the end, or " lower " in the middle.
fn name_contains(boundary_name: &str, city_name: &str) -> bool {
    let boundary_name = boundary_name.to_lowercase();
    let city_name = city_name.to_lowercase();
    boundary_name.starts_with(&format!("{} ", city_name))
        || boundary_name.ends_with(&format!(" {}", city_name))
        || boundary_name.contains(&format!(" {} ", city_name))
}

impl AddressIndexer {
    /// Extract a boundary from an administrative or place entity, resolve the
    /// city it belongs to and record which cities it contains.
    pub fn index_boundary(&mut self, entity: &Entity) -> Option<BoundaryId> {
        // Postcode areas only feed postcode assignment.
        if entity.tag("boundary") == Some("postal_code") {
            return None;
        }
        let mut boundary = self.extract_boundary(entity)?;
        if !boundary.is_valid() {
            warn!(
                "Not using boundary {} '{}' (admin level {:?})",
                entity.entity_id(),
                boundary.name,
                boundary.admin_level
            );
            return None;
        }
        let center = boundary.center()?;

        let candidates = self
            .storage
            .nearest(center, Some(self.settings.spatial.boundary_candidates));
        let mut city_found = self.match_admin_center(&boundary, &candidates);
        match city_found {
            Some(city) => boundary.city_type = Some(self.storage.city(city).city_type),
            None => city_found = self.match_city_name(&boundary, &candidates),
        }

        if city_found.is_none() {
            if let Some(
                city_type @ (CityType::Town | CityType::Hamlet | CityType::Suburb | CityType::Village),
            ) = boundary.city_type
            {
                if let Some(city) = self.create_missing_city(entity, city_type) {
                    boundary.admin_center_id = Some(self.storage.city(city).id);
                    city_found = Some(city);
                }
            }
        }

        let name = boundary.name.clone();
        let id = self.storage.add_boundary(boundary);
        match city_found {
            Some(city) => {
                self.storage.set_city_of_boundary(id, city);
                self.put_city_boundary(id, city);
            }
            None => {
                debug!("No city found for boundary '{}'", name);
                self.storage.push_not_assigned(id);
            }
        }
        self.attach_all_cities_to_boundary(id);
        Some(id)
    }

    /// Build the boundary geometry and attributes without resolving anything.
    pub(crate) fn extract_boundary(&mut self, entity: &Entity) -> Option<Boundary> {
        if entity.osm_type() == OsmType::Node {
            return None;
        }

        let mut admin_center_id = None;
        let mut city_type = entity.tag("place").and_then(CityType::from_place);

        let townland = city_type.is_none() && entity.tag("locality") == Some("townland");
        let addressed_neighbourhood =
            entity.tag("place") == Some("neighbourhood") && entity.tag("addr:place").is_some();
        if townland || addressed_neighbourhood {
            if let Some(city) = self.create_missing_city(entity, CityType::Suburb) {
                admin_center_id = Some(self.storage.city(city).id);
                city_type = Some(CityType::Suburb);
            }
        }

        let area_boundary = matches!(
            entity.tag("boundary"),
            Some("administrative" | "census" | "postal_code")
        );
        if !area_boundary && city_type.is_none() {
            return None;
        }
        if entity.osm_type() == OsmType::Way && self.visited_boundary_ways.contains(&entity.id) {
            return None;
        }

        let name = entity.name().unwrap_or_default().to_string();
        let mut outer = Vec::new();
        let mut inner = Vec::new();

        for member in entity.members() {
            match member.entity.osm_type() {
                OsmType::Way if member.role == "inner" => inner.push(way_coords(&member.entity)),
                OsmType::Way => {
                    let way_name = member.entity.name();
                    if way_name.is_none() || way_name == Some(name.as_str()) {
                        self.visited_boundary_ways.insert(member.entity.id);
                    }
                    outer.push(way_coords(&member.entity));
                }
                OsmType::Node if member.role == "admin_centre" || member.role == "admin_center" => {
                    admin_center_id = Some(member.entity.packed_id());
                }
                OsmType::Node if member.role == "label" && admin_center_id.is_none() => {
                    admin_center_id = Some(member.entity.packed_id());
                }
                _ => {}
            }
        }
        if entity.osm_type() == OsmType::Way {
            outer.push(way_coords(entity));
        }

        let mut boundary = Boundary::new(
            entity.packed_id(),
            name,
            assemble_multipolygon(outer, inner),
        );
        boundary.alt_name = entity.tag("short_name").map(str::to_string);
        boundary.admin_level = entity.tag("admin_level").and_then(|l| l.parse().ok());
        boundary.city_type = city_type;
        boundary.admin_center_id = admin_center_id;
        Some(boundary)
    }

    /// Candidate that is the boundary's `admin_centre` node.
    fn match_admin_center(&self, boundary: &Boundary, candidates: &[CityId]) -> Option<CityId> {
        let center = boundary.admin_center_id?;
        candidates
            .iter()
            .find(|id| self.storage.city(**id).id == center)
            .copied()
    }

    /// Candidate inside the boundary whose name equals the boundary (or alt)
    /// name, else one whose name is contained in it.
    fn match_city_name(&self, boundary: &Boundary, candidates: &[CityId]) -> Option<CityId> {
        let cities: Vec<(CityId, &City)> = candidates
            .iter()
            .map(|id| (*id, self.storage.city(*id)))
            .collect();

        if let Some((id, _)) = cities
            .iter()
            .find(|(_, c)| boundary.name_matches(&c.name) && boundary.contains(c.location))
        {
            return Some(*id);
        }
        cities
            .iter()
            .find(|(_, c)| {
                let alt_contains = boundary
                    .alt_name
                    .as_deref()
                    .is_some_and(|alt| name_contains(alt, &c.name));
                (name_contains(&boundary.name, &c.name) || alt_contains)
                    && boundary.contains(c.location)
            })
            .map(|(id, _)| *id)
    }

    /// Give `city` the boundary unless it already holds a better one. Two
    /// same-level boundaries with the same name are merged instead.
    fn put_city_boundary(&mut self, boundary: BoundaryId, city: CityId) {
        let Some(old) = self.storage.boundary_of(city) else {
            self.storage.set_boundary_of(city, boundary);
            self.log_boundary_changed(boundary, city);
            return;
        };
        if old == boundary {
            return;
        }

        let new_b = self.storage.boundary(boundary);
        let old_b = self.storage.boundary(old);
        if old_b.admin_level == new_b.admin_level
            && old_b.name.to_lowercase() == new_b.name.to_lowercase()
        {
            let absorbed = new_b.clone();
            self.storage.boundary_mut(old).merge(&absorbed);
            return;
        }

        let c = self.storage.city(city);
        let old_importance = boundary_importance(old_b, c);
        let new_importance = boundary_importance(new_b, c);
        if new_importance < old_importance {
            self.storage.set_boundary_of(city, boundary);
            self.log_boundary_changed(boundary, city);
        }
    }

    fn log_boundary_changed(&self, boundary: BoundaryId, city: CityId) {
        let b = self.storage.boundary(boundary);
        let c = self.storage.city(city);
        debug!(
            "City '{}' gets boundary '{}' (admin level {:?}, importance {})",
            c.name,
            b.name,
            b.admin_level,
            boundary_importance(b, c)
        );
    }

    /// Record every city inside the boundary, stamping `is_in` and the
    /// closest city on those that do not have them yet.
    fn attach_all_cities_to_boundary(&mut self, boundary: BoundaryId) {
        let owner = self.storage.city_of_boundary(boundary);
        let b = self.storage.boundary(boundary);
        let name = b.name.clone();
        let contained: Vec<CityId> = self
            .storage
            .cities()
            .filter(|(_, c)| b.contains(c.location))
            .map(|(id, _)| id)
            .collect();

        for id in &contained {
            let city = self.storage.city_mut(*id);
            if city.name != name {
                if city.is_in.is_none() {
                    city.is_in = Some(name.clone());
                }
                if city.closest_city.is_none() {
                    city.closest_city = owner;
                }
            }
        }
        if !contained.is_empty() {
            self.storage.set_contained_cities(boundary, contained);
        }
    }

    /// Cities and towns left without a boundary take the most specific
    /// unassigned boundary (admin level 7 or deeper) containing them.
    pub fn assign_boundaries_to_free_cities(&mut self, progress: &dyn Progress) {
        let free: Vec<(CityId, GeoPoint)> = self
            .storage
            .cities()
            .filter(|(id, c)| {
                c.city_type.is_settlement() && self.storage.boundary_of(*id).is_none()
            })
            .map(|(id, c)| (id, c.location))
            .collect();

        progress.start_task("Assigning boundaries to free cities", free.len() as u64);
        let mut assigned = 0;
        for (city, location) in free {
            // Starts over at 7 for every city, so one city's deep boundary
            // does not hide shallower ones from the next.
            let mut smallest_level = 7;
            let mut best = None;
            for id in self.storage.not_assigned() {
                let b = self.storage.boundary(*id);
                if let Some(level) = b.admin_level {
                    if level >= smallest_level && b.contains(location) {
                        smallest_level = level;
                        best = Some(*id);
                    }
                }
            }
            if let Some(best) = best {
                self.put_city_boundary(best, city);
                self.storage.remove_not_assigned(best);
                assigned += 1;
            }
            progress.progress(1);
        }
        progress.finish_task();
        info!("Assigned {} unmatched boundaries to free cities", assigned);
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::config::IndexerSettings;
    use crate::osm::Member;
    use crate::progress::NoProgress;

    fn indexer() -> AddressIndexer {
        AddressIndexer::temporary(IndexerSettings::default()).unwrap()
    }

    #[test]
    fn test_importance_table() {
        let mut b = Boundary::new(1, "Springfield", geo::MultiPolygon::new(vec![]));
        let city = City::new(50, "Springfield", CityType::Town, GeoPoint::new(0.0, 0.0));
        b.admin_level = Some(8);
        assert_eq!(boundary_importance(&b, &city), 1);
        b.admin_center_id = Some(51);
        assert_eq!(boundary_importance(&b, &city), 11);
        b.admin_center_id = Some(50);
        assert_eq!(boundary_importance(&b, &city), 1);
        b.city_type = Some(CityType::Town);
        assert_eq!(boundary_importance(&b, &city), 0);

        let mut county = Boundary::new(2, "Springfield County", geo::MultiPolygon::new(vec![]));
        county.admin_level = Some(6);
        assert_eq!(boundary_importance(&county, &city), 33);
        county.admin_center_id = Some(50);
        assert_eq!(boundary_importance(&county, &city), 23);
        county.admin_level = None;
        assert_eq!(boundary_importance(&county, &city), 25);
    }

    #[test]
    fn test_name_contains() {
        assert!(name_contains("Springfield County", "springfield"));
        assert!(name_contains("City of Springfield", "Springfield"));
        assert!(name_contains("Greater Springfield Area", "Springfield"));
        assert!(!name_contains("Springfieldshire", "Springfield"));
    }

    #[test]
    fn test_city_keeps_most_specific_boundary() {
        let mut idx = indexer();
        let town = idx
            .register_city(&place(1, "Springfield", "town", 10.05, 10.05))
            .unwrap();

        let own = boundary_relation(100, "Springfield", "8", square_way(200, 10.0, 10.0, 0.1))
            .with_tag("place", "town");
        let own_id = idx.index_boundary(&own).unwrap();
        assert_eq!(idx.storage().boundary_of(town), Some(own_id));
        let b = idx.storage().boundary(own_id);
        assert_eq!(boundary_importance(b, idx.storage().city(town)), 0);

        let county = boundary_relation(
            101,
            "Springfield County",
            "6",
            square_way(201, 9.5, 9.5, 1.0),
        );
        let county_id = idx.index_boundary(&county).unwrap();
        let cb = idx.storage().boundary(county_id);
        assert_eq!(boundary_importance(cb, idx.storage().city(town)), 33);
        assert_eq!(idx.storage().boundary_of(town), Some(own_id));
        assert_eq!(idx.storage().contained_cities(county_id), &[town]);
    }

    #[test]
    fn test_order_of_competing_boundaries_does_not_matter() {
        for county_first in [false, true] {
            let mut idx = indexer();
            let town = idx
                .register_city(&place(1, "Springfield", "town", 10.05, 10.05))
                .unwrap();
            let own =
                boundary_relation(100, "Springfield", "8", square_way(200, 10.0, 10.0, 0.1));
            let municipality = boundary_relation(
                101,
                "Springfield Municipality",
                "7",
                square_way(201, 9.9, 9.9, 0.3),
            );
            let (first, second) = if county_first {
                (&municipality, &own)
            } else {
                (&own, &municipality)
            };
            idx.index_boundary(first);
            idx.index_boundary(second);

            let kept = idx.storage().boundary_of(town).unwrap();
            assert_eq!(idx.storage().boundary(kept).name, "Springfield");
        }
    }

    #[test]
    fn test_admin_center_match_beats_name() {
        let mut idx = indexer();
        let capital = idx
            .register_city(&place(1, "Capital", "city", 10.05, 10.05))
            .unwrap();
        let rel = Entity::relation(
            100,
            vec![
                Member::new("outer", square_way(200, 10.0, 10.0, 0.1)),
                Member::new("admin_centre", place(1, "Capital", "city", 10.05, 10.05)),
            ],
        )
        .with_tag("boundary", "administrative")
        .with_tag("admin_level", "6")
        .with_tag("name", "Some District");
        let id = idx.index_boundary(&rel).unwrap();
        assert_eq!(idx.storage().boundary_of(capital), Some(id));
        assert_eq!(idx.storage().city_of_boundary(id), Some(capital));
    }

    #[test]
    fn test_admin_center_match_takes_city_type() {
        let mut idx = indexer();
        let town = idx
            .register_city(&place(1, "Springfield", "town", 10.05, 10.05))
            .unwrap();
        let district = Entity::relation(
            100,
            vec![
                Member::new("outer", square_way(200, 10.0, 10.0, 0.1)),
                Member::new("admin_centre", place(1, "Springfield", "town", 10.05, 10.05)),
            ],
        )
        .with_tag("boundary", "administrative")
        .with_tag("admin_level", "9")
        .with_tag("name", "Springfield");
        let district_id = idx.index_boundary(&district).unwrap();
        let b = idx.storage().boundary(district_id);
        assert_eq!(b.city_type, Some(CityType::Town));
        assert_eq!(boundary_importance(b, idx.storage().city(town)), 0);

        // A level 8 boundary of the same name scores 1 and does not replace it
        let own = boundary_relation(101, "Springfield", "8", square_way(201, 9.95, 9.95, 0.2));
        idx.index_boundary(&own).unwrap();
        assert_eq!(idx.storage().boundary_of(town), Some(district_id));
    }

    #[test]
    fn test_alt_name_containing_city_matches() {
        let mut idx = indexer();
        let town = idx
            .register_city(&place(1, "Springfield", "town", 10.05, 10.05))
            .unwrap();
        let rel = boundary_relation(100, "Gemeinde 42", "8", square_way(200, 10.0, 10.0, 0.1))
            .with_tag("short_name", "Springfield Township");
        let id = idx.index_boundary(&rel).unwrap();
        assert_eq!(idx.storage().city_of_boundary(id), Some(town));
        assert_eq!(idx.storage().boundary_of(town), Some(id));
    }

    #[test]
    fn test_same_level_same_name_boundaries_merge() {
        let mut idx = indexer();
        let town = idx
            .register_city(&place(1, "Springfield", "town", 10.05, 10.05))
            .unwrap();
        let part_a = boundary_relation(100, "Springfield", "8", square_way(200, 10.0, 10.0, 0.1));
        let part_b = boundary_relation(101, "Springfield", "8", square_way(201, 10.0, 10.0, 0.1));
        let a = idx.index_boundary(&part_a).unwrap();
        idx.index_boundary(&part_b).unwrap();
        assert_eq!(idx.storage().boundary_of(town), Some(a));
        assert_eq!(idx.storage().boundary(a).geometry.0.len(), 2);
    }

    #[test]
    fn test_invalid_boundaries_are_ignored() {
        let mut idx = indexer();
        let country = boundary_relation(100, "Freedonia", "2", square_way(200, 0.0, 0.0, 5.0));
        assert!(idx.index_boundary(&country).is_none());
        let unnamed = Entity::relation(101, vec![Member::new("outer", square_way(201, 0.0, 0.0, 1.0))])
            .with_tag("boundary", "administrative");
        assert!(idx.index_boundary(&unnamed).is_none());
        let not_a_boundary = square_way(202, 0.0, 0.0, 1.0).with_tag("name", "Park");
        assert!(idx.index_boundary(&not_a_boundary).is_none());
        assert_eq!(idx.storage().boundary_count(), 0);
    }

    #[test]
    fn test_place_boundary_creates_missing_town() {
        let mut idx = indexer();
        let way = square_way(300, 20.0, 20.0, 0.05)
            .with_tag("place", "village")
            .with_tag("name", "Ogdenville");
        let id = idx.index_boundary(&way).unwrap();
        let city = idx.storage().city_of_boundary(id).unwrap();
        assert_eq!(idx.storage().city(city).name, "Ogdenville");
        assert_eq!(idx.storage().city(city).city_type, CityType::Village);
        assert_eq!(
            idx.storage().boundary(id).admin_center_id,
            Some(idx.storage().city(city).id)
        );
    }

    #[test]
    fn test_townland_becomes_suburb() {
        let mut idx = indexer();
        let way = square_way(300, 20.0, 20.0, 0.05)
            .with_tag("locality", "townland")
            .with_tag("name", "Ballymore");
        let id = idx.index_boundary(&way).unwrap();
        let city = idx.storage().city_of_boundary(id).unwrap();
        assert_eq!(idx.storage().city(city).city_type, CityType::Suburb);
    }

    #[test]
    fn test_containment_stamps_is_in() {
        let mut idx = indexer();
        let town = idx
            .register_city(&place(1, "Springfield", "town", 10.05, 10.05))
            .unwrap();
        let suburb = idx
            .register_city(&place(2, "North Haverbrook", "suburb", 10.08, 10.08))
            .unwrap();
        let own = boundary_relation(100, "Springfield", "8", square_way(200, 10.0, 10.0, 0.1));
        let id = idx.index_boundary(&own).unwrap();

        let s = idx.storage().city(suburb);
        assert_eq!(s.is_in.as_deref(), Some("Springfield"));
        assert_eq!(s.closest_city, Some(town));
        assert!(idx.storage().city(town).is_in.is_none());
        assert_eq!(idx.storage().contained_cities(id).len(), 2);
    }

    #[test]
    fn test_visited_outer_way_is_skipped_later() {
        let mut idx = indexer();
        idx.register_city(&place(1, "Springfield", "town", 10.05, 10.05));
        let area = square_way(200, 10.0, 10.0, 0.1);
        let rel = boundary_relation(100, "Springfield", "8", area.clone());
        idx.index_boundary(&rel).unwrap();

        let same_way = area
            .with_tag("boundary", "administrative")
            .with_tag("name", "Springfield")
            .with_tag("admin_level", "8");
        assert!(idx.index_boundary(&same_way).is_none());
    }

    #[test]
    fn test_free_city_takes_deepest_unassigned_boundary() {
        let mut idx = indexer();
        let county = boundary_relation(100, "Shelby County", "7", square_way(200, 10.0, 10.0, 1.0));
        let ward = boundary_relation(101, "Ward 9", "9", square_way(201, 10.0, 10.0, 0.2));
        let coarse = boundary_relation(102, "Region", "5", square_way(202, 9.0, 9.0, 3.0));
        idx.index_boundary(&coarse).unwrap();
        let county_id = idx.index_boundary(&county).unwrap();
        let ward_id = idx.index_boundary(&ward).unwrap();
        assert_eq!(idx.storage().not_assigned().len(), 3);

        let town = idx
            .register_city(&place(1, "Shelbyville", "town", 10.1, 10.1))
            .unwrap();
        idx.assign_boundaries_to_free_cities(&NoProgress);
        assert_eq!(idx.storage().boundary_of(town), Some(ward_id));
        assert!(!idx.storage().not_assigned().contains(&ward_id));
        assert!(idx.storage().not_assigned().contains(&county_id));
    }
}

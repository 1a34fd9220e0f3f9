//! Street-to-city and street-to-sub-area resolution.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::AddressIndexer;
use crate::error::Result;
use crate::models::{BoundaryId, CityId, GeoPoint};

impl AddressIndexer {
    /// Ids of the street named `name` (or `street_ref`) in every city the
    /// location belongs to, registering streets that do not exist yet.
    ///
    /// A street without name and ref is filed as `<City>`, with the city's
    /// localized names bracketed the same way. This keeps addresses tied
    /// only to a place name.
    ///
    /// Places that are never written as cities of their own do not own
    /// streets.
    pub fn resolve_street_ids(
        &mut self,
        is_in: &HashSet<String>,
        name: Option<&str>,
        localized: &BTreeMap<String, String>,
        street_ref: Option<&str>,
        location: Option<GeoPoint>,
    ) -> Result<BTreeSet<i64>> {
        let mut ids = BTreeSet::new();
        let Some(location) = location else {
            return Ok(ids);
        };
        let name = name
            .or(street_ref)
            .map(|n| self.normalizer.normalize(n))
            .filter(|n| !n.is_empty());

        for city in self.find_cities_for_point(is_in, location) {
            let id = match &name {
                Some(n) => self.get_or_register_street_id(n, localized, location, city)?,
                None => {
                    let c = self.storage.city(city);
                    let placeholder = format!("<{}>", c.name);
                    let names: BTreeMap<String, String> = c
                        .localized
                        .iter()
                        .map(|(lang, n)| (lang.clone(), format!("<{}>", n)))
                        .collect();
                    self.get_or_register_street_id(&placeholder, &names, location, city)?
                }
            };
            ids.insert(id);
        }
        Ok(ids)
    }

    /// Cities a point belongs to: those it declares or whose boundary
    /// contains it, plus close-enough cities without a boundary. When nothing
    /// qualifies, the relatively closest city.
    pub fn find_cities_for_point(&self, is_in: &HashSet<String>, location: GeoPoint) -> Vec<CityId> {
        let candidates = self.storage.nearest(location, None);
        let mut result: Vec<CityId> = Vec::new();

        for id in &candidates {
            let city = self.storage.city(*id);
            // Types never written as cities would swallow the street.
            if !city.city_type.stored_as_separate() {
                continue;
            }
            let inside = is_in.contains(&city.name)
                || self
                    .storage
                    .boundary_of(*id)
                    .is_some_and(|b| self.storage.boundary(b).contains(location));
            if inside && !result.contains(id) {
                result.push(*id);
            }
        }

        let mut ranked: Vec<(f64, CityId)> = candidates
            .iter()
            .filter(|id| self.storage.city(**id).city_type.stored_as_separate())
            .map(|id| (self.relative_distance(location, *id), *id))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        for (distance, id) in ranked {
            if distance > self.settings.close_enough_relative_distance {
                if result.is_empty() {
                    result.push(id);
                }
                break;
            }
            if !result.contains(&id) && (self.storage.boundary_of(id).is_none() || result.is_empty()) {
                result.push(id);
            }
        }
        result
    }

    /// Distance to the city in units of its type radius.
    fn relative_distance(&self, location: GeoPoint, city: CityId) -> f64 {
        let c = self.storage.city(city);
        location.distance_m(&c.location) / self.settings.radii.radius(c.city_type)
    }

    fn get_or_register_street_id(
        &mut self,
        name: &str,
        localized: &BTreeMap<String, String>,
        location: GeoPoint,
        city: CityId,
    ) -> Result<i64> {
        let city_part = self.find_city_part(location, city);
        let c = self.storage.city(city);
        if let Some(found) = self.dao.find_street(name, c, city_part.as_deref()) {
            let id = found.id;
            self.dao.update_street_names(id, localized)?;
            return Ok(id);
        }
        let city_part = city_part.unwrap_or_else(|| c.name.clone());
        self.dao.insert_street(name, localized, location, c, &city_part)
    }

    /// Sub-area of `city` the location falls into.
    ///
    /// Minor places found inside the city's boundary along the way are
    /// stamped with the boundary name as their `is_in`.
    pub fn find_city_part(&mut self, location: GeoPoint, city: CityId) -> Option<String> {
        let parent_boundary = self.storage.boundary_of(city);

        if let Some(parent) = parent_boundary {
            let parent_level = self.storage.boundary(parent).admin_level;
            let subparts = self.storage.contained_cities(parent).to_vec();
            for subpart in subparts {
                if subpart == city {
                    continue;
                }
                let sub_boundary = self
                    .storage
                    .boundary_of(subpart)
                    .filter(|sb| self.storage.boundary(*sb).admin_level > parent_level);

                match sub_boundary {
                    Some(sb) if self.storage.boundary(sb).contains(location) => {
                        return Some(self.storage.city(subpart).name.clone());
                    }
                    Some(_) => {}
                    None => {
                        let parent_b = self.storage.boundary(parent);
                        let sub = self.storage.city(subpart);
                        if sub.city_type.is_minor_place() && parent_b.contains(sub.location) {
                            let stamp = parent_b.name.clone();
                            self.storage.city_mut(subpart).is_in = Some(stamp);
                        }
                    }
                }
            }
        }

        self.find_nearest_city_or_suburb(parent_boundary, location)
    }

    /// Name of the nearest place around `location` that is within 1.5 times
    /// its radius. Candidates come from the boundary's contained cities, or
    /// the spatial index when there is no boundary; the boundary name is the
    /// fallback.
    fn find_nearest_city_or_suburb(
        &self,
        boundary: Option<BoundaryId>,
        location: GeoPoint,
    ) -> Option<String> {
        let (mut result, candidates) = match boundary {
            Some(b) => (
                Some(self.storage.boundary(b).name.clone()),
                self.storage.contained_cities(b).to_vec(),
            ),
            None => (None, self.storage.nearest(location, None)),
        };

        let mut best = f64::MAX;
        for id in candidates {
            let c = self.storage.city(id);
            let distance = location.distance_m(&c.location);
            let reach = self.settings.city_part_radius_factor * self.settings.radii.radius(c.city_type);
            if distance < reach && distance < best {
                result = Some(c.name.clone());
                best = distance;
            }
        }
        result
    }
}

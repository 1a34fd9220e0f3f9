//! Memoized persistence for streets, buildings and street geometry.
//!
//! Every street inserted during ingestion is also kept as a small projection
//! in memory, keyed by (name, city) and (name, city, sub-area), so repeated
//! lookups never touch the store. Writes are queued in the [`RowStore`].

mod store;

pub use store::RowStore;

use hashbrown::{HashMap, HashSet};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::error::{IndexError, Result};
use crate::models::{Building, City, GeoPoint, StreetNode, StreetRow};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreetKey {
    name: String,
    city_id: i64,
    sub_area: Option<String>,
}

impl StreetKey {
    fn new(name: &str, city_id: i64, sub_area: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            city_id,
            sub_area: sub_area.map(str::to_string),
        }
    }
}

/// Cached view of a persisted street.
#[derive(Debug, Clone, PartialEq)]
pub struct StreetProjection {
    pub id: i64,
    pub name: String,
    pub city_id: i64,
    pub sub_area: Option<String>,
    /// Languages with a localized name already stored
    pub languages: BTreeSet<String>,
}

pub struct StreetDao {
    store: RowStore,
    streets: HashMap<i64, StreetProjection>,
    keys: HashMap<StreetKey, i64>,
    /// Building source id -> streets it was written under
    buildings: HashMap<i64, Vec<i64>>,
    street_ways: HashSet<i64>,
    next_street_id: i64,
}

impl StreetDao {
    pub fn new(store: RowStore) -> Self {
        Self {
            store,
            streets: HashMap::new(),
            keys: HashMap::new(),
            buildings: HashMap::new(),
            street_ways: HashSet::new(),
            next_street_id: 1,
        }
    }

    pub fn store(&self) -> &RowStore {
        &self.store
    }

    pub fn street_count(&self) -> usize {
        self.streets.len()
    }

    pub fn street(&self, id: i64) -> Option<&StreetProjection> {
        self.streets.get(&id)
    }

    /// Street named `name` in `city`; with a sub-area the match must also be
    /// in that sub-area.
    pub fn find_street(
        &self,
        name: &str,
        city: &City,
        sub_area: Option<&str>,
    ) -> Option<&StreetProjection> {
        let id = self.keys.get(&StreetKey::new(name, city.id, sub_area))?;
        self.streets.get(id)
    }

    pub fn insert_street(
        &mut self,
        name: &str,
        localized: &BTreeMap<String, String>,
        location: GeoPoint,
        city: &City,
        sub_area: &str,
    ) -> Result<i64> {
        let id = self.next_street_id;
        self.next_street_id += 1;

        let row = StreetRow {
            id,
            name: name.to_string(),
            localized: localized.clone(),
            location,
            city_id: city.id,
            sub_area: Some(sub_area.to_string()),
        };
        self.store.queue_street(&row)?;

        self.keys.insert(StreetKey::new(name, city.id, Some(sub_area)), id);
        self.keys.insert(StreetKey::new(name, city.id, None), id);
        self.streets.insert(
            id,
            StreetProjection {
                id,
                name: name.to_string(),
                city_id: city.id,
                sub_area: Some(sub_area.to_string()),
                languages: localized.keys().cloned().collect(),
            },
        );
        Ok(id)
    }

    /// Store localized names the street does not have yet.
    pub fn update_street_names(
        &mut self,
        street_id: i64,
        localized: &BTreeMap<String, String>,
    ) -> Result<()> {
        let Some(projection) = self.streets.get(&street_id) else {
            return Ok(());
        };
        if localized.keys().all(|lang| projection.languages.contains(lang)) {
            return Ok(());
        }

        self.store.apply_pending()?;
        let mut row = self
            .store
            .street(street_id)?
            .ok_or(IndexError::MissingStreet(street_id))?;
        for (lang, name) in localized {
            row.localized.entry(lang.clone()).or_insert_with(|| name.clone());
        }
        self.store.put_street(&row)?;

        if let Some(projection) = self.streets.get_mut(&street_id) {
            projection.languages = row.localized.keys().cloned().collect();
        }
        Ok(())
    }

    /// Move a street to another sub-area of its city.
    pub fn update_street_city_part(
        &mut self,
        street: &StreetProjection,
        city: &City,
        sub_area: Option<&str>,
    ) -> Result<StreetProjection> {
        debug_assert_eq!(street.city_id, city.id);
        self.set_sub_area(street.id, sub_area)
    }

    fn set_sub_area(&mut self, street_id: i64, sub_area: Option<&str>) -> Result<StreetProjection> {
        // Reads below must observe the queued insert of this street.
        self.store.apply_pending()?;
        let mut row = self
            .store
            .street(street_id)?
            .ok_or(IndexError::MissingStreet(street_id))?;
        let old_key = StreetKey::new(&row.name, row.city_id, row.sub_area.as_deref());
        row.sub_area = sub_area.map(str::to_string);
        self.store.put_street(&row)?;

        if old_key.sub_area.is_some() && self.keys.get(&old_key) == Some(&street_id) {
            self.keys.remove(&old_key);
        }
        if sub_area.is_some() {
            self.keys
                .insert(StreetKey::new(&row.name, row.city_id, sub_area), street_id);
        }

        let projection = self
            .streets
            .get_mut(&street_id)
            .ok_or(IndexError::MissingStreet(street_id))?;
        projection.sub_area = row.sub_area.clone();
        Ok(projection.clone())
    }

    /// Drop the sub-area of every street whose name never occurs in more than
    /// one sub-area.
    pub fn clean_city_part(&mut self) -> Result<usize> {
        let mut parts_by_name: HashMap<&str, HashSet<&str>> = HashMap::new();
        for street in self.streets.values() {
            let parts = parts_by_name.entry(street.name.as_str()).or_default();
            if let Some(part) = street.sub_area.as_deref() {
                parts.insert(part);
            }
        }
        let unique: HashSet<String> = parts_by_name
            .into_iter()
            .filter(|(_, parts)| parts.len() <= 1)
            .map(|(name, _)| name.to_string())
            .collect();

        let mut targets: Vec<i64> = self
            .streets
            .values()
            .filter(|s| s.sub_area.is_some() && unique.contains(&s.name))
            .map(|s| s.id)
            .collect();
        targets.sort_unstable();

        for id in &targets {
            self.set_sub_area(*id, None)?;
        }
        info!("Cleared sub-area of {} streets", targets.len());
        Ok(targets.len())
    }

    pub fn find_building(&self, source_id: i64) -> bool {
        self.buildings.contains_key(&source_id)
    }

    pub fn remove_building(&mut self, source_id: i64) -> Result<()> {
        let Some(streets) = self.buildings.remove(&source_id) else {
            return Ok(());
        };
        self.store.apply_pending()?;
        for street_id in streets {
            self.store.remove_building(street_id, source_id)?;
        }
        Ok(())
    }

    pub fn find_street_node(&self, way_id: i64) -> bool {
        self.street_ways.contains(&way_id)
    }

    pub fn write_building(&mut self, street_ids: &BTreeSet<i64>, building: &Building) -> Result<()> {
        let mut building = building.clone();
        building.postcode = building.postcode.map(|p| p.to_uppercase());
        for street_id in street_ids {
            self.store.queue_building(*street_id, &building)?;
        }
        let filed = self.buildings.entry(building.id).or_default();
        for street_id in street_ids {
            if !filed.contains(street_id) {
                filed.push(*street_id);
            }
        }
        Ok(())
    }

    pub fn write_street_way_nodes(
        &mut self,
        street_ids: &BTreeSet<i64>,
        way_id: i64,
        nodes: &[StreetNode],
    ) -> Result<()> {
        for street_id in street_ids {
            for node in nodes {
                self.store.queue_street_node(*street_id, node)?;
            }
        }
        self.street_ways.insert(way_id);
        Ok(())
    }

    /// Set the postcode of a previously written building on every street it
    /// is filed under.
    pub fn set_building_postcode(&mut self, source_id: i64, postcode: &str) -> Result<bool> {
        let Some(streets) = self.buildings.get(&source_id).cloned() else {
            return Ok(false);
        };
        self.store.apply_pending()?;
        for street_id in streets {
            if let Some(mut building) = self.store.building(street_id, source_id)? {
                building.postcode = Some(postcode.to_uppercase());
                self.store.put_building(street_id, &building)?;
            }
        }
        Ok(true)
    }

    /// Give `postcode` to every building without one whose location passes
    /// `inside`.
    pub fn assign_missing_postcodes<F>(&mut self, postcode: &str, inside: F) -> Result<usize>
    where
        F: Fn(GeoPoint) -> bool,
    {
        self.store.apply_pending()?;
        let mut updated = 0;
        for (street_id, mut building) in self.store.all_buildings()? {
            if building.postcode.is_none() && inside(building.location) {
                building.postcode = Some(postcode.to_uppercase());
                self.store.put_building(street_id, &building)?;
                updated += 1;
            }
        }
        debug!("Postcode {} assigned to {} buildings", postcode, updated);
        Ok(updated)
    }

    pub fn write_city(&mut self, city: &City) -> Result<()> {
        self.store.queue_city(city)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.store.commit()
    }
}

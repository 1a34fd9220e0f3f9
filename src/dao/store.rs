//! Batched row store over sled.
//!
//! Rows are JSON-encoded and queued in per-tree `sled::Batch`es. Queued rows
//! are invisible to readers until the batches are applied, which happens when
//! the batch size is reached, on [`RowStore::apply_pending`], and on
//! [`RowStore::commit`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Batch, Tree};
use std::path::Path;
use tempfile::{Builder, TempDir};
use tracing::debug;

use crate::error::Result;
use crate::models::{Building, City, StreetNode, StreetRow};

fn id_key(id: i64) -> [u8; 8] {
    id.to_be_bytes()
}

fn pair_key(a: i64, b: i64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[0..8].copy_from_slice(&a.to_be_bytes());
    key[8..16].copy_from_slice(&b.to_be_bytes());
    key
}

fn second_of_pair(key: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = key.get(8..16)?.try_into().ok()?;
    Some(i64::from_be_bytes(bytes))
}

fn first_of_pair(key: &[u8]) -> Option<i64> {
    let bytes: [u8; 8] = key.get(0..8)?.try_into().ok()?;
    Some(i64::from_be_bytes(bytes))
}

#[derive(Default)]
struct Pending {
    cities: Batch,
    streets: Batch,
    street_city: Batch,
    buildings: Batch,
    street_nodes: Batch,
    len: usize,
}

pub struct RowStore {
    db: sled::Db,
    cities: Tree,
    streets: Tree,
    /// (city id, street id) -> empty, for per-city street scans
    street_city: Tree,
    /// (street id, building id) -> building
    buildings: Tree,
    /// (street id, node id) -> street node
    street_nodes: Tree,
    pending: Pending,
    batch_size: usize,
    _dir: Option<TempDir>,
}

impl RowStore {
    pub fn open<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self> {
        let db = sled::open(path)?;
        Self::with_db(db, batch_size, None)
    }

    /// Store in a fresh temporary directory, removed on drop.
    pub fn temporary(batch_size: usize) -> Result<Self> {
        let dir = Builder::new().prefix("addrindex-rows-").tempdir()?;
        let db = sled::open(dir.path())?;
        Self::with_db(db, batch_size, Some(dir))
    }

    fn with_db(db: sled::Db, batch_size: usize, dir: Option<TempDir>) -> Result<Self> {
        Ok(Self {
            cities: db.open_tree("city")?,
            streets: db.open_tree("street")?,
            street_city: db.open_tree("street_city")?,
            buildings: db.open_tree("building")?,
            street_nodes: db.open_tree("street_node")?,
            db,
            pending: Pending::default(),
            batch_size: batch_size.max(1),
            _dir: dir,
        })
    }

    fn queued(&mut self) -> Result<()> {
        self.pending.len += 1;
        if self.pending.len >= self.batch_size {
            self.apply_pending()?;
        }
        Ok(())
    }

    pub fn queue_city(&mut self, city: &City) -> Result<()> {
        self.pending
            .cities
            .insert(id_key(city.id).to_vec(), serde_json::to_vec(city)?);
        self.queued()
    }

    pub fn queue_street(&mut self, street: &StreetRow) -> Result<()> {
        self.pending
            .streets
            .insert(id_key(street.id).to_vec(), serde_json::to_vec(street)?);
        self.pending
            .street_city
            .insert(pair_key(street.city_id, street.id).to_vec(), Vec::new());
        self.queued()
    }

    pub fn queue_building(&mut self, street_id: i64, building: &Building) -> Result<()> {
        self.pending.buildings.insert(
            pair_key(street_id, building.id).to_vec(),
            serde_json::to_vec(building)?,
        );
        self.queued()
    }

    pub fn queue_street_node(&mut self, street_id: i64, node: &StreetNode) -> Result<()> {
        self.pending.street_nodes.insert(
            pair_key(street_id, node.id).to_vec(),
            serde_json::to_vec(node)?,
        );
        self.queued()
    }

    /// Make every queued row visible to readers.
    pub fn apply_pending(&mut self) -> Result<()> {
        if self.pending.len == 0 {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        debug!("Applying {} queued rows", pending.len);
        self.cities.apply_batch(pending.cities)?;
        self.streets.apply_batch(pending.streets)?;
        self.street_city.apply_batch(pending.street_city)?;
        self.buildings.apply_batch(pending.buildings)?;
        self.street_nodes.apply_batch(pending.street_nodes)?;
        Ok(())
    }

    /// Apply queued rows and flush them to disk.
    pub fn commit(&mut self) -> Result<()> {
        self.apply_pending()?;
        self.db.flush()?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> Result<Option<T>> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(tree: &Tree, key: &[u8], row: &T) -> Result<()> {
        tree.insert(key, serde_json::to_vec(row)?)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(tree: &Tree, prefix: &[u8]) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for entry in tree.scan_prefix(prefix) {
            let (_, value) = entry?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    pub fn street(&self, id: i64) -> Result<Option<StreetRow>> {
        Self::get(&self.streets, &id_key(id))
    }

    /// Overwrite a street row in place. The owning city must not change.
    pub fn put_street(&self, street: &StreetRow) -> Result<()> {
        Self::put(&self.streets, &id_key(street.id), street)
    }

    pub fn building(&self, street_id: i64, building_id: i64) -> Result<Option<Building>> {
        Self::get(&self.buildings, &pair_key(street_id, building_id))
    }

    pub fn put_building(&self, street_id: i64, building: &Building) -> Result<()> {
        Self::put(&self.buildings, &pair_key(street_id, building.id), building)
    }

    pub fn remove_building(&self, street_id: i64, building_id: i64) -> Result<()> {
        self.buildings.remove(pair_key(street_id, building_id))?;
        Ok(())
    }

    pub fn cities(&self) -> Result<Vec<City>> {
        Self::scan(&self.cities, &[])
    }

    pub fn streets_of_city(&self, city_id: i64) -> Result<Vec<StreetRow>> {
        let mut rows = Vec::new();
        for entry in self.street_city.scan_prefix(id_key(city_id)) {
            let (key, _) = entry?;
            if let Some(street_id) = second_of_pair(&key) {
                if let Some(row) = self.street(street_id)? {
                    rows.push(row);
                }
            }
        }
        Ok(rows)
    }

    pub fn buildings_of_street(&self, street_id: i64) -> Result<Vec<Building>> {
        Self::scan(&self.buildings, &id_key(street_id))
    }

    pub fn nodes_of_street(&self, street_id: i64) -> Result<Vec<StreetNode>> {
        Self::scan(&self.street_nodes, &id_key(street_id))
    }

    /// Every building row with the street it is filed under.
    pub fn all_buildings(&self) -> Result<Vec<(i64, Building)>> {
        let mut rows = Vec::new();
        for entry in self.buildings.iter() {
            let (key, value) = entry?;
            if let Some(street_id) = first_of_pair(&key) {
                rows.push((street_id, serde_json::from_slice(&value)?));
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CityType, GeoPoint};
    use std::collections::BTreeMap;

    fn street(id: i64, city_id: i64) -> StreetRow {
        StreetRow {
            id,
            name: format!("Street {}", id),
            localized: BTreeMap::new(),
            location: GeoPoint::new(1.0, 2.0),
            city_id,
            sub_area: None,
        }
    }

    #[test]
    fn test_queued_rows_invisible_until_applied() {
        let mut store = RowStore::temporary(100).unwrap();
        store.queue_street(&street(1, 7)).unwrap();
        assert!(store.street(1).unwrap().is_none());
        store.apply_pending().unwrap();
        assert_eq!(store.street(1).unwrap().unwrap().city_id, 7);
    }

    #[test]
    fn test_batch_size_applies_automatically() {
        let mut store = RowStore::temporary(2).unwrap();
        store.queue_street(&street(1, 7)).unwrap();
        store.queue_street(&street(2, 7)).unwrap();
        assert!(store.street(2).unwrap().is_some());
    }

    #[test]
    fn test_scans_by_owner() {
        let mut store = RowStore::temporary(100).unwrap();
        store.queue_street(&street(1, 7)).unwrap();
        store.queue_street(&street(2, 7)).unwrap();
        store.queue_street(&street(3, 8)).unwrap();
        store
            .queue_building(1, &Building::new(40, "12", GeoPoint::new(1.0, 2.0)))
            .unwrap();
        store
            .queue_building(2, &Building::new(41, "14", GeoPoint::new(1.0, 2.0)))
            .unwrap();
        store
            .queue_city(&City::new(7, "Town", CityType::Town, GeoPoint::new(1.0, 2.0)))
            .unwrap();
        store.commit().unwrap();

        let ids: Vec<i64> = store.streets_of_city(7).unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.buildings_of_street(1).unwrap().len(), 1);
        assert_eq!(store.all_buildings().unwrap().len(), 2);
        assert_eq!(store.cities().unwrap()[0].name, "Town");

        store.remove_building(1, 40).unwrap();
        assert!(store.buildings_of_street(1).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = RowStore::open(dir.path(), 10).unwrap();
            store.queue_street(&street(5, 1)).unwrap();
            store.commit().unwrap();
        }
        let store = RowStore::open(dir.path(), 10).unwrap();
        assert_eq!(store.street(5).unwrap().unwrap().name, "Street 5");
    }
}

//! Address indexing pipeline.
//!
//! [`AddressIndexer`] owns the city/boundary storage and the street DAO and is
//! fed OSM entities in phases:
//!
//! 1. [`AddressIndexer::register_city`] for every `place=*` node,
//! 2. [`AddressIndexer::index_boundary`] for boundary relations and ways,
//! 3. [`AddressIndexer::index_address_relation`] and
//!    [`AddressIndexer::index_entity`] for addresses and streets,
//! 4. [`AddressIndexer::finish_ingestion`], after which the binary index can
//!    be written with [`AddressIndexer::write_index`].
//!
//! [`AddressIndexer::index_pbf`] runs all phases over a PBF file.

mod boundaries;
mod ingest;
mod streets;

pub use boundaries::boundary_importance;

use hashbrown::HashSet;
use osmpbfreader::{OsmObj, OsmPbfReader};
use std::io::{Read, Seek, Write};
use tracing::info;

use crate::config::IndexerSettings;
use crate::dao::{RowStore, StreetDao};
use crate::error::Result;
use crate::index::{AddressIndexBuilder, IndexSummary};
use crate::models::{Boundary, City, CityId, CityType, OsmType};
use crate::normalize::StreetNameNormalizer;
use crate::osm::{Entity, EntityResolver};
use crate::progress::Progress;
use crate::storage::CityStorage;

pub struct AddressIndexer {
    settings: IndexerSettings,
    normalizer: StreetNameNormalizer,
    storage: CityStorage,
    dao: StreetDao,
    /// Outer ways already consumed by a boundary relation of the same name
    visited_boundary_ways: HashSet<i64>,
    /// `postal_code` relations: postcode and packed member ids
    postcode_relations: Vec<(String, Vec<i64>)>,
    /// `boundary=postal_code` areas
    postcode_boundaries: Vec<(String, Boundary)>,
}

impl AddressIndexer {
    pub fn new(settings: IndexerSettings, store: RowStore) -> Self {
        Self {
            normalizer: StreetNameNormalizer::from_settings(&settings),
            storage: CityStorage::new(&settings.spatial),
            dao: StreetDao::new(store),
            settings,
            visited_boundary_ways: HashSet::new(),
            postcode_relations: Vec::new(),
            postcode_boundaries: Vec::new(),
        }
    }

    /// Indexer backed by a temporary row store.
    pub fn temporary(settings: IndexerSettings) -> Result<Self> {
        let store = RowStore::temporary(settings.batch_size)?;
        Ok(Self::new(settings, store))
    }

    pub fn settings(&self) -> &IndexerSettings {
        &self.settings
    }

    pub fn storage(&self) -> &CityStorage {
        &self.storage
    }

    pub fn dao(&self) -> &StreetDao {
        &self.dao
    }

    pub fn normalize_street_name(&self, name: &str) -> String {
        self.normalizer.normalize(name)
    }

    /// Register a `place=*` node as a city.
    pub fn register_city(&mut self, entity: &Entity) -> Option<CityId> {
        if entity.osm_type() != OsmType::Node {
            return None;
        }
        let city_type = CityType::from_place(entity.tag("place")?)?;
        let city = parse_city(entity, city_type)?;
        Some(self.storage.register_city(city))
    }

    /// Create a city from any entity with a name and a location.
    pub(crate) fn create_missing_city(
        &mut self,
        entity: &Entity,
        city_type: CityType,
    ) -> Option<CityId> {
        let city = parse_city(entity, city_type)?;
        Some(self.storage.register_city(city))
    }

    /// Post-ingestion passes: deferred boundary assignment, city persistence,
    /// postcodes and sub-area cleanup.
    pub fn finish_ingestion(&mut self, progress: &dyn Progress) -> Result<()> {
        self.assign_boundaries_to_free_cities(progress);
        self.write_cities()?;
        self.process_postcodes()?;
        self.dao.clean_city_part()?;
        self.dao.commit()?;
        info!(
            "Ingestion finished: {} cities, {} boundaries, {} streets",
            self.storage.city_count(),
            self.storage.boundary_count(),
            self.dao.street_count()
        );
        Ok(())
    }

    fn write_cities(&mut self) -> Result<()> {
        for (_, city) in self.storage.cities() {
            if city.city_type.stored_as_separate() {
                self.dao.write_city(city)?;
            }
        }
        self.dao.commit()
    }

    fn index_in_phase(&mut self, phase: Phase, entity: &Entity) -> Result<()> {
        match phase {
            Phase::Cities => {
                self.register_city(entity);
            }
            Phase::Boundaries => {
                self.index_boundary(entity);
            }
            Phase::StreetRelations => self.index_address_relation(entity)?,
            Phase::Addresses => self.index_entity(entity)?,
        }
        Ok(())
    }

    /// Run every ingestion phase over a PBF file, then finish ingestion.
    pub fn index_pbf<R: Read + Seek>(
        &mut self,
        reader: &mut OsmPbfReader<R>,
        progress: &dyn Progress,
    ) -> Result<()> {
        let resolver = EntityResolver::build(reader)?;
        for phase in Phase::ALL {
            info!("Indexing {}...", phase.name());
            progress.start_task(phase.name(), 0);
            reader.rewind()?;
            for obj in reader.iter() {
                if let Some(entity) = resolver.resolve(&obj?)? {
                    self.index_in_phase(phase, &entity)?;
                    progress.progress(1);
                }
            }
            progress.finish_task();
        }
        self.finish_ingestion(progress)
    }

    /// Same as [`AddressIndexer::index_pbf`] over objects already in memory.
    pub fn index_objects(&mut self, objects: &[OsmObj], progress: &dyn Progress) -> Result<()> {
        let resolver = EntityResolver::from_objects(objects)?;
        for phase in Phase::ALL {
            for obj in objects {
                if let Some(entity) = resolver.resolve(obj)? {
                    self.index_in_phase(phase, &entity)?;
                }
            }
        }
        self.finish_ingestion(progress)
    }

    /// Serialize the finished region into `out`.
    pub fn write_index<W: Write + Seek>(
        &self,
        out: W,
        region: &str,
        progress: &dyn Progress,
    ) -> Result<(W, IndexSummary)> {
        AddressIndexBuilder::new(self).write(out, region, progress)
    }
}

/// Cities must exist before boundaries are matched to them, and boundaries
/// before streets are resolved to cities. Street relations claim their
/// houses before the houses' own address tags are looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Cities,
    Boundaries,
    StreetRelations,
    Addresses,
}

impl Phase {
    const ALL: [Phase; 4] = [
        Phase::Cities,
        Phase::Boundaries,
        Phase::StreetRelations,
        Phase::Addresses,
    ];

    fn name(&self) -> &'static str {
        match self {
            Phase::Cities => "cities",
            Phase::Boundaries => "boundaries",
            Phase::StreetRelations => "street relations",
            Phase::Addresses => "addresses",
        }
    }
}

pub(crate) fn parse_city(entity: &Entity, city_type: CityType) -> Option<City> {
    let name = entity.name()?;
    let location = entity.location()?;
    let mut city = City::new(entity.packed_id(), name, city_type, location);
    city.localized = entity.localized_names();
    city.is_in = entity.tag("is_in").map(str::to_string);
    city.postcode = entity
        .tag("addr:postcode")
        .or_else(|| entity.tag("postal_code"))
        .map(str::to_string);
    Some(city)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::GeoPoint;
    use crate::osm::{Entity, Member};

    /// Closed square way with its south-west corner at (lat, lon).
    pub fn square_way(id: i64, lat: f64, lon: f64, size: f64) -> Entity {
        let corners = [
            (lat, lon),
            (lat, lon + size),
            (lat + size, lon + size),
            (lat + size, lon),
            (lat, lon),
        ];
        let nodes = corners
            .iter()
            .enumerate()
            .map(|(i, (la, lo))| {
                Entity::node(id * 10 + (i as i64 % 4), GeoPoint::new(*la, *lo))
            })
            .collect();
        Entity::way(id, nodes)
    }

    pub fn boundary_relation(id: i64, name: &str, level: &str, area: Entity) -> Entity {
        Entity::relation(id, vec![Member::new("outer", area)])
            .with_tag("boundary", "administrative")
            .with_tag("admin_level", level)
            .with_tag("name", name)
    }

    pub fn place(id: i64, name: &str, place: &str, lat: f64, lon: f64) -> Entity {
        Entity::node(id, GeoPoint::new(lat, lon))
            .with_tag("place", place)
            .with_tag("name", name)
    }
}

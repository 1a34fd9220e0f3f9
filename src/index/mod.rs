//! Serialization of the finished address data into the binary index.
//!
//! [`AddressIndexBuilder`] reads back the persisted cities, streets and
//! buildings, merges duplicate streets and writes three city blocks
//! (settlements, villages, postcodes) followed by the name prefix table.

mod merger;
mod names;
mod writer;

pub use merger::{StreetMerger, StreetRegistry};
pub use names::{IndexedObject, NameIndex, ObjectKind};
pub use writer::{BinaryAddressWriter, CityBlock, CityRef, MAGIC, VERSION};

use chrono::Utc;
use hashbrown::HashSet;
use std::collections::BTreeMap;
use std::io::{Seek, Write};
use tracing::{debug, info};

use crate::dao::RowStore;
use crate::error::Result;
use crate::indexer::AddressIndexer;
use crate::models::{City, CityType, Street};
use crate::progress::Progress;
use crate::storage::CityStorage;

/// Deepest admin level a minor place may take its enclosing name from.
const MINOR_PLACE_MAX_ADMIN_LEVEL: i32 = 9;

/// Counts reported after writing an index.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub settlements: usize,
    pub villages: usize,
    pub postcodes: usize,
    pub streets: usize,
    pub buildings: usize,
    pub merged_streets: usize,
    pub name_prefixes: usize,
}

struct PostcodeCity {
    city: City,
    streets: Vec<Street>,
}

fn object_names<'n>(
    name: &'n str,
    localized: &'n BTreeMap<String, String>,
) -> impl Iterator<Item = &'n str> {
    std::iter::once(name).chain(
        localized
            .values()
            .map(String::as_str)
            .filter(move |n| *n != name),
    )
}

/// Main-town streets first, then streets of other sub-areas, then streets
/// without one.
fn part_rank(sub_area: Option<&str>, city: &City) -> u8 {
    match sub_area {
        Some(part) if part == city.name => 0,
        Some(_) => 1,
        None => 2,
    }
}

pub struct AddressIndexBuilder<'a> {
    storage: &'a CityStorage,
    store: &'a RowStore,
    merger: StreetMerger,
    registry: StreetRegistry,
    names: NameIndex,
    postcodes: BTreeMap<String, PostcodeCity>,
    summary: IndexSummary,
}

impl<'a> AddressIndexBuilder<'a> {
    /// Builder over an indexer whose ingestion has finished.
    pub fn new(indexer: &'a AddressIndexer) -> Self {
        let settings = indexer.settings();
        Self {
            storage: indexer.storage(),
            store: indexer.dao().store(),
            merger: StreetMerger::new(settings.street_merge_distance_m),
            registry: StreetRegistry::new(),
            names: NameIndex::new(settings.name_prefix_length),
            postcodes: BTreeMap::new(),
            summary: IndexSummary::default(),
        }
    }

    pub fn write<W: Write + Seek>(
        mut self,
        out: W,
        region: &str,
        progress: &dyn Progress,
    ) -> Result<(W, IndexSummary)> {
        let cities = self.read_cities()?;
        let settlements: Vec<City> = cities
            .iter()
            .filter(|c| c.city_type.is_settlement())
            .cloned()
            .collect();
        let villages: Vec<City> = cities
            .iter()
            .filter(|c| !c.city_type.is_settlement() && c.city_type.stored_as_separate())
            .cloned()
            .collect();
        let suburbs: Vec<City> = cities
            .iter()
            .filter(|c| c.city_type == CityType::Suburb && c.is_in.is_some())
            .cloned()
            .collect();
        // Isolated dwellings and localities are not persisted as cities.
        let mut minor_places: Vec<City> = self
            .storage
            .cities()
            .map(|(_, c)| c)
            .filter(|c| {
                matches!(
                    c.city_type,
                    CityType::Hamlet | CityType::IsolatedDwelling | CityType::Locality
                )
            })
            .filter_map(|c| self.with_enclosing_name(c))
            .collect();
        minor_places.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        progress.start_task(
            "Serializing address index",
            (settlements.len() + villages.len() / 100 + 1) as u64,
        );
        let mut writer = BinaryAddressWriter::new(out);
        writer.write_header(region, Utc::now())?;
        self.write_city_block(&mut writer, CityBlock::Settlement, &settlements, &suburbs, progress)?;
        self.write_city_block(&mut writer, CityBlock::Village, &villages, &minor_places, progress)?;
        self.write_postcode_block(&mut writer)?;
        progress.finish_task();

        writer.write_name_index(&self.names)?;
        self.summary.name_prefixes = self.names.len();
        info!(
            "Address index for {}: {} settlements, {} villages, {} postcodes, {} streets ({} merged), {} buildings",
            region,
            self.summary.settlements,
            self.summary.villages,
            self.summary.postcodes,
            self.summary.streets,
            self.summary.merged_streets,
            self.summary.buildings
        );
        Ok((writer.finish()?, self.summary))
    }

    /// Persisted cities ordered by name.
    fn read_cities(&self) -> Result<Vec<City>> {
        let mut cities = self.store.cities()?;
        cities.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(cities)
    }

    /// Copy of a minor place whose `is_in` names the deepest boundary around
    /// it; `None` when no such boundary exists.
    fn with_enclosing_name(&self, place: &City) -> Option<City> {
        let (_, boundary) = self
            .storage
            .populated_boundaries()
            .filter(|(_, b)| {
                b.admin_level <= Some(MINOR_PLACE_MAX_ADMIN_LEVEL)
                    && b.name != place.name
                    && b.contains(place.location)
            })
            .max_by_key(|(_, b)| b.admin_level)?;
        let mut place = place.clone();
        place.is_in = Some(boundary.name.clone());
        Some(place)
    }

    fn write_city_block<W: Write + Seek>(
        &mut self,
        writer: &mut BinaryAddressWriter<W>,
        block: CityBlock,
        cities: &[City],
        attachable: &[City],
        progress: &dyn Progress,
    ) -> Result<()> {
        writer.start_city_block(block, cities.len())?;
        let mut refs = Vec::with_capacity(cities.len());
        for city in cities {
            refs.push(writer.write_city_header(city)?);
        }

        for (i, (city, city_ref)) in cities.iter().zip(&refs).enumerate() {
            self.names.put(
                ObjectKind::City,
                city.id,
                object_names(&city.name, &city.localized),
                city_ref.start,
            )?;
            match block {
                CityBlock::Settlement => progress.progress(1),
                _ if (cities.len() - i) % 100 == 0 => progress.progress(1),
                _ => {}
            }

            let city_name = city.name.to_lowercase();
            let parts: Vec<&City> = attachable
                .iter()
                .filter(|p| {
                    p.id != city.id
                        && p.is_in
                            .as_deref()
                            .is_some_and(|is_in| is_in.to_lowercase().contains(&city_name))
                })
                .collect();

            let mut streets = self.read_streets_buildings(city, &parts)?;
            let inherited = city.postcode.as_ref().map(|p| p.to_uppercase());
            for building in streets.iter_mut().flat_map(|s| s.buildings.iter_mut()) {
                if building.postcode.is_none() {
                    building.postcode = inherited.clone();
                }
            }

            let offsets = writer.write_city_data(city_ref, &streets)?;
            for (street, offset) in streets.iter().zip(offsets) {
                self.names.put(
                    ObjectKind::Street,
                    street.id,
                    object_names(&street.name, &street.localized),
                    offset,
                )?;
            }

            self.summary.streets += streets.len();
            self.summary.buildings += streets.iter().map(|s| s.buildings.len()).sum::<usize>();
            match block {
                CityBlock::Settlement => self.summary.settlements += 1,
                _ => self.summary.villages += 1,
            }
            self.collect_postcodes(&streets);
        }
        writer.end_city_block()
    }

    /// Streets of the city and of its attached sub-areas, merged.
    fn read_streets_buildings(&mut self, city: &City, parts: &[&City]) -> Result<Vec<Street>> {
        let mut visited = HashSet::new();
        let mut streets = Vec::new();
        self.read_streets_for_city(city, &mut visited, &mut streets)?;
        for part in parts {
            self.read_streets_for_city(part, &mut visited, &mut streets)?;
        }
        let loaded = streets.len();
        let merged = self.merger.merge(streets, &mut self.registry);
        if merged.len() < loaded {
            debug!("{}: merged {} streets", city.name, loaded - merged.len());
        }
        self.summary.merged_streets += loaded - merged.len();
        Ok(merged)
    }

    fn read_streets_for_city(
        &mut self,
        city: &City,
        visited: &mut HashSet<i64>,
        out: &mut Vec<Street>,
    ) -> Result<()> {
        let mut rows = self.store.streets_of_city(city.id)?;
        rows.sort_by(|a, b| {
            part_rank(a.sub_area.as_deref(), city)
                .cmp(&part_rank(b.sub_area.as_deref(), city))
                .then_with(|| a.name.cmp(&b.name))
        });

        for row in rows {
            if !visited.insert(row.id) {
                continue;
            }
            // Same name in several districts: suffix every street outside
            // the main town with its district.
            let suffix = match row.sub_area.as_deref() {
                Some(part) if part != city.name => format!(" ({})", part),
                _ => String::new(),
            };
            let id = row.id;
            let display = format!("{}{}", row.name, suffix);
            let mut street = Street::from_row(row, display);
            for name in street.localized.values_mut() {
                name.push_str(&suffix);
            }
            street.way_nodes = self
                .store
                .nodes_of_street(id)?
                .into_iter()
                .map(|n| n.location)
                .collect();
            for building in self.store.buildings_of_street(id)? {
                street.add_building_check_by_id(building);
            }
            self.registry.register(city.id, &street.name, street.id);
            out.push(street);
        }
        Ok(())
    }

    /// Clone every building with a postcode into the postcode's city, under a
    /// street of the same name.
    fn collect_postcodes(&mut self, streets: &[Street]) {
        for street in streets {
            for building in &street.buildings {
                let Some(code) = building.postcode.as_deref() else {
                    continue;
                };
                let next_id = -(self.postcodes.len() as i64) - 1;
                let post = self
                    .postcodes
                    .entry(code.to_string())
                    .or_insert_with(|| PostcodeCity {
                        city: City::new(next_id, code, CityType::Postcode, building.location),
                        streets: Vec::new(),
                    });
                let post_id = post.city.id;

                let existing = self
                    .registry
                    .street_by_name(post_id, &street.name)
                    .and_then(|id| post.streets.iter().position(|s| s.id == id));
                let slot = match existing {
                    Some(i) => i,
                    None => {
                        post.streets.push(Street {
                            id: street.id,
                            name: street.name.clone(),
                            base_name: street.base_name.clone(),
                            localized: street.localized.clone(),
                            location: street.location,
                            city_id: post_id,
                            buildings: Vec::new(),
                            way_nodes: Vec::new(),
                        });
                        self.registry.register(post_id, &street.name, street.id);
                        post.streets.len() - 1
                    }
                };
                post.streets[slot].add_building_check_by_id(building.clone());
            }
        }
    }

    fn write_postcode_block<W: Write + Seek>(
        &mut self,
        writer: &mut BinaryAddressWriter<W>,
    ) -> Result<()> {
        let postcodes = std::mem::take(&mut self.postcodes);
        writer.start_city_block(CityBlock::Postcodes, postcodes.len())?;
        let mut refs = Vec::with_capacity(postcodes.len());
        for post in postcodes.values() {
            refs.push(writer.write_city_header(&post.city)?);
        }
        for (mut post, city_ref) in postcodes.into_values().zip(refs) {
            self.names
                .put(ObjectKind::City, post.city.id, [post.city.name.as_str()], city_ref.start)?;
            post.streets.sort_by(|a, b| a.name.cmp(&b.name));
            writer.write_city_data(&city_ref, &post.streets)?;
            self.summary.postcodes += 1;
        }
        writer.end_city_block()
    }
}

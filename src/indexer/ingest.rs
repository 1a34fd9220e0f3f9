//! Address-bearing entities: houses, interpolation ways, street relations,
//! highways and postcode areas.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::AddressIndexer;
use crate::error::Result;
use crate::models::{Building, BuildingInterpolation, OsmType, StreetNode};
use crate::osm::Entity;

static HOUSE_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)$").expect("valid house range regex"));

/// Space out `bis`, `ter` and `quater` suffixes: `12bis` becomes `12 bis`.
pub(crate) fn normalize_housenumber(hno: &str) -> String {
    for suffix in ["bis", "quater", "ter"] {
        let Some(cut) = hno.len().checked_sub(suffix.len()) else {
            continue;
        };
        if hno.is_char_boundary(cut) && hno[cut..].eq_ignore_ascii_case(suffix) {
            return format!("{} {}", hno[..cut].trim(), suffix);
        }
    }
    hno.to_string()
}

/// Interpolation implied by a `10-20` style house number.
pub(crate) fn interpolation_by_house_number(hno: &str) -> Option<&'static str> {
    let caps = HOUSE_RANGE.captures(hno.trim())?;
    let first: u64 = caps[1].parse().ok()?;
    let second: u64 = caps[2].parse().ok()?;
    Some(match (first % 2, second % 2) {
        (0, 0) => "even",
        (1, 1) => "odd",
        _ => "all",
    })
}

/// Named interpolation scheme, or an explicit numeric step (0 when neither).
fn parse_interpolation(value: &str) -> (Option<BuildingInterpolation>, i32) {
    match BuildingInterpolation::parse(value) {
        Some(scheme) => (Some(scheme), 0),
        None => (None, value.trim().parse().unwrap_or(0)),
    }
}

fn parse_building(entity: &Entity) -> Option<Building> {
    let location = entity.location()?;
    let mut building = Building::new(
        entity.packed_id(),
        entity.tag("addr:housenumber").unwrap_or_default(),
        location,
    );
    building.localized = entity.localized_names();
    building.postcode = entity.tag("addr:postcode").map(str::to_string);
    Some(building)
}

fn street_of(entity: &Entity) -> Option<&str> {
    entity.tag("addr:street").or_else(|| entity.tag("addr:place"))
}

/// Localized and alternative names used to enrich a street.
fn other_names(entity: &Entity) -> BTreeMap<String, String> {
    let mut names = entity.localized_names();
    for key in ["old_name", "alt_name", "loc_name"] {
        if let Some(value) = entity.tag(key) {
            names.insert(key.to_string(), value.to_string());
        }
    }
    names
}

impl AddressIndexer {
    /// Primary house label and the suffix carrying the secondary one.
    fn house_label(&self, number: Option<&str>, name: Option<&str>) -> Option<(String, String)> {
        let (first, second) = if self.settings.house_number_preferred_over_name {
            (number, name)
        } else {
            (name, number)
        };
        let (label, second) = match first {
            Some(label) => (label, second),
            None => (second?, None),
        };
        let extra = match second {
            Some(s) if self.settings.house_name_add_additional_info => format!(" - [{}]", s),
            _ => String::new(),
        };
        Some((label.to_string(), extra))
    }

    /// `type=street` / `type=associatedStreet` relations.
    pub fn index_address_relation(&mut self, entity: &Entity) -> Result<()> {
        if entity.osm_type() != OsmType::Relation
            || !matches!(entity.tag("type"), Some("street" | "associatedStreet"))
        {
            return Ok(());
        }

        let mut street_name = entity.name().map(str::to_string);
        let mut location = entity.members().iter().find_map(|m| m.entity.location());
        let mut is_in = entity.is_in_names();
        if street_name.is_none() {
            let named = entity
                .members()
                .iter()
                .filter(|m| m.role == "street")
                .find(|m| m.entity.name().is_some());
            if let Some(street) = named {
                street_name = street.entity.name().map(str::to_string);
                location = street.entity.location();
                is_in = street.entity.is_in_names();
            }
        }
        let Some(street_name) = street_name else {
            return Ok(());
        };

        let ids = self.resolve_street_ids(
            &is_in,
            Some(&street_name),
            &BTreeMap::new(),
            None,
            location,
        )?;
        if ids.is_empty() {
            return Ok(());
        }

        let postcode = entity.tag("addr:postcode");
        let houses = entity
            .members()
            .iter()
            .filter(|m| m.role == "house")
            .chain(entity.members().iter().filter(|m| m.role == "address"));
        for member in houses {
            let house = &member.entity;
            let Some((label, extra)) = self.house_label(
                house.tag("addr:housenumber"),
                house.tag("addr:housename"),
            ) else {
                continue;
            };
            if self.dao.find_building(house.packed_id()) {
                continue;
            }
            let Some(mut building) = parse_building(house) else {
                warn!("Building with empty location: {}", house.entity_id());
                continue;
            };
            building.name = format!("{}{}", label, extra);
            if building.postcode.is_none() {
                building.postcode = postcode.map(str::to_string);
            }
            self.dao.write_building(&ids, &building)?;
        }
        Ok(())
    }

    /// Interpolation ways, addressed entities, named highways and postcode
    /// areas.
    pub fn index_entity(&mut self, entity: &Entity) -> Result<()> {
        let interpolation = entity.tag("addr:interpolation").map(str::to_string).or_else(|| {
            entity
                .tag("addr:housenumber")
                .and_then(interpolation_by_house_number)
                .map(str::to_string)
        });

        if let (OsmType::Way, Some(value)) = (entity.osm_type(), interpolation.as_deref()) {
            self.index_interpolation_way(entity, value)?;
        }

        let house_name = entity.tag("addr:housename");
        let house_number = entity.tag("addr:housenumber").map(normalize_housenumber);

        if house_name.is_some() || house_number.is_some() {
            self.index_house(entity, house_number.as_deref(), house_name, interpolation.as_deref())?;
        } else if entity.osm_type() == OsmType::Way
            && entity.tag("highway").is_some_and(|h| h != "platform")
            && (entity.name().is_some() || entity.tag("ref").is_some())
            && entity.tag("area") != Some("yes")
        {
            self.index_highway(entity)?;
        }

        if let Some(postcode) = entity.tag("postal_code") {
            if entity.tag("boundary") == Some("postal_code") {
                if let Some(boundary) = self.extract_boundary(entity) {
                    self.postcode_boundaries.push((postcode.to_string(), boundary));
                }
            } else if entity.osm_type() == OsmType::Relation {
                let members = entity.members().iter().map(|m| m.entity.packed_id()).collect();
                self.postcode_relations.push((postcode.to_string(), members));
            }
        }
        Ok(())
    }

    /// One interpolated building per consecutive pair of numbered nodes.
    fn index_interpolation_way(&mut self, way: &Entity, interpolation: &str) -> Result<()> {
        let (scheme, interval) = parse_interpolation(interpolation);
        if scheme.is_none() && interval <= 0 {
            return Ok(());
        }
        let numbered: Vec<&Entity> = way
            .way_nodes()
            .iter()
            .filter(|n| n.tag("addr:housenumber").is_some() && street_of(n).is_some())
            .collect();
        let location = way.location();

        for pair in numbered.windows(2) {
            let (first, second) = (pair[0], pair[1]);
            if self.dao.find_building(first.packed_id()) {
                self.dao.remove_building(first.packed_id())?;
            }
            let ids = self.resolve_street_ids(
                &first.is_in_names(),
                street_of(first),
                &BTreeMap::new(),
                None,
                location,
            )?;
            if ids.is_empty() {
                continue;
            }
            let Some(mut building) = parse_building(first) else {
                continue;
            };
            building.interpolation_interval = interval;
            building.interpolation_type = scheme;
            building.name2 = second.tag("addr:housenumber").map(str::to_string);
            building.location2 = second.location();
            self.dao.write_building(&ids, &building)?;
        }
        Ok(())
    }

    fn index_house(
        &mut self,
        entity: &Entity,
        house_number: Option<&str>,
        house_name: Option<&str>,
        interpolation: Option<&str>,
    ) -> Result<()> {
        // Multipolygon buildings are addressed through their first outer way.
        let target = match entity.osm_type() {
            OsmType::Relation => entity
                .members()
                .iter()
                .find(|m| m.role == "outer")
                .map(|m| &m.entity)
                .unwrap_or(entity),
            _ => entity,
        };
        if target.osm_type() == OsmType::Relation || self.dao.find_building(target.packed_id()) {
            return Ok(());
        }
        let Some((label, extra)) = self.house_label(house_number, house_name) else {
            return Ok(());
        };
        let Some(mut building) = parse_building(target) else {
            warn!("Building with empty location: {}", entity.entity_id());
            return Ok(());
        };
        if building.postcode.is_none() {
            building.postcode = entity.tag("addr:postcode").map(str::to_string);
        }

        let is_in = target.is_in_names();
        let location = Some(building.location);
        let ids = self.resolve_street_ids(&is_in, street_of(entity), &BTreeMap::new(), None, location)?;
        if ids.is_empty() {
            return Ok(());
        }

        match (label.find('-'), interpolation) {
            (Some(dash), Some(value)) => {
                let (scheme, step) = parse_interpolation(value);
                building.interpolation_type = scheme;
                building.interpolation_interval = if step > 0 { step } else { 1 };
                building.name = label[..dash].to_string();
                building.name2 = Some(label[dash + 1..].to_string());
            }
            _ => building.name = format!("{}{}", label, extra),
        }

        let street2 = entity.tag("addr:street2").or_else(|| entity.tag("addr2:street"));
        if let Some(street2) = street2 {
            let mut second_number = entity.tag("addr2:housenumber").map(str::to_string);
            let mut first_number = building.name.clone();
            if second_number.is_none() {
                if let Some(slash) = label.find('/').filter(|i| *i + 1 < label.len()) {
                    first_number = format!("{}{}", &label[..slash], extra);
                    second_number = Some(label[slash + 1..].to_string());
                }
            }
            if let Some(second_number) = second_number {
                let ids2: BTreeSet<i64> = self
                    .resolve_street_ids(&is_in, Some(street2), &BTreeMap::new(), None, location)?
                    .difference(&ids)
                    .copied()
                    .collect();
                if !ids2.is_empty() {
                    let mut building2 = building.clone();
                    building2.name = format!("{}{}", second_number, extra);
                    building2.name2 = None;
                    self.dao.write_building(&ids2, &building2)?;
                    building.name = first_number;
                }
            }
        }
        self.dao.write_building(&ids, &building)
    }

    fn index_highway(&mut self, way: &Entity) -> Result<()> {
        let way_id = way.packed_id();
        if self.dao.find_street_node(way_id) {
            return Ok(());
        }
        let ids = self.resolve_street_ids(
            &way.is_in_names(),
            way.name(),
            &other_names(way),
            way.tag("ref"),
            way.location(),
        )?;
        if ids.is_empty() {
            return Ok(());
        }
        let nodes: Vec<StreetNode> = way
            .way_nodes()
            .iter()
            .filter_map(|n| {
                Some(StreetNode {
                    id: n.packed_id(),
                    way_id,
                    location: n.location()?,
                })
            })
            .collect();
        self.dao.write_street_way_nodes(&ids, way_id, &nodes)
    }

    /// Apply postcode relations to their member buildings, then give every
    /// building still without a postcode the code of the postcode area it
    /// lies in.
    pub(super) fn process_postcodes(&mut self) -> Result<()> {
        for (postcode, members) in std::mem::take(&mut self.postcode_relations) {
            let mut updated = 0;
            for member in members {
                if self.dao.set_building_postcode(member, &postcode)? {
                    updated += 1;
                }
            }
            debug!("Postcode relation {} set on {} buildings", postcode, updated);
        }
        for (postcode, boundary) in std::mem::take(&mut self.postcode_boundaries) {
            self.dao
                .assign_missing_postcodes(&postcode, |p| boundary.contains(p))?;
        }
        Ok(())
    }
}

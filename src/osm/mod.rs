//! OSM input model.
//!
//! The indexer consumes fully materialized entities: a way carries its node
//! entities, a relation carries its member entities with their roles. Members
//! that could not be resolved are simply absent.

pub mod pbf;
pub mod rings;

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{EntityId, GeoPoint, OsmType};

pub use pbf::EntityResolver;
pub use rings::{assemble_multipolygon, merge_rings_to_polygons};

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Node(GeoPoint),
    Way(Vec<Entity>),
    Relation(Vec<Member>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub role: String,
    pub entity: Entity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: i64,
    pub tags: HashMap<String, String>,
    pub geometry: Geometry,
}

impl Entity {
    pub fn node(id: i64, location: GeoPoint) -> Self {
        Self {
            id,
            tags: HashMap::new(),
            geometry: Geometry::Node(location),
        }
    }

    pub fn way(id: i64, nodes: Vec<Entity>) -> Self {
        Self {
            id,
            tags: HashMap::new(),
            geometry: Geometry::Way(nodes),
        }
    }

    pub fn relation(id: i64, members: Vec<Member>) -> Self {
        Self {
            id,
            tags: HashMap::new(),
            geometry: Geometry::Relation(members),
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn osm_type(&self) -> OsmType {
        match self.geometry {
            Geometry::Node(_) => OsmType::Node,
            Geometry::Way(_) => OsmType::Way,
            Geometry::Relation(_) => OsmType::Relation,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        EntityId::new(self.osm_type(), self.id)
    }

    /// Id used for every persisted row derived from this entity.
    pub fn packed_id(&self) -> i64 {
        self.entity_id().packed()
    }

    /// Tag value, with blank values treated as missing.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.tag("name")
    }

    /// `name:xx` tags keyed by language.
    pub fn localized_names(&self) -> BTreeMap<String, String> {
        self.tags
            .iter()
            .filter_map(|(k, v)| {
                let lang = k.strip_prefix("name:")?;
                let v = v.trim();
                (!lang.is_empty() && !v.is_empty()).then(|| (lang.to_string(), v.to_string()))
            })
            .collect()
    }

    /// Names of places this entity declares itself part of.
    pub fn is_in_names(&self) -> HashSet<String> {
        let mut names = HashSet::new();
        if let Some(is_in) = self.tag("is_in") {
            names.extend(
                is_in
                    .split([',', ';'])
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        for key in ["addr:city", "is_in:city"] {
            if let Some(city) = self.tag(key) {
                names.insert(city.to_string());
            }
        }
        names
    }

    /// Point location; the node average for ways, the member average for
    /// relations.
    pub fn location(&self) -> Option<GeoPoint> {
        match &self.geometry {
            Geometry::Node(p) => Some(*p),
            Geometry::Way(nodes) => GeoPoint::mean(nodes.iter().filter_map(Entity::location)),
            Geometry::Relation(members) => {
                GeoPoint::mean(members.iter().filter_map(|m| m.entity.location()))
            }
        }
    }

    pub fn way_nodes(&self) -> &[Entity] {
        match &self.geometry {
            Geometry::Way(nodes) => nodes,
            _ => &[],
        }
    }

    pub fn members(&self) -> &[Member] {
        match &self.geometry {
            Geometry::Relation(members) => members,
            _ => &[],
        }
    }
}

impl Member {
    pub fn new(role: &str, entity: Entity) -> Self {
        Self {
            role: role.to_string(),
            entity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_in_names() {
        let e = Entity::node(1, GeoPoint::new(0.0, 0.0))
            .with_tag("is_in", "Springfield; Illinois, USA")
            .with_tag("addr:city", "Shelbyville");
        let names = e.is_in_names();
        assert_eq!(names.len(), 4);
        assert!(names.contains("Illinois"));
        assert!(names.contains("Shelbyville"));
    }

    #[test]
    fn test_way_location_is_node_average() {
        let way = Entity::way(
            7,
            vec![
                Entity::node(1, GeoPoint::new(0.0, 0.0)),
                Entity::node(2, GeoPoint::new(0.0, 2.0)),
            ],
        );
        assert_eq!(way.location(), Some(GeoPoint::new(0.0, 1.0)));
        assert_eq!(way.osm_type(), OsmType::Way);
    }

    #[test]
    fn test_blank_tags_are_missing() {
        let e = Entity::node(1, GeoPoint::new(0.0, 0.0))
            .with_tag("name", "  ")
            .with_tag("name:en", "Town")
            .with_tag("name:", "x");
        assert!(e.name().is_none());
        let localized = e.localized_names();
        assert_eq!(localized.len(), 1);
        assert_eq!(localized["en"], "Town");
    }
}

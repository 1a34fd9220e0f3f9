//! Materializes `osmpbfreader` objects into [`Entity`] values.

use hashbrown::{HashMap, HashSet};
use osmpbfreader::{OsmId, OsmObj, OsmPbfReader, Tags};
use std::collections::HashMap as TagMap;
use std::io::{Read, Seek};
use tempfile::{Builder, TempDir};
use tracing::{debug, info};

use super::{Entity, Member};
use crate::error::Result;
use crate::models::GeoPoint;

/// Whether an object can contribute to the address index on its own.
pub fn is_address_relevant(tags: &Tags) -> bool {
    tags.contains_key("place")
        || tags.contains_key("boundary")
        || tags.contains_key("postal_code")
        || tags.contains_key("addr:housenumber")
        || tags.contains_key("addr:housename")
        || tags.contains_key("addr:interpolation")
        || tags.contains_key("highway")
        || tags
            .get("type")
            .is_some_and(|t| t == "street" || t == "associatedStreet")
}

fn convert_tags(tags: &Tags) -> TagMap<String, String> {
    tags.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Holds node coordinates in a temporary sled tree and way/relation
/// membership in memory, so any relevant object can be expanded into an
/// [`Entity`] with its members attached.
pub struct EntityResolver {
    node_db: sled::Db,
    node_tags: HashMap<i64, TagMap<String, String>>,
    ways: HashMap<i64, (TagMap<String, String>, Vec<i64>)>,
    _dir: TempDir,
}

#[derive(Default)]
struct Needed {
    ways: HashSet<i64>,
    nodes: HashSet<i64>,
}

impl EntityResolver {
    /// Build the resolver by scanning the file three times.
    pub fn build<R: Read + Seek>(reader: &mut OsmPbfReader<R>) -> Result<Self> {
        info!("Building entity index...");
        let mut needed = Needed::default();
        let mut resolver = Self::empty()?;

        info!("Pass 1/3: Scanning relations...");
        reader.rewind()?;
        for obj in reader.iter() {
            needed.scan_relation(&obj?);
        }

        info!("Pass 2/3: Scanning ways...");
        reader.rewind()?;
        for obj in reader.iter() {
            resolver.keep_way(&obj?, &mut needed);
        }

        info!("Pass 3/3: Storing node coordinates...");
        reader.rewind()?;
        for obj in reader.iter() {
            resolver.keep_node(&obj?, &needed)?;
        }

        resolver.finish()
    }

    /// Same as [`EntityResolver::build`] over objects already in memory.
    pub fn from_objects(objects: &[OsmObj]) -> Result<Self> {
        let mut needed = Needed::default();
        let mut resolver = Self::empty()?;
        for obj in objects {
            needed.scan_relation(obj);
        }
        for obj in objects {
            resolver.keep_way(obj, &mut needed);
        }
        for obj in objects {
            resolver.keep_node(obj, &needed)?;
        }
        resolver.finish()
    }

    fn empty() -> Result<Self> {
        let dir = Builder::new().prefix("addrindex-nodes-").tempdir()?;
        let node_db = sled::open(dir.path())?;
        Ok(Self {
            node_db,
            node_tags: HashMap::new(),
            ways: HashMap::new(),
            _dir: dir,
        })
    }

    fn keep_way(&mut self, obj: &OsmObj, needed: &mut Needed) {
        if let OsmObj::Way(way) = obj {
            if needed.ways.contains(&way.id.0) || is_address_relevant(&way.tags) {
                needed.ways.insert(way.id.0);
                let nodes: Vec<i64> = way.nodes.iter().map(|n| n.0).collect();
                needed.nodes.extend(nodes.iter().copied());
                self.ways.insert(way.id.0, (convert_tags(&way.tags), nodes));
            }
        }
    }

    fn keep_node(&mut self, obj: &OsmObj, needed: &Needed) -> Result<()> {
        if let OsmObj::Node(node) = obj {
            if needed.nodes.contains(&node.id.0) {
                let mut value = [0u8; 16];
                value[0..8].copy_from_slice(&node.lon().to_be_bytes());
                value[8..16].copy_from_slice(&node.lat().to_be_bytes());
                self.node_db.insert(node.id.0.to_be_bytes(), &value)?;
                if !node.tags.is_empty() {
                    self.node_tags.insert(node.id.0, convert_tags(&node.tags));
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Self> {
        self.node_db.flush()?;
        info!(
            "Entity index holds {} ways and {} nodes",
            self.ways.len(),
            self.node_db.len()
        );
        Ok(self)
    }

    fn node_location(&self, id: i64) -> Result<Option<GeoPoint>> {
        let Some(bytes) = self.node_db.get(id.to_be_bytes())? else {
            return Ok(None);
        };
        if bytes.len() != 16 {
            return Ok(None);
        }
        let mut lon = [0u8; 8];
        let mut lat = [0u8; 8];
        lon.copy_from_slice(&bytes[0..8]);
        lat.copy_from_slice(&bytes[8..16]);
        Ok(Some(GeoPoint::new(
            f64::from_be_bytes(lat),
            f64::from_be_bytes(lon),
        )))
    }

    fn node_entity(&self, id: i64) -> Result<Option<Entity>> {
        Ok(self.node_location(id)?.map(|location| {
            let mut node = Entity::node(id, location);
            if let Some(tags) = self.node_tags.get(&id) {
                node.tags = tags.clone();
            }
            node
        }))
    }

    fn way_entity(&self, id: i64) -> Result<Option<Entity>> {
        let Some((tags, node_ids)) = self.ways.get(&id) else {
            return Ok(None);
        };
        let mut nodes = Vec::with_capacity(node_ids.len());
        for node_id in node_ids {
            if let Some(node) = self.node_entity(*node_id)? {
                nodes.push(node);
            }
        }
        let mut way = Entity::way(id, nodes);
        way.tags = tags.clone();
        Ok(Some(way))
    }

    /// Expand an object into an entity; `None` when it is not address-relevant.
    pub fn resolve(&self, obj: &OsmObj) -> Result<Option<Entity>> {
        if !is_address_relevant(obj.tags()) {
            return Ok(None);
        }
        match obj {
            OsmObj::Node(node) => Ok(Some(Entity {
                id: node.id.0,
                tags: convert_tags(&node.tags),
                geometry: super::Geometry::Node(GeoPoint::new(node.lat(), node.lon())),
            })),
            OsmObj::Way(way) => self.way_entity(way.id.0),
            OsmObj::Relation(rel) => {
                let mut members = Vec::with_capacity(rel.refs.len());
                for r in &rel.refs {
                    let entity = match r.member {
                        OsmId::Node(id) => self.node_entity(id.0)?,
                        OsmId::Way(id) => self.way_entity(id.0)?,
                        OsmId::Relation(id) => {
                            debug!("Skipping nested relation {} in {}", id.0, rel.id.0);
                            None
                        }
                    };
                    if let Some(entity) = entity {
                        members.push(Member::new(r.role.as_str(), entity));
                    }
                }
                let mut relation = Entity::relation(rel.id.0, members);
                relation.tags = convert_tags(&rel.tags);
                Ok(Some(relation))
            }
        }
    }
}

impl Needed {
    fn scan_relation(&mut self, obj: &OsmObj) {
        if let OsmObj::Relation(rel) = obj {
            if is_address_relevant(&rel.tags) {
                for member in &rel.refs {
                    match member.member {
                        OsmId::Way(id) => {
                            self.ways.insert(id.0);
                        }
                        OsmId::Node(id) => {
                            self.nodes.insert(id.0);
                        }
                        OsmId::Relation(_) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmpbfreader::{Node, NodeId, Ref, Relation, RelationId, Way, WayId};

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        let mut t = Tags::new();
        for (k, v) in pairs {
            t.insert((*k).into(), (*v).into());
        }
        t
    }

    fn node(id: i64, lat: f64, lon: f64, t: Tags) -> OsmObj {
        OsmObj::Node(Node {
            id: NodeId(id),
            tags: t,
            decimicro_lat: (lat * 1e7) as i32,
            decimicro_lon: (lon * 1e7) as i32,
        })
    }

    #[test]
    fn test_resolves_boundary_relation_members() {
        let objects = vec![
            node(1, 0.0, 0.0, Tags::new()),
            node(2, 0.0, 1.0, Tags::new()),
            node(3, 1.0, 1.0, Tags::new()),
            node(4, 5.0, 5.0, tags(&[("place", "town"), ("name", "Centre")])),
            OsmObj::Way(Way {
                id: WayId(10),
                tags: Tags::new(),
                nodes: vec![NodeId(1), NodeId(2), NodeId(3), NodeId(1)],
            }),
            OsmObj::Relation(Relation {
                id: RelationId(100),
                tags: tags(&[("boundary", "administrative"), ("name", "Town")]),
                refs: vec![
                    Ref {
                        member: OsmId::Way(WayId(10)),
                        role: "outer".into(),
                    },
                    Ref {
                        member: OsmId::Node(NodeId(4)),
                        role: "admin_centre".into(),
                    },
                ],
            }),
        ];

        let resolver = EntityResolver::from_objects(&objects).unwrap();
        let rel = resolver.resolve(&objects[5]).unwrap().unwrap();
        assert_eq!(rel.members().len(), 2);
        assert_eq!(rel.members()[0].role, "outer");
        assert_eq!(rel.members()[0].entity.way_nodes().len(), 4);
        assert_eq!(rel.members()[1].entity.name(), Some("Centre"));

        let loc = rel.members()[1].entity.location().unwrap();
        assert!((loc.lat - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_irrelevant_objects_are_skipped() {
        let objects = vec![node(1, 0.0, 0.0, tags(&[("amenity", "bench")]))];
        let resolver = EntityResolver::from_objects(&objects).unwrap();
        assert!(resolver.resolve(&objects[0]).unwrap().is_none());
    }
}

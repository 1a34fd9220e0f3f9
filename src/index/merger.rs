//! Unification of same-named streets loaded for one city and its sub-areas.

use hashbrown::HashMap;
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::Street;

/// Street display names registered per city, keyed by packed city id.
#[derive(Debug, Default)]
pub struct StreetRegistry {
    cities: HashMap<i64, HashMap<String, i64>>,
}

impl StreetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, city_id: i64, name: &str, street_id: i64) {
        self.cities
            .entry(city_id)
            .or_default()
            .insert(name.to_string(), street_id);
    }

    pub fn unregister(&mut self, city_id: i64, name: &str) -> Option<i64> {
        self.cities.get_mut(&city_id)?.remove(name)
    }

    pub fn street_by_name(&self, city_id: i64, name: &str) -> Option<i64> {
        self.cities.get(&city_id)?.get(name).copied()
    }

    pub fn street_count(&self, city_id: i64) -> usize {
        self.cities.get(&city_id).map_or(0, HashMap::len)
    }
}

pub struct StreetMerger {
    threshold_m: f64,
}

impl StreetMerger {
    pub fn new(threshold_m: f64) -> Self {
        Self { threshold_m }
    }

    /// Merge streets with the same stored name whose geometries come within
    /// the threshold. Survivors keep their load order.
    ///
    /// Within a group the street with the most buildings absorbs its close
    /// neighbours first; a survivor that absorbed something is compared
    /// again, since its geometry grew.
    pub fn merge(&self, streets: Vec<Street>, registry: &mut StreetRegistry) -> Vec<Street> {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, street) in streets.iter().enumerate() {
            groups.entry(street.base_name.clone()).or_default().push(i);
        }
        let mut slots: Vec<Option<Street>> = streets.into_iter().map(Some).collect();

        for mut group in groups.into_values().filter(|g| g.len() > 1) {
            group.sort_by_key(|i| {
                std::cmp::Reverse(slots[*i].as_ref().map_or(0, |s| s.buildings.len()))
            });

            let mut i = 0;
            while i + 1 < group.len() {
                let mut merged = false;
                let mut j = i + 1;
                while j < group.len() {
                    let distance = match (&slots[group[i]], &slots[group[j]]) {
                        (Some(a), Some(b)) => a.min_distance_m(b),
                        _ => f64::INFINITY,
                    };
                    if distance > self.threshold_m {
                        j += 1;
                        continue;
                    }
                    if let Some(candidate) = slots[group[j]].take() {
                        if let Some(survivor) = slots[group[i]].as_mut() {
                            debug!(
                                "Merging street '{}' into '{}' ({:.0} m apart)",
                                candidate.name, survivor.name, distance
                            );
                            if candidate.name != survivor.name {
                                registry.unregister(candidate.city_id, &candidate.name);
                            } else {
                                registry.register(survivor.city_id, &survivor.name, survivor.id);
                            }
                            survivor.merge_with(candidate);
                        }
                    }
                    group.remove(j);
                    merged = true;
                }
                if !merged {
                    i += 1;
                }
            }
        }
        slots.into_iter().flatten().collect()
    }
}

//! Indexer settings, loadable from TOML.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::models::CityType;

/// Tuning knobs for one indexing run. Built once, then shared by reference.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexerSettings {
    /// Apply suffix dropping/reordering to street names
    pub normalize_streets: bool,
    /// Tokens removed from street names ("улица")
    pub drop_suffixes: Vec<String>,
    /// Tokens moved to the end of street names ("переулок")
    pub reorder_suffixes: Vec<String>,
    pub house_number_preferred_over_name: bool,
    /// Append the house name in brackets after the number
    pub house_name_add_additional_info: bool,
    pub spatial: SpatialSettings,
    pub radii: CityRadii,
    /// Same-named streets closer than this are merged
    pub street_merge_distance_m: f64,
    /// Distance over radius beyond which a city stops being a good match
    pub close_enough_relative_distance: f64,
    /// Multiplier on a suburb's radius when picking the nearest sub-area
    pub city_part_radius_factor: f64,
    /// Characters kept per word in the name index
    pub name_prefix_length: usize,
    /// Row-store writes queued before a batch is applied
    pub batch_size: usize,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            normalize_streets: true,
            drop_suffixes: vec!["улица".to_string(), "ул.".to_string()],
            reorder_suffixes: [
                "переулок",
                "пер.",
                "проспект",
                "пр-т",
                "площадь",
                "пл.",
                "бульвар",
                "б-р",
                "шоссе",
                "набережная",
                "наб.",
                "проезд",
                "тупик",
                "аллея",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            house_number_preferred_over_name: true,
            house_name_add_additional_info: false,
            spatial: SpatialSettings::default(),
            radii: CityRadii::default(),
            street_merge_distance_m: 900.0,
            close_enough_relative_distance: 0.2,
            city_part_radius_factor: 1.5,
            name_prefix_length: 4,
            batch_size: 5000,
        }
    }
}

impl IndexerSettings {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read settings file")?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: IndexerSettings =
            toml::from_str(content).context("Failed to parse settings file")?;
        Ok(settings)
    }
}

/// Candidate search for the two-granularity settlement index.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SpatialSettings {
    /// Search radius around a point for cities and towns
    pub settlement_radius_m: f64,
    /// Search radius around a point for villages and smaller places
    pub village_radius_m: f64,
    /// Candidates per granularity considered when matching a boundary
    pub boundary_candidates: usize,
}

impl Default for SpatialSettings {
    fn default() -> Self {
        Self {
            settlement_radius_m: 50_000.0,
            village_radius_m: 10_000.0,
            boundary_candidates: 3,
        }
    }
}

/// Influence radius per city type, with per-type overrides.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(transparent)]
pub struct CityRadii {
    overrides: BTreeMap<CityType, f64>,
}

impl CityRadii {
    pub fn radius(&self, city_type: CityType) -> f64 {
        self.overrides
            .get(&city_type)
            .copied()
            .unwrap_or_else(|| city_type.default_radius())
            .max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = IndexerSettings::default();
        assert_eq!(s.street_merge_distance_m, 900.0);
        assert_eq!(s.name_prefix_length, 4);
        assert_eq!(s.radii.radius(CityType::Town), 4000.0);
        assert_eq!(s.radii.radius(CityType::Boundary), 1.0);
    }

    #[test]
    fn test_parse_partial_toml() {
        let s = IndexerSettings::from_toml(
            r#"
            normalize_streets = false
            drop_suffixes = ["street"]

            [spatial]
            village_radius_m = 5000.0

            [radii]
            town = 6000.0
            "#,
        )
        .unwrap();
        assert!(!s.normalize_streets);
        assert_eq!(s.drop_suffixes, vec!["street".to_string()]);
        assert_eq!(s.spatial.village_radius_m, 5000.0);
        assert_eq!(s.spatial.settlement_radius_m, 50_000.0);
        assert_eq!(s.radii.radius(CityType::Town), 6000.0);
        assert_eq!(s.radii.radius(CityType::City), 10_000.0);
        assert_eq!(s.batch_size, 5000);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(IndexerSettings::load_from_file("/nonexistent/settings.toml").is_err());
    }
}

//! addrindex - Builds a searchable binary address index from OpenStreetMap data
//!
//! An [`AddressIndexer`] reads cities, boundaries, streets and buildings from
//! a PBF extract, resolves every address to its city and district, and hands
//! the result to an [`AddressIndexBuilder`] which writes the index file.

pub mod config;
pub mod dao;
pub mod error;
pub mod index;
pub mod indexer;
pub mod models;
pub mod normalize;
pub mod osm;
pub mod progress;
pub mod spatial;
pub mod storage;

pub use config::IndexerSettings;
pub use error::{IndexError, Result};
pub use index::{AddressIndexBuilder, IndexSummary};
pub use indexer::AddressIndexer;
pub use models::{Building, City, CityType, GeoPoint, Street};

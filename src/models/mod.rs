//! Core data models for the address index.

pub mod address;
pub mod boundary;
pub mod city;
pub mod place;

pub use address::{Building, BuildingInterpolation, Street, StreetNode, StreetRow};
pub use boundary::{Boundary, BoundaryId};
pub use city::{City, CityId, CityType};
pub use place::{EntityId, GeoPoint, OsmType};

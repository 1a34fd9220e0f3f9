//! Binary address index encoding.
//!
//! All integers are little-endian, strings are a `u32` byte length followed
//! by UTF-8. Layout:
//!
//! ```text
//! header      "ADDR" u32:version str:region i64:created_ms
//! block*      u8:tag u32:byte_length u32:city_count
//!             city_header*  (u8:type i64:id str:name names f64:lat f64:lon
//!                            str:postcode u32:data_offset)
//!             city_data*    (u32:street_count street*)
//! street      i64:id str:name names f64:lat f64:lon
//!             u32:node_count (f64:lat f64:lon)* u32:building_count building*
//! building    i64:id str:name str:name2 f64:lat f64:lon u8:has_location2
//!             [f64:lat f64:lon] str:postcode i32:interval u8:interpolation
//! name_index  u32:prefix_count (str:prefix u32:count (u8:kind i64:id u32:offset)*)*
//! names       u32:count (str:lang str:name)*
//! ```
//!
//! A city header's `data_offset` is back-patched once the city's streets are
//! written. Offsets must fit a signed 32-bit integer.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom, Write};

use super::names::NameIndex;
use crate::error::{IndexError, Result};
use crate::models::{Building, City, GeoPoint, Street};

pub const MAGIC: &[u8] = b"ADDR";
pub const VERSION: u32 = 1;

/// Top-level city groups, tagged with their wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CityBlock {
    Settlement,
    Postcodes,
    Village,
}

impl CityBlock {
    pub fn tag(&self) -> u8 {
        match self {
            CityBlock::Settlement => 1,
            CityBlock::Postcodes => 2,
            CityBlock::Village => 3,
        }
    }
}

/// Offset as stored in the index; anything past 2 GiB is rejected.
pub(crate) fn file_offset(offset: u64) -> Result<u32> {
    if offset > i32::MAX as u64 {
        return Err(IndexError::OffsetOverflow(offset));
    }
    Ok(offset as u32)
}

fn count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| IndexError::OffsetOverflow(len as u64))
}

/// Position of a written city header.
#[derive(Debug, Clone, Copy)]
pub struct CityRef {
    pub start: u64,
    data_slot: u64,
}

pub struct BinaryAddressWriter<W: Write + Seek> {
    out: W,
    block_slot: Option<u64>,
}

impl<W: Write + Seek> BinaryAddressWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            block_slot: None,
        }
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.out.stream_position()?)
    }

    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.out.write_all(&[v])?;
        Ok(())
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.out.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_i32(&mut self, v: i32) -> Result<()> {
        self.out.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        self.out.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_point(&mut self, p: GeoPoint) -> Result<()> {
        self.out.write_all(&p.lat.to_le_bytes())?;
        self.out.write_all(&p.lon.to_le_bytes())?;
        Ok(())
    }

    fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_u32(count(s.len())?)?;
        self.out.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_names(&mut self, names: &BTreeMap<String, String>) -> Result<()> {
        self.write_u32(count(names.len())?)?;
        for (lang, name) in names {
            self.write_str(lang)?;
            self.write_str(name)?;
        }
        Ok(())
    }

    /// Overwrite a `u32` at `slot`, then return to the end of the stream.
    fn patch_u32(&mut self, slot: u64, value: u32) -> Result<()> {
        self.out.seek(SeekFrom::Start(slot))?;
        self.write_u32(value)?;
        self.out.seek(SeekFrom::End(0))?;
        Ok(())
    }

    pub fn write_header(&mut self, region: &str, created: DateTime<Utc>) -> Result<()> {
        self.out.write_all(MAGIC)?;
        self.write_u32(VERSION)?;
        self.write_str(region)?;
        self.write_i64(created.timestamp_millis())
    }

    pub fn start_city_block(&mut self, block: CityBlock, cities: usize) -> Result<()> {
        self.write_u8(block.tag())?;
        self.block_slot = Some(self.position()?);
        self.write_u32(0)?;
        self.write_u32(count(cities)?)
    }

    /// Back-patch the byte length of the open block.
    pub fn end_city_block(&mut self) -> Result<()> {
        if let Some(slot) = self.block_slot.take() {
            let end = self.position()?;
            let length = file_offset(end - slot - 4)?;
            self.patch_u32(slot, length)?;
        }
        Ok(())
    }

    pub fn write_city_header(&mut self, city: &City) -> Result<CityRef> {
        let start = self.position()?;
        file_offset(start)?;
        self.write_u8(city.city_type.code())?;
        self.write_i64(city.id)?;
        self.write_str(&city.name)?;
        self.write_names(&city.localized)?;
        self.write_point(city.location)?;
        self.write_str(city.postcode.as_deref().unwrap_or_default())?;
        let data_slot = self.position()?;
        self.write_u32(0)?;
        Ok(CityRef { start, data_slot })
    }

    /// Write the city's streets and point its header at them. Returns the
    /// offset of every street record.
    pub fn write_city_data(&mut self, city: &CityRef, streets: &[Street]) -> Result<Vec<u64>> {
        let data = self.position()?;
        let data_offset = file_offset(data)?;
        self.patch_u32(city.data_slot, data_offset)?;

        self.write_u32(count(streets.len())?)?;
        let mut offsets = Vec::with_capacity(streets.len());
        for street in streets {
            offsets.push(self.position()?);
            self.write_street(street)?;
        }
        Ok(offsets)
    }

    fn write_street(&mut self, street: &Street) -> Result<()> {
        self.write_i64(street.id)?;
        self.write_str(&street.name)?;
        self.write_names(&street.localized)?;
        self.write_point(street.location)?;
        self.write_u32(count(street.way_nodes.len())?)?;
        for node in &street.way_nodes {
            self.write_point(*node)?;
        }
        self.write_u32(count(street.buildings.len())?)?;
        for building in &street.buildings {
            self.write_building(building)?;
        }
        Ok(())
    }

    fn write_building(&mut self, b: &Building) -> Result<()> {
        self.write_i64(b.id)?;
        self.write_str(&b.name)?;
        self.write_str(b.name2.as_deref().unwrap_or_default())?;
        self.write_point(b.location)?;
        match b.location2 {
            Some(p) => {
                self.write_u8(1)?;
                self.write_point(p)?;
            }
            None => self.write_u8(0)?,
        }
        self.write_str(b.postcode.as_deref().unwrap_or_default())?;
        self.write_i32(b.interpolation_interval)?;
        self.write_u8(b.interpolation_type.map_or(0, |t| t.code()))
    }

    pub fn write_name_index(&mut self, index: &NameIndex) -> Result<()> {
        self.write_u32(count(index.len())?)?;
        for (prefix, objects) in index.iter() {
            self.write_str(prefix)?;
            self.write_u32(count(objects.len())?)?;
            for object in objects {
                self.write_u8(object.kind.code())?;
                self.write_i64(object.id)?;
                self.write_u32(object.offset)?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

//! The 128-byte directory entry ("property") record and its name-ordering rules.

use std::cmp::Ordering;

use crate::block::{BlockId, PropertyIndex, PROPERTY_SIZE};
use crate::error::{CfbError, CfbResult};
use crate::util::{read_guid, read_u16, read_u32, write_guid, write_u16, write_u32, write_u64, Guid};

const OFF_NAME: usize = 0x00;
const NAME_FIELD_BYTES: usize = 0x40;
const MAX_NAME_UTF16_UNITS: usize = 31;

const OFF_NAME_LEN: usize = 0x40;
const OFF_TYPE: usize = 0x42;
const OFF_BLOCK_TYPE: usize = 0x43;
const OFF_PREV: usize = 0x44;
const OFF_NEXT: usize = 0x48;
const OFF_DIR: usize = 0x4C;
const OFF_CLSID: usize = 0x50;
const OFF_TIMESTAMPS: usize = 0x60;
const OFF_STARTING_BLOCK: usize = 0x74;
const OFF_SIZE_LOW: usize = 0x78;
const OFF_SIZE_HIGH: usize = 0x7C;

/// The kind of directory-tree node a [`Property`] represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyType {
    Storage = 1,
    Stream = 2,
    Root = 5,
}

impl PropertyType {
    fn from_u8(v: u8) -> CfbResult<Self> {
        match v {
            1 => Ok(PropertyType::Storage),
            2 => Ok(PropertyType::Stream),
            5 => Ok(PropertyType::Root),
            _ => Err(CfbError::Corruption(format!("invalid property type {v}"))),
        }
    }
}

/// Whether a stream property's contents live in the small-block or big-block depot.
///
/// Stored for information only; which depot actually owns a stream's chain is determined once,
/// at the stream's first grow from empty, and never migrates afterward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockLocation {
    Small = 0,
    Big = 1,
}

/// One 128-byte directory entry.
#[derive(Clone, Debug)]
pub struct Property {
    /// UTF-16 name, NUL-terminated, at most 31 code units plus the NUL (enforced on write).
    pub name: Vec<u16>,
    pub property_type: PropertyType,
    pub block_location: BlockLocation,
    pub previous: PropertyIndex,
    pub next: PropertyIndex,
    pub dir: PropertyIndex,
    pub clsid: Guid,
    pub starting_block: BlockId,
    pub size: u64,
}

impl Property {
    /// Builds a brand-new, unlinked property ready for insertion into a directory.
    pub fn new(name: &str, property_type: PropertyType) -> CfbResult<Self> {
        let encoded = encode_name(name)?;
        Ok(Property {
            name: encoded,
            property_type,
            block_location: BlockLocation::Small,
            previous: PropertyIndex::NULL,
            next: PropertyIndex::NULL,
            dir: PropertyIndex::NULL,
            clsid: Guid::NIL,
            starting_block: BlockId::END_OF_CHAIN,
            size: 0,
        })
    }

    /// A free (reusable) slot: `nameLen == 0`.
    pub fn free() -> Self {
        Property {
            name: Vec::new(),
            property_type: PropertyType::Storage,
            block_location: BlockLocation::Small,
            previous: PropertyIndex::NULL,
            next: PropertyIndex::NULL,
            dir: PropertyIndex::NULL,
            clsid: Guid::NIL,
            starting_block: BlockId::END_OF_CHAIN,
            size: 0,
        }
    }

    /// A slot counts as free when its name length is zero.
    pub fn is_free(&self) -> bool {
        self.name.is_empty()
    }

    /// Name as a Rust `String`, stripped of the NUL terminator.
    pub fn name_string(&self) -> String {
        String::from_utf16_lossy(&self.name)
    }

    pub fn decode(buf: &[u8]) -> CfbResult<Self> {
        if buf.len() < PROPERTY_SIZE {
            return Err(CfbError::Corruption("short property record".into()));
        }

        let name_len = read_u16(buf, OFF_NAME_LEN) as usize;
        if name_len == 0 {
            return Ok(Property::free());
        }
        if name_len > NAME_FIELD_BYTES || name_len % 2 != 0 {
            return Err(CfbError::Corruption(format!(
                "invalid property nameLen {name_len}"
            )));
        }

        // name_len counts the trailing NUL; drop it when decoding to UTF-16 units.
        let unit_count = name_len / 2;
        let mut name = Vec::with_capacity(unit_count);
        for i in 0..unit_count {
            name.push(read_u16(buf, OFF_NAME + i * 2));
        }
        if name.last() == Some(&0) {
            name.pop();
        }

        let property_type = PropertyType::from_u8(buf[OFF_TYPE])?;
        let block_location = if buf[OFF_BLOCK_TYPE] == 1 {
            BlockLocation::Big
        } else {
            BlockLocation::Small
        };

        Ok(Property {
            name,
            property_type,
            block_location,
            previous: PropertyIndex(read_u32(buf, OFF_PREV)),
            next: PropertyIndex(read_u32(buf, OFF_NEXT)),
            dir: PropertyIndex(read_u32(buf, OFF_DIR)),
            clsid: read_guid(buf, OFF_CLSID),
            starting_block: BlockId(read_u32(buf, OFF_STARTING_BLOCK)),
            size: read_u32(buf, OFF_SIZE_LOW) as u64,
        })
    }

    pub fn encode(&self, buf: &mut [u8]) -> CfbResult<()> {
        if buf.len() < PROPERTY_SIZE {
            return Err(CfbError::Corruption("short property record".into()));
        }
        buf[..PROPERTY_SIZE].fill(0);

        if self.is_free() {
            return Ok(());
        }

        let mut with_nul = self.name.clone();
        with_nul.push(0);
        let name_len_bytes = with_nul.len() * 2;
        if name_len_bytes > NAME_FIELD_BYTES {
            return Err(CfbError::InvalidName);
        }

        for (i, unit) in with_nul.iter().enumerate() {
            write_u16(buf, OFF_NAME + i * 2, *unit);
        }
        write_u16(buf, OFF_NAME_LEN, name_len_bytes as u16);
        buf[OFF_TYPE] = self.property_type as u8;
        buf[OFF_BLOCK_TYPE] = self.block_location as u8;
        write_u32(buf, OFF_PREV, self.previous.0);
        write_u32(buf, OFF_NEXT, self.next.0);
        write_u32(buf, OFF_DIR, self.dir.0);
        write_guid(buf, OFF_CLSID, &self.clsid);
        write_u64(buf, OFF_TIMESTAMPS, 0);
        write_u64(buf, OFF_TIMESTAMPS + 8, 0);
        write_u32(buf, OFF_STARTING_BLOCK, self.starting_block.0);
        write_u32(buf, OFF_SIZE_LOW, self.size as u32);
        write_u32(buf, OFF_SIZE_HIGH, 0);

        Ok(())
    }
}

pub(crate) fn encode_name(name: &str) -> CfbResult<Vec<u16>> {
    if name.is_empty() {
        // An empty name would encode to the same zero-length unit vector `Property::is_free`
        // uses to mark a slot free, silently turning the new element back into free space.
        return Err(CfbError::InvalidArg);
    }
    let units: Vec<u16> = name.encode_utf16().collect();
    if units.len() > MAX_NAME_UTF16_UNITS {
        return Err(CfbError::InvalidName);
    }
    Ok(units)
}

/// Orders two property names the way the format's directory BST requires: first by the byte
/// length of the NUL-terminated UTF-16 name, then by uppercased UTF-16 code unit.
///
/// This is deliberately not a conformant lexicographic order (`"b" < "aa"`, since `"b"`'s
/// NUL-terminated encoding is shorter) — files produced by conforming implementations rely on
/// this exact ordering, so it is preserved rather than "fixed".
pub fn property_name_cmp(a: &[u16], b: &[u16]) -> Ordering {
    let len_a = (a.len() + 1) * 2;
    let len_b = (b.len() + 1) * 2;
    match len_a.cmp(&len_b) {
        Ordering::Equal => {}
        other => return other,
    }

    let upper_a = a.iter().map(|u| upper_utf16_unit(*u));
    let upper_b = b.iter().map(|u| upper_utf16_unit(*u));
    upper_a.cmp(upper_b)
}

fn upper_utf16_unit(unit: u16) -> u16 {
    if let Some(c) = char::from_u32(unit as u32) {
        let mut upper = c.to_uppercase();
        if let Some(u) = upper.next() {
            if upper.next().is_none() {
                let mut buf = [0u16; 2];
                return u.encode_utf16(&mut buf)[0];
            }
        }
    }
    unit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_encode_decode() {
        let mut p = Property::new("alpha", PropertyType::Stream).unwrap();
        p.starting_block = BlockId(7);
        p.size = 100;

        let mut buf = [0u8; PROPERTY_SIZE];
        p.encode(&mut buf).unwrap();

        let decoded = Property::decode(&buf).unwrap();
        assert_eq!(decoded.name_string(), "alpha");
        assert_eq!(decoded.property_type, PropertyType::Stream);
        assert_eq!(decoded.starting_block, BlockId(7));
        assert_eq!(decoded.size, 100);
    }

    #[test]
    fn free_slot_has_zero_name_len() {
        let free = Property::free();
        let mut buf = [0xFFu8; PROPERTY_SIZE];
        free.encode(&mut buf).unwrap();
        assert_eq!(read_u16(&buf, OFF_NAME_LEN), 0);

        let decoded = Property::decode(&buf).unwrap();
        assert!(decoded.is_free());
    }

    #[test]
    fn name_too_long_is_rejected() {
        let long = "x".repeat(40);
        assert!(matches!(
            Property::new(&long, PropertyType::Stream),
            Err(CfbError::InvalidName)
        ));
    }

    #[test]
    fn empty_name_is_rejected() {
        // An empty name would encode to the same empty unit vector `Property::is_free` treats as
        // a free slot, so it must be refused rather than silently creating an unfindable element.
        assert!(matches!(
            Property::new("", PropertyType::Stream),
            Err(CfbError::InvalidArg)
        ));
    }

    #[test]
    fn name_cmp_is_length_first_not_lexicographic() {
        let b: Vec<u16> = "b".encode_utf16().collect();
        let aa: Vec<u16> = "aa".encode_utf16().collect();
        // "b" (NUL-terminated: 4 bytes) sorts before "aa" (NUL-terminated: 6 bytes), even though
        // it would not under plain lexicographic order.
        assert_eq!(property_name_cmp(&b, &aa), Ordering::Less);
    }

    #[test]
    fn name_cmp_is_case_insensitive_for_equal_length() {
        let a: Vec<u16> = "abc".encode_utf16().collect();
        let b: Vec<u16> = "ABC".encode_utf16().collect();
        assert_eq!(property_name_cmp(&a, &b), Ordering::Equal);
    }

    #[test]
    fn name_cmp_orders_same_length_alphabetically() {
        let a: Vec<u16> = "aaa".encode_utf16().collect();
        let b: Vec<u16> = "bbb".encode_utf16().collect();
        assert_eq!(property_name_cmp(&a, &b), Ordering::Less);
    }
}

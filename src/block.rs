//! Block and property indices, and the sizing constants shared by the whole on-disk layout.

use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::ops::Add;

/// Default size of a big block (sector), in bytes.
pub const DEFAULT_BIG_BLOCK_SIZE: usize = 512;

/// Default size of a small block, in bytes.
pub const DEFAULT_SMALL_BLOCK_SIZE: usize = 64;

/// Streams this size or larger live in the big block depot; smaller streams live in the
/// mini-stream (small blocks). Decided once, at the first [`crate::Stream::set_size`] call from
/// an empty stream; a stream never migrates between the two afterwards.
pub const DEFAULT_SMALL_BLOCK_THRESHOLD: u32 = 4096;

/// Size in bytes of one directory property record.
pub const PROPERTY_SIZE: usize = 128;

/// Number of big block depot sector numbers that fit directly in the header.
pub const COUNT_BBDEPOTINHEADER: usize = 109;

/// A block index into the big block depot or the file itself.
///
/// Wraps a plain `u32` so the three sentinel values can't be confused with a real block number by
/// accident, the way a bare integer would allow.
#[derive(Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Marks a FAT/depot slot that has never been allocated.
    pub const UNUSED: BlockId = BlockId(0xFFFF_FFFF);

    /// Terminates a block chain.
    pub const END_OF_CHAIN: BlockId = BlockId(0xFFFF_FFFE);

    /// Marks a slot in the big block depot that is itself occupied by a depot sector (i.e. a FAT
    /// sector describing itself).
    pub const SPECIAL: BlockId = BlockId(0xFFFF_FFFD);

    /// True if this is one of the three reserved sentinel values rather than a real block number.
    pub fn is_sentinel(self) -> bool {
        matches!(self, Self::UNUSED | Self::END_OF_CHAIN | Self::SPECIAL)
    }

    /// True if this is [`BlockId::END_OF_CHAIN`].
    pub fn is_end_of_chain(self) -> bool {
        self == Self::END_OF_CHAIN
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

impl From<u32> for BlockId {
    fn from(v: u32) -> Self {
        BlockId(v)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::UNUSED => write!(f, "BlockId::UNUSED"),
            Self::END_OF_CHAIN => write!(f, "BlockId::END_OF_CHAIN"),
            Self::SPECIAL => write!(f, "BlockId::SPECIAL"),
            BlockId(n) => write!(f, "BlockId({n})"),
        }
    }
}

impl Add<u32> for BlockId {
    type Output = BlockId;

    fn add(self, rhs: u32) -> BlockId {
        BlockId(self.0 + rhs)
    }
}

/// An index into the flat array of directory properties.
///
/// `PROPERTY_NULL` (`0xFFFFFFFF`) marks the absence of a child/sibling in the directory BST, the
/// same sentinel value used for an unused [`BlockId`]; kept as a distinct type so the two index
/// spaces can never be mixed up by the type checker.
#[derive(Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct PropertyIndex(pub u32);

impl PropertyIndex {
    pub const NULL: PropertyIndex = PropertyIndex(0xFFFF_FFFF);

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for PropertyIndex {
    fn from(v: u32) -> Self {
        PropertyIndex(v)
    }
}

impl From<usize> for PropertyIndex {
    fn from(v: usize) -> Self {
        PropertyIndex(v as u32)
    }
}

impl fmt::Debug for PropertyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "PropertyIndex::NULL")
        } else {
            write!(f, "PropertyIndex({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_recognized() {
        assert!(BlockId::UNUSED.is_sentinel());
        assert!(BlockId::END_OF_CHAIN.is_sentinel());
        assert!(BlockId::SPECIAL.is_sentinel());
        assert!(!BlockId(0).is_sentinel());
        assert!(!BlockId(COUNT_BBDEPOTINHEADER as u32).is_sentinel());
    }

    #[test]
    fn property_null_roundtrips() {
        assert!(PropertyIndex::NULL.is_null());
        assert!(!PropertyIndex::from(0u32).is_null());
    }
}

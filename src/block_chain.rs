//! A logical byte stream over a linked list of big blocks, chained through the depot.
//!
//! A chain's head pointer lives either in the file header (the property table chain and the SBD
//! chain) or in a directory property's `startingBlock` field (every stream's own data, and the
//! mini-stream). [`ChainOwner`] abstracts over the two so the read/write/resize logic below is
//! written once.

use crate::block::BlockId;
use crate::error::{CfbError, CfbResult};
use crate::host_file::BigBlockFile;
use crate::property::Property;
use crate::CompoundFile;

/// Identifies where a chain's head pointer and length live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainOwner {
    /// The property table chain (`header.root_start_block`).
    RootPropertyTable,
    /// The Small Block Depot chain (`header.sbd_start`).
    SmallBlockDepot,
    /// A stream or the mini-stream; head is that property's `startingBlock`.
    Property(u32),
}

impl CompoundFile {
    fn chain_head(&mut self, owner: ChainOwner) -> CfbResult<BlockId> {
        match owner {
            ChainOwner::RootPropertyTable => Ok(self.header.root_start_block),
            ChainOwner::SmallBlockDepot => Ok(self.header.sbd_start),
            ChainOwner::Property(index) => Ok(self.read_property_raw(index)?.starting_block),
        }
    }

    fn set_chain_head(&mut self, owner: ChainOwner, head: BlockId) -> CfbResult<()> {
        match owner {
            ChainOwner::RootPropertyTable => {
                self.header.root_start_block = head;
                self.write_header()
            }
            ChainOwner::SmallBlockDepot => {
                self.header.sbd_start = head;
                self.write_header()
            }
            ChainOwner::Property(index) => {
                let mut p = self.read_property_raw(index)?;
                p.starting_block = head;
                self.write_property_raw(index, &p)
            }
        }
    }

    /// Walks `owner`'s chain, returning the block index at `steps` hops from the head.
    pub(crate) fn walk_chain(&mut self, owner: ChainOwner, steps: u64) -> CfbResult<BlockId> {
        let mut current = self.chain_head(owner)?;
        for _ in 0..steps {
            if current.is_sentinel() {
                return Err(CfbError::Corruption("block chain ended early".into()));
            }
            current = self.bbd_get_next(current.0)?;
        }
        Ok(current)
    }

    /// Number of blocks in `owner`'s chain.
    pub(crate) fn chain_block_count(&mut self, owner: ChainOwner) -> CfbResult<u64> {
        let mut count = 0u64;
        let mut current = self.chain_head(owner)?;
        while !current.is_sentinel() {
            count += 1;
            current = self.bbd_get_next(current.0)?;
            if count > self.host.block_count()? + 1 {
                return Err(CfbError::Corruption("block chain does not terminate".into()));
            }
        }
        Ok(count)
    }

    /// Logical size of the chain: the owning property's stored `size` if any, else
    /// `count * bigBlockSize`.
    pub(crate) fn chain_logical_size(&mut self, owner: ChainOwner) -> CfbResult<u64> {
        match owner {
            ChainOwner::Property(index) => Ok(self.read_property_raw(index)?.size),
            _ => {
                let count = self.chain_block_count(owner)?;
                Ok(count * self.big_block_size as u64)
            }
        }
    }

    /// Reads up to `buf.len()` bytes starting at byte `offset` into `buf`. Returns the number of
    /// bytes actually read; a short read (chain ends before `offset + buf.len()`) is reflected in
    /// the returned count rather than an error.
    pub(crate) fn chain_read_at(
        &mut self,
        owner: ChainOwner,
        offset: u64,
        buf: &mut [u8],
    ) -> CfbResult<usize> {
        let block_size = self.big_block_size as u64;
        let mut remaining = buf.len();
        let mut buf_pos = 0usize;
        let mut file_pos = offset;

        while remaining > 0 {
            let block_no = file_pos / block_size;
            let in_block_off = (file_pos % block_size) as usize;

            let block_id = match self.walk_chain(owner, block_no) {
                Ok(id) if !id.is_sentinel() => id,
                _ => break,
            };

            let mut page = vec![0u8; self.big_block_size];
            self.host.read_block(block_id.0, &mut page)?;

            let take = remaining.min(self.big_block_size - in_block_off);
            buf[buf_pos..buf_pos + take]
                .copy_from_slice(&page[in_block_off..in_block_off + take]);

            buf_pos += take;
            remaining -= take;
            file_pos += take as u64;
        }

        Ok(buf_pos)
    }

    /// Writes `buf` at byte `offset`. The chain must already be large enough ([`Self::chain_set_size`]
    /// is the caller's responsibility); writing past the end of the chain is an error.
    pub(crate) fn chain_write_at(
        &mut self,
        owner: ChainOwner,
        offset: u64,
        buf: &[u8],
    ) -> CfbResult<usize> {
        let block_size = self.big_block_size as u64;
        let mut remaining = buf.len();
        let mut buf_pos = 0usize;
        let mut file_pos = offset;

        while remaining > 0 {
            let block_no = file_pos / block_size;
            let in_block_off = (file_pos % block_size) as usize;

            let block_id = self.walk_chain(owner, block_no)?;
            if block_id.is_sentinel() {
                return Err(CfbError::Corruption(
                    "write past end of block chain".into(),
                ));
            }

            let mut page = vec![0u8; self.big_block_size];
            self.host.read_block(block_id.0, &mut page)?;

            let take = remaining.min(self.big_block_size - in_block_off);
            page[in_block_off..in_block_off + take]
                .copy_from_slice(&buf[buf_pos..buf_pos + take]);
            self.host.write_block(block_id.0, &page)?;

            buf_pos += take;
            remaining -= take;
            file_pos += take as u64;
        }

        Ok(buf_pos)
    }

    /// Grows or shrinks `owner`'s chain to cover exactly `ceil(new_size / bigBlockSize)` blocks.
    /// Does not touch any property's stored logical `size` — callers that resize a stream are
    /// responsible for persisting that separately.
    pub(crate) fn chain_set_size(&mut self, owner: ChainOwner, new_size: u64) -> CfbResult<()> {
        let block_size = self.big_block_size as u64;
        let new_count = (new_size + block_size - 1) / block_size;
        let old_count = self.chain_block_count(owner)?;

        use std::cmp::Ordering;
        match new_count.cmp(&old_count) {
            Ordering::Equal => Ok(()),
            Ordering::Less => self.chain_shrink(owner, new_count),
            Ordering::Greater => self.chain_enlarge(owner, old_count, new_count),
        }
    }

    fn chain_shrink(&mut self, owner: ChainOwner, new_count: u64) -> CfbResult<()> {
        if new_count == 0 {
            let head = self.chain_head(owner)?;
            self.free_chain_from(head)?;
            return self.set_chain_head(owner, BlockId::END_OF_CHAIN);
        }

        let keep = self.walk_chain(owner, new_count - 1)?;
        let next = self.bbd_get_next(keep.0)?;
        self.bbd_set_next(keep.0, BlockId::END_OF_CHAIN)?;
        self.free_chain_from(next)
    }

    fn free_chain_from(&mut self, mut current: BlockId) -> CfbResult<()> {
        while !current.is_sentinel() {
            let next = self.bbd_get_next(current.0)?;
            self.free_big_block(current.0)?;
            current = next;
        }
        Ok(())
    }

    fn chain_enlarge(&mut self, owner: ChainOwner, old_count: u64, new_count: u64) -> CfbResult<()> {
        let mut tail = if old_count == 0 {
            let first = self.allocate_big_block()?;
            self.set_chain_head(owner, first)?;
            first
        } else {
            self.walk_chain(owner, old_count - 1)?
        };

        let already = if old_count == 0 { 1 } else { old_count };
        for _ in already..new_count {
            let block = self.allocate_big_block()?;
            self.bbd_set_next(tail.0, block)?;
            tail = block;
        }
        Ok(())
    }

    pub(crate) fn read_property_raw(&mut self, index: u32) -> CfbResult<Property> {
        let mut buf = [0u8; crate::block::PROPERTY_SIZE];
        let offset = index as u64 * crate::block::PROPERTY_SIZE as u64;
        let n = self.chain_read_at(ChainOwner::RootPropertyTable, offset, &mut buf)?;
        if n < buf.len() {
            return Err(CfbError::Corruption(format!(
                "property {index} lies beyond the property table"
            )));
        }
        Property::decode(&buf)
    }

    pub(crate) fn write_property_raw(&mut self, index: u32, property: &Property) -> CfbResult<()> {
        let mut buf = [0u8; crate::block::PROPERTY_SIZE];
        property.encode(&mut buf)?;
        let offset = index as u64 * crate::block::PROPERTY_SIZE as u64;
        self.chain_write_at(ChainOwner::RootPropertyTable, offset, &buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompoundFile;
    use tempfile::tempfile;

    #[test]
    fn enlarge_then_shrink_round_trips_prefix() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();
        let owner = ChainOwner::Property(0); // root's mini-stream chain, unused by anything else yet

        cf.chain_set_size(owner, 1500).unwrap();
        assert_eq!(cf.chain_block_count(owner).unwrap(), 3);

        let pattern: Vec<u8> = (0..1500u32).map(|i| (i & 0xFF) as u8).collect();
        cf.chain_write_at(owner, 0, &pattern).unwrap();

        cf.chain_set_size(owner, 600).unwrap();
        assert_eq!(cf.chain_block_count(owner).unwrap(), 2);

        let mut out = vec![0u8; 600];
        let n = cf.chain_read_at(owner, 0, &mut out).unwrap();
        assert_eq!(n, 600);
        assert_eq!(out, pattern[..600]);
    }

    #[test]
    fn shrink_to_zero_leaves_empty_chain() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();
        let owner = ChainOwner::Property(0);

        cf.chain_set_size(owner, 2048).unwrap();
        cf.chain_set_size(owner, 0).unwrap();
        assert_eq!(cf.chain_block_count(owner).unwrap(), 0);
    }
}

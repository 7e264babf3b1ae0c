//! The Small Block Depot (SBD) and small-block chains layered inside the mini-stream.
//!
//! Small blocks hold the content of streams smaller than the small-block threshold. Unlike big
//! blocks, their next-pointers live in the SBD (itself a big-block chain,
//! [`crate::block_chain::ChainOwner::SmallBlockDepot`]) and their bytes live inside the
//! mini-stream, the root property's own big-block chain
//! ([`crate::block_chain::ChainOwner::Property`] with index 0).

use crate::block::BlockId;
use crate::block_chain::ChainOwner;
use crate::error::{CfbError, CfbResult};
use crate::host_file::BigBlockFile;
use crate::util::read_u32;
use crate::CompoundFile;

const ROOT_PROPERTY_INDEX: u32 = 0;

impl CompoundFile {
    fn small_blocks_per_big_block(&self) -> u64 {
        (self.big_block_size / self.small_block_size) as u64
    }

    fn sbd_entries_per_page(&self) -> u64 {
        (self.big_block_size / 4) as u64
    }

    fn sbd_entries_covered(&mut self) -> CfbResult<u64> {
        Ok(self.chain_block_count(ChainOwner::SmallBlockDepot)? * self.sbd_entries_per_page())
    }

    fn sbd_get_next(&mut self, index: u32) -> CfbResult<BlockId> {
        let mut buf = [0u8; 4];
        let n = self.chain_read_at(
            ChainOwner::SmallBlockDepot,
            index as u64 * 4,
            &mut buf,
        )?;
        if n < 4 {
            return Err(CfbError::Corruption(format!(
                "small block {index} lies beyond the small block depot"
            )));
        }
        Ok(BlockId(read_u32(&buf, 0)))
    }

    fn sbd_set_next(&mut self, index: u32, next: BlockId) -> CfbResult<()> {
        self.chain_write_at(
            ChainOwner::SmallBlockDepot,
            index as u64 * 4,
            &next.0.to_le_bytes(),
        )?;
        Ok(())
    }

    /// Grows the SBD by one page (128 fresh `BLOCK_UNUSED` entries on the default geometry).
    fn sbd_grow_page(&mut self) -> CfbResult<()> {
        let old_blocks = self.chain_block_count(ChainOwner::SmallBlockDepot)?;
        log::debug!("growing small block depot to {} page(s)", old_blocks + 1);
        self.chain_set_size(
            ChainOwner::SmallBlockDepot,
            (old_blocks + 1) * self.big_block_size as u64,
        )?;
        let new_block = self.walk_chain(ChainOwner::SmallBlockDepot, old_blocks)?;
        let filler = vec![0xFFu8; self.big_block_size];
        self.host.write_block(new_block.0, &filler)
    }

    /// Grows the mini-stream so it physically holds `small_block_count` small blocks, and keeps
    /// the root property's `size` in sync with the mini-stream's big-block-rounded capacity.
    fn ensure_mini_stream_capacity(&mut self, small_block_count: u64) -> CfbResult<()> {
        let required_bytes = small_block_count * self.small_block_size as u64;
        self.chain_set_size(ChainOwner::Property(ROOT_PROPERTY_INDEX), required_bytes)?;

        let block_count = self.chain_block_count(ChainOwner::Property(ROOT_PROPERTY_INDEX))?;
        let mut root = self.read_property_raw(ROOT_PROPERTY_INDEX)?;
        root.size = block_count * self.big_block_size as u64;
        self.write_property_raw(ROOT_PROPERTY_INDEX, &root)
    }

    /// Finds a free small block, growing the SBD and/or the mini-stream as needed.
    fn allocate_small_block(&mut self) -> CfbResult<BlockId> {
        loop {
            let covered = self.sbd_entries_covered()?;
            for index in 0..covered {
                if self.sbd_get_next(index as u32)?.0 == BlockId::UNUSED.0 {
                    let population = index + 1;
                    let per_big = self.small_blocks_per_big_block();
                    let blocks_needed = (population + per_big - 1) / per_big;
                    self.ensure_mini_stream_capacity(blocks_needed * per_big)?;
                    self.sbd_set_next(index as u32, BlockId::END_OF_CHAIN)?;
                    return Ok(BlockId(index as u32));
                }
            }
            self.sbd_grow_page()?;
        }
    }

    fn free_small_block(&mut self, index: u32) -> CfbResult<()> {
        self.sbd_set_next(index, BlockId::UNUSED)
    }

    fn small_chain_head(&mut self, owner: u32) -> CfbResult<BlockId> {
        Ok(self.read_property_raw(owner)?.starting_block)
    }

    fn set_small_chain_head(&mut self, owner: u32, head: BlockId) -> CfbResult<()> {
        let mut p = self.read_property_raw(owner)?;
        p.starting_block = head;
        self.write_property_raw(owner, &p)
    }

    fn walk_small(&mut self, owner: u32, steps: u64) -> CfbResult<BlockId> {
        let mut current = self.small_chain_head(owner)?;
        for _ in 0..steps {
            if current.is_sentinel() {
                return Err(CfbError::Corruption("small block chain ended early".into()));
            }
            current = self.sbd_get_next(current.0)?;
        }
        Ok(current)
    }

    pub(crate) fn small_chain_block_count(&mut self, owner: u32) -> CfbResult<u64> {
        let mut count = 0u64;
        let mut current = self.small_chain_head(owner)?;
        let bound = self.sbd_entries_covered()? + 1;
        while !current.is_sentinel() {
            count += 1;
            current = self.sbd_get_next(current.0)?;
            if count > bound {
                return Err(CfbError::Corruption(
                    "small block chain does not terminate".into(),
                ));
            }
        }
        Ok(count)
    }

    pub(crate) fn small_chain_read_at(
        &mut self,
        owner: u32,
        offset: u64,
        buf: &mut [u8],
    ) -> CfbResult<usize> {
        let block_size = self.small_block_size as u64;
        let mut remaining = buf.len();
        let mut buf_pos = 0usize;
        let mut file_pos = offset;

        while remaining > 0 {
            let block_no = file_pos / block_size;
            let in_block_off = (file_pos % block_size) as usize;

            let block_id = match self.walk_small(owner, block_no) {
                Ok(id) if !id.is_sentinel() => id,
                _ => break,
            };

            let mut mini = vec![0u8; self.small_block_size];
            let mini_offset = block_id.0 as u64 * self.small_block_size as u64;
            self.chain_read_at(ChainOwner::Property(ROOT_PROPERTY_INDEX), mini_offset, &mut mini)?;

            let take = remaining.min(self.small_block_size - in_block_off);
            buf[buf_pos..buf_pos + take].copy_from_slice(&mini[in_block_off..in_block_off + take]);

            buf_pos += take;
            remaining -= take;
            file_pos += take as u64;
        }

        Ok(buf_pos)
    }

    pub(crate) fn small_chain_write_at(
        &mut self,
        owner: u32,
        offset: u64,
        buf: &[u8],
    ) -> CfbResult<usize> {
        let block_size = self.small_block_size as u64;
        let mut remaining = buf.len();
        let mut buf_pos = 0usize;
        let mut file_pos = offset;

        while remaining > 0 {
            let block_no = file_pos / block_size;
            let in_block_off = (file_pos % block_size) as usize;

            let block_id = self.walk_small(owner, block_no)?;
            if block_id.is_sentinel() {
                return Err(CfbError::Corruption(
                    "write past end of small block chain".into(),
                ));
            }

            let mut mini = vec![0u8; self.small_block_size];
            let mini_offset = block_id.0 as u64 * self.small_block_size as u64;
            self.chain_read_at(ChainOwner::Property(ROOT_PROPERTY_INDEX), mini_offset, &mut mini)?;

            let take = remaining.min(self.small_block_size - in_block_off);
            mini[in_block_off..in_block_off + take].copy_from_slice(&buf[buf_pos..buf_pos + take]);
            self.chain_write_at(ChainOwner::Property(ROOT_PROPERTY_INDEX), mini_offset, &mini)?;

            buf_pos += take;
            remaining -= take;
            file_pos += take as u64;
        }

        Ok(buf_pos)
    }

    pub(crate) fn small_chain_set_size(&mut self, owner: u32, new_size: u64) -> CfbResult<()> {
        let block_size = self.small_block_size as u64;
        let new_count = (new_size + block_size - 1) / block_size;
        let old_count = self.small_chain_block_count(owner)?;

        use std::cmp::Ordering;
        match new_count.cmp(&old_count) {
            Ordering::Equal => Ok(()),
            Ordering::Less => self.small_chain_shrink(owner, new_count),
            Ordering::Greater => self.small_chain_enlarge(owner, old_count, new_count),
        }
    }

    fn small_chain_shrink(&mut self, owner: u32, new_count: u64) -> CfbResult<()> {
        if new_count == 0 {
            let head = self.small_chain_head(owner)?;
            self.free_small_chain_from(head)?;
            return self.set_small_chain_head(owner, BlockId::END_OF_CHAIN);
        }

        let keep = self.walk_small(owner, new_count - 1)?;
        let next = self.sbd_get_next(keep.0)?;
        self.sbd_set_next(keep.0, BlockId::END_OF_CHAIN)?;
        self.free_small_chain_from(next)
    }

    fn free_small_chain_from(&mut self, mut current: BlockId) -> CfbResult<()> {
        while !current.is_sentinel() {
            let next = self.sbd_get_next(current.0)?;
            self.free_small_block(current.0)?;
            current = next;
        }
        Ok(())
    }

    fn small_chain_enlarge(&mut self, owner: u32, old_count: u64, new_count: u64) -> CfbResult<()> {
        let mut tail = if old_count == 0 {
            let first = self.allocate_small_block()?;
            self.set_small_chain_head(owner, first)?;
            first
        } else {
            self.walk_small(owner, old_count - 1)?
        };

        let already = if old_count == 0 { 1 } else { old_count };
        for _ in already..new_count {
            let block = self.allocate_small_block()?;
            self.sbd_set_next(tail.0, block)?;
            tail = block;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Property, PropertyType};
    use tempfile::tempfile;

    #[test]
    fn small_stream_round_trips_and_sets_mini_stream_size() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();

        let mut stream = Property::new("alpha", PropertyType::Stream).unwrap();
        stream.starting_block = BlockId::END_OF_CHAIN;
        let index = cf.allocate_free_property().unwrap();
        cf.write_property_raw(index, &stream).unwrap();

        cf.small_chain_set_size(index, 100).unwrap();
        let pattern = vec![0x41u8; 100];
        cf.small_chain_write_at(index, 0, &pattern).unwrap();

        let mut out = vec![0u8; 100];
        cf.small_chain_read_at(index, 0, &mut out).unwrap();
        assert_eq!(out, pattern);

        let root = cf.read_property_raw(ROOT_PROPERTY_INDEX).unwrap();
        assert_eq!(root.size, cf.big_block_size as u64);
    }
}

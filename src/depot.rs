//! Big Block Depot (BBD) management: the FAT-like table of next-block pointers for big blocks,
//! plus allocation of fresh big blocks.
//!
//! The BBD itself lives in big blocks, whose indices are recorded in the header's inline
//! `bbd_start` array (extended BBD pages, for files needing more than
//! [`crate::block::COUNT_BBDEPOTINHEADER`] depot pages, are not supported — see `DESIGN.md`).

use crate::block::BlockId;
use crate::error::{CfbError, CfbResult};
use crate::host_file::BigBlockFile;
use crate::util::{read_u32, write_u32};
use crate::CompoundFile;

impl CompoundFile {
    fn entries_per_block(&self) -> usize {
        self.big_block_size / 4
    }

    /// Locates the depot page and in-page slot holding block `index`'s next-pointer.
    fn locate(&self, index: u32) -> CfbResult<(usize, usize)> {
        let per_page = self.entries_per_block();
        let page = index as usize / per_page;
        let slot = index as usize % per_page;
        if page >= self.header.bbd_count as usize {
            return Err(CfbError::Corruption(format!(
                "block {index} lies beyond the big block depot ({} pages)",
                self.header.bbd_count
            )));
        }
        Ok((page, slot))
    }

    /// Reads the next-block pointer for big block `index`.
    pub(crate) fn bbd_get_next(&mut self, index: u32) -> CfbResult<BlockId> {
        let (page, slot) = self.locate(index)?;
        let page_block = self.header.bbd_start[page];
        let mut buf = vec![0u8; self.big_block_size];
        self.host.read_block(page_block.0, &mut buf)?;
        Ok(BlockId(read_u32(&buf, slot * 4)))
    }

    /// Writes the next-block pointer for big block `index`.
    pub(crate) fn bbd_set_next(&mut self, index: u32, next: BlockId) -> CfbResult<()> {
        let (page, slot) = self.locate(index)?;
        let page_block = self.header.bbd_start[page];
        let mut buf = vec![0u8; self.big_block_size];
        self.host.read_block(page_block.0, &mut buf)?;
        write_u32(&mut buf, slot * 4, next.0);
        self.host.write_block(page_block.0, &buf)
    }

    /// Appends one more depot page, covering `entries_per_block()` additional big block slots,
    /// all initially `BLOCK_UNUSED` save for the page's own slot (marked `BLOCK_SPECIAL`, since
    /// the page occupies a big block itself).
    fn grow_bbd(&mut self) -> CfbResult<()> {
        let page_index = self.header.bbd_count as usize;
        if page_index >= self.header.bbd_start.len() {
            return Err(CfbError::NotImplemented("extended big block depot"));
        }
        log::debug!("growing big block depot to {} page(s)", page_index + 1);

        let per_page = self.entries_per_block();
        let new_block = self.host.block_count()? as u32;
        self.host.set_block_count(new_block as u64 + 1)?;

        let mut buf = vec![0xFFu8; self.big_block_size];
        let covered_start = page_index * per_page;
        let covered_end = covered_start + per_page;
        if (covered_start..covered_end).contains(&(new_block as usize)) {
            let local = new_block as usize - covered_start;
            write_u32(&mut buf, local * 4, BlockId::SPECIAL.0);
        }
        self.host.write_block(new_block, &buf)?;

        self.header.bbd_start[page_index] = BlockId(new_block);
        self.header.bbd_count += 1;
        self.write_header()
    }

    /// Finds the first `BLOCK_UNUSED` slot in the depot, growing it if every existing page is
    /// full, and ensures the host file has storage backing that block index.
    pub(crate) fn allocate_big_block(&mut self) -> CfbResult<BlockId> {
        loop {
            let per_page = self.entries_per_block();
            for page in 0..self.header.bbd_count as usize {
                let page_block = self.header.bbd_start[page];
                let mut buf = vec![0u8; self.big_block_size];
                self.host.read_block(page_block.0, &mut buf)?;
                for slot in 0..per_page {
                    if read_u32(&buf, slot * 4) == BlockId::UNUSED.0 {
                        let index = (page * per_page + slot) as u32;
                        if self.host.block_count()? <= index as u64 {
                            self.host.set_block_count(index as u64 + 1)?;
                        }
                        self.bbd_set_next(index, BlockId::END_OF_CHAIN)?;
                        return Ok(BlockId(index));
                    }
                }
            }
            self.grow_bbd()?;
        }
    }

    /// Marks `index` free in the depot.
    pub(crate) fn free_big_block(&mut self, index: u32) -> CfbResult<()> {
        self.bbd_set_next(index, BlockId::UNUSED)
    }
}

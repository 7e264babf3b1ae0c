//! The public, random-access handle onto a stream's bytes.

use crate::block_chain::ChainOwner;
use crate::enumerator::ElementInfo;
use crate::error::CfbResult;
use crate::property::BlockLocation;
use crate::CompoundFile;

/// Moves a [`Stream`]'s cursor. Mirrors the file-system-independent `Seek` used elsewhere in this
/// crate's ancestry rather than `std::io::SeekFrom`, since a stream handle here is always threaded
/// through an explicit [`CompoundFile`] and never implements `std::io::Read`/`Write` directly.
pub enum Seek {
    Backward(u64),
    Current,
    Forward(u64),
}

/// A stream (byte array) opened within a [`CompoundFile`].
///
/// Holds the stream's property index and a cursor; every byte operation is performed against the
/// [`CompoundFile`] passed explicitly to each call.
pub struct Stream {
    index: u32,
    position: u64,
}

impl Stream {
    pub(crate) fn new(index: u32) -> Self {
        Stream { index, position: 0 }
    }

    /// Reads up to `buf.len()` bytes starting at `offset`, without touching the cursor.
    pub fn read_at(&self, cf: &mut CompoundFile, offset: u64, buf: &mut [u8]) -> CfbResult<usize> {
        let p = cf.read_property_raw(self.index)?;
        match p.block_location {
            BlockLocation::Big => cf.chain_read_at(ChainOwner::Property(self.index), offset, buf),
            BlockLocation::Small => cf.small_chain_read_at(self.index, offset, buf),
        }
    }

    /// Writes `buf` starting at `offset`, growing the stream first if needed, without touching
    /// the cursor.
    pub fn write_at(&self, cf: &mut CompoundFile, offset: u64, buf: &[u8]) -> CfbResult<usize> {
        let p = cf.read_property_raw(self.index)?;
        let end = offset + buf.len() as u64;
        if end > p.size {
            self.set_size(cf, end)?;
        }

        let p = cf.read_property_raw(self.index)?;
        match p.block_location {
            BlockLocation::Big => cf.chain_write_at(ChainOwner::Property(self.index), offset, buf),
            BlockLocation::Small => cf.small_chain_write_at(self.index, offset, buf),
        }
    }

    /// Reads from, and advances, the cursor.
    pub fn read(&mut self, cf: &mut CompoundFile, buf: &mut [u8]) -> CfbResult<usize> {
        let n = self.read_at(cf, self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }

    /// Writes at, and advances, the cursor.
    pub fn write(&mut self, cf: &mut CompoundFile, buf: &[u8]) -> CfbResult<usize> {
        let n = self.write_at(cf, self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }

    pub fn seek(&mut self, pos: Seek) -> u64 {
        match pos {
            Seek::Forward(n) => self.position += n,
            Seek::Backward(n) => self.position = self.position.saturating_sub(n),
            Seek::Current => {}
        }
        self.position
    }

    /// Grows or shrinks the stream to exactly `new_size` bytes.
    ///
    /// The very first time a stream grows from empty, this decides once and for all whether its
    /// content lives in small blocks or big blocks, based on whether `new_size` is below the
    /// small-block threshold; a stream never migrates between the two afterwards, no matter how
    /// much it later grows or shrinks.
    pub fn set_size(&self, cf: &mut CompoundFile, new_size: u64) -> CfbResult<()> {
        let mut p = cf.read_property_raw(self.index)?;

        let first_growth = p.size == 0 && p.starting_block.is_end_of_chain() && new_size > 0;
        if first_growth {
            p.block_location = if new_size < cf.small_block_threshold as u64 {
                BlockLocation::Small
            } else {
                BlockLocation::Big
            };
            cf.write_property_raw(self.index, &p)?;
        }

        match p.block_location {
            BlockLocation::Big => cf.chain_set_size(ChainOwner::Property(self.index), new_size)?,
            BlockLocation::Small => cf.small_chain_set_size(self.index, new_size)?,
        }

        let mut p = cf.read_property_raw(self.index)?;
        p.size = new_size;
        cf.write_property_raw(self.index, &p)
    }

    pub fn size(&self, cf: &mut CompoundFile) -> CfbResult<u64> {
        cf.chain_logical_size(ChainOwner::Property(self.index))
    }

    pub fn stat(&self, cf: &mut CompoundFile) -> CfbResult<ElementInfo> {
        let p = cf.read_property_raw(self.index)?;
        Ok(ElementInfo {
            index: self.index,
            name: p.name_string(),
            kind: p.property_type,
            size: p.size,
            clsid: p.clsid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CreateMode;
    use crate::CompoundFile;
    use tempfile::tempfile;

    #[test]
    fn small_stream_round_trips() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();
        let root = cf.root();
        let s = root.create_stream(&mut cf, "alpha", CreateMode::FailIfExists).unwrap();

        let pattern = vec![0x41u8; 100];
        s.write_at(&mut cf, 0, &pattern).unwrap();

        let mut out = vec![0u8; 100];
        let n = s.read_at(&mut cf, 0, &mut out).unwrap();
        assert_eq!(n, 100);
        assert_eq!(out, pattern);
        assert_eq!(s.size(&mut cf).unwrap(), 100);
    }

    #[test]
    fn big_stream_uses_the_right_chain_length() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();
        let root = cf.root();
        let s = root.create_stream(&mut cf, "big", CreateMode::FailIfExists).unwrap();

        let pattern: Vec<u8> = (0..5000u32).map(|i| (i & 0xFF) as u8).collect();
        s.write_at(&mut cf, 0, &pattern).unwrap();

        let mut out = vec![0u8; 5000];
        s.read_at(&mut cf, 0, &mut out).unwrap();
        assert_eq!(out, pattern);

        let chain_len = cf.chain_block_count(ChainOwner::Property(s.index)).unwrap();
        assert_eq!(chain_len, 10);
        let p = cf.read_property_raw(s.index).unwrap();
        assert_eq!(p.block_location, BlockLocation::Big);
    }

    #[test]
    fn cursor_advances_on_read_and_write() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();
        let root = cf.root();
        let mut s = root.create_stream(&mut cf, "x", CreateMode::FailIfExists).unwrap();

        s.write(&mut cf, &[1, 2, 3, 4]).unwrap();
        s.seek(Seek::Backward(4));
        let mut buf = [0u8; 4];
        s.read(&mut cf, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }
}

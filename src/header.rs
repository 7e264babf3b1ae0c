//! The compound file header: the first `bigBlockSize` bytes of the host file (conventionally
//! addressed as "block -1").

use crate::block::{BlockId, COUNT_BBDEPOTINHEADER, DEFAULT_SMALL_BLOCK_THRESHOLD};
use crate::error::{CfbError, CfbResult};
use crate::util::{read_u16, read_u32, write_u16, write_u32};

/// Valid compound file magic: `D0 CF 11 E0 A1 B1 1A E1`.
pub const MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Magic of the pre-release (beta) format. A header carrying this must be rejected with
/// [`CfbError::OldFormat`] rather than [`CfbError::InvalidHeader`].
pub const OLD_MAGIC: [u8; 8] = [0x0E, 0x11, 0xFC, 0x0D, 0xD0, 0xCF, 0x11, 0xE0];

const OFF_MAGIC: usize = 0x00;
const OFF_MINOR_VERSION: usize = 0x18;
const OFF_MAJOR_VERSION: usize = 0x1A;
const OFF_BYTE_ORDER: usize = 0x1C;
const OFF_BB_SIZE_BITS: usize = 0x1E;
const OFF_SB_SIZE_BITS: usize = 0x20;
const OFF_BBD_COUNT: usize = 0x2C;
const OFF_ROOT_START_BLOCK: usize = 0x30;
const OFF_MINI_CUTOFF: usize = 0x38;
const OFF_SBD_START: usize = 0x3C;
const OFF_SBD_COUNT: usize = 0x40;
const OFF_EXT_BBD_START: usize = 0x44;
const OFF_EXT_BBD_COUNT: usize = 0x48;
const OFF_BBD_START_ARRAY: usize = 0x4C;

const MINOR_VERSION: u16 = 0x003B;
const MAJOR_VERSION: u16 = 0x0003;
const BYTE_ORDER_MARK: u16 = 0xFFFE;

/// In-memory view of the file header, decoded from / encoded to its 512-byte on-disk form.
#[derive(Clone, Debug)]
pub struct FileHeader {
    pub big_block_size_bits: u16,
    pub small_block_size_bits: u16,
    pub bbd_count: u32,
    pub root_start_block: BlockId,
    pub small_block_threshold: u32,
    pub sbd_start: BlockId,
    pub sbd_count: u32,
    pub ext_bbd_start: BlockId,
    pub ext_bbd_count: u32,
    pub bbd_start: [BlockId; COUNT_BBDEPOTINHEADER],
}

impl FileHeader {
    /// Builds the header written by `CreateDocfile`: one BBD page at block 0, doubling as both
    /// the depot page and the placeholder for the root property block at block 1.
    pub fn new_for_create() -> Self {
        let mut bbd_start = [BlockId::UNUSED; COUNT_BBDEPOTINHEADER];
        bbd_start[0] = BlockId(0);

        FileHeader {
            big_block_size_bits: 9,
            small_block_size_bits: 6,
            bbd_count: 1,
            root_start_block: BlockId(1),
            small_block_threshold: DEFAULT_SMALL_BLOCK_THRESHOLD,
            sbd_start: BlockId::END_OF_CHAIN,
            sbd_count: 1,
            ext_bbd_start: BlockId::END_OF_CHAIN,
            ext_bbd_count: 0,
            bbd_start,
        }
    }

    pub fn big_block_size(&self) -> usize {
        1usize << self.big_block_size_bits
    }

    pub fn small_block_size(&self) -> usize {
        1usize << self.small_block_size_bits
    }

    /// Decodes a header from a raw block (at least 0x4C + 109*4 bytes).
    pub fn decode(buf: &[u8]) -> CfbResult<Self> {
        if buf.len() < OFF_BBD_START_ARRAY + COUNT_BBDEPOTINHEADER * 4 {
            return Err(CfbError::InvalidHeader);
        }

        if buf[OFF_MAGIC..OFF_MAGIC + 8] == OLD_MAGIC {
            return Err(CfbError::OldFormat);
        }
        if buf[OFF_MAGIC..OFF_MAGIC + 8] != MAGIC {
            return Err(CfbError::InvalidHeader);
        }

        let mut bbd_start = [BlockId::UNUSED; COUNT_BBDEPOTINHEADER];
        for (i, slot) in bbd_start.iter_mut().enumerate() {
            *slot = BlockId(read_u32(buf, OFF_BBD_START_ARRAY + i * 4));
        }

        Ok(FileHeader {
            big_block_size_bits: read_u16(buf, OFF_BB_SIZE_BITS),
            small_block_size_bits: read_u16(buf, OFF_SB_SIZE_BITS),
            bbd_count: read_u32(buf, OFF_BBD_COUNT),
            root_start_block: BlockId(read_u32(buf, OFF_ROOT_START_BLOCK)),
            small_block_threshold: read_u32(buf, OFF_MINI_CUTOFF),
            sbd_start: BlockId(read_u32(buf, OFF_SBD_START)),
            sbd_count: read_u32(buf, OFF_SBD_COUNT),
            ext_bbd_start: BlockId(read_u32(buf, OFF_EXT_BBD_START)),
            ext_bbd_count: read_u32(buf, OFF_EXT_BBD_COUNT),
            bbd_start,
        })
    }

    /// Encodes this header into `buf` (zeroed first; at least 0x4C + 109*4 bytes long).
    pub fn encode(&self, buf: &mut [u8]) {
        buf.fill(0);

        buf[OFF_MAGIC..OFF_MAGIC + 8].copy_from_slice(&MAGIC);
        write_u16(buf, OFF_MINOR_VERSION, MINOR_VERSION);
        write_u16(buf, OFF_MAJOR_VERSION, MAJOR_VERSION);
        write_u16(buf, OFF_BYTE_ORDER, BYTE_ORDER_MARK);
        write_u16(buf, OFF_BB_SIZE_BITS, self.big_block_size_bits);
        write_u16(buf, OFF_SB_SIZE_BITS, self.small_block_size_bits);
        write_u32(buf, OFF_BBD_COUNT, self.bbd_count);
        write_u32(buf, OFF_ROOT_START_BLOCK, self.root_start_block.0);
        write_u32(buf, OFF_MINI_CUTOFF, self.small_block_threshold);
        write_u32(buf, OFF_SBD_START, self.sbd_start.0);
        write_u32(buf, OFF_SBD_COUNT, self.sbd_count);
        write_u32(buf, OFF_EXT_BBD_START, self.ext_bbd_start.0);
        write_u32(buf, OFF_EXT_BBD_COUNT, self.ext_bbd_count);

        for (i, slot) in self.bbd_start.iter().enumerate() {
            write_u32(buf, OFF_BBD_START_ARRAY + i * 4, slot.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_encode_decode() {
        let header = FileHeader::new_for_create();
        let mut buf = [0u8; 512];
        header.encode(&mut buf);

        let decoded = FileHeader::decode(&buf).unwrap();
        assert_eq!(decoded.big_block_size(), 512);
        assert_eq!(decoded.small_block_size(), 64);
        assert_eq!(decoded.bbd_count, 1);
        assert_eq!(decoded.root_start_block, BlockId(1));
        assert_eq!(decoded.bbd_start[0], BlockId(0));
        assert_eq!(decoded.bbd_start[1], BlockId::UNUSED);
    }

    #[test]
    fn rejects_old_format() {
        let mut buf = [0u8; 512];
        buf[0..8].copy_from_slice(&OLD_MAGIC);
        assert!(matches!(FileHeader::decode(&buf), Err(CfbError::OldFormat)));
    }

    #[test]
    fn rejects_garbage_magic() {
        let buf = [0u8; 512];
        assert!(matches!(
            FileHeader::decode(&buf),
            Err(CfbError::InvalidHeader)
        ));
    }
}

//! Little-endian integer and GUID packing/unpacking on raw byte buffers.
//!
//! Every multi-byte field of the on-disk layout is little-endian; this module is the single
//! place that knows that, so the rest of the crate can talk in terms of byte offsets instead of
//! duplicating `from_le_bytes` calls everywhere.

use byteorder::{ByteOrder, LittleEndian};

/// A 16-byte `CLSID`/`GUID`, stored as `Data1:u32 Data2:u16 Data3:u16 Data4:[u8;8]`, all
/// multi-byte fields little-endian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    /// The all-zero GUID, used for streams and for storages that were never assigned a class.
    pub const NIL: Guid = Guid {
        data1: 0,
        data2: 0,
        data3: 0,
        data4: [0; 8],
    };
}

/// Reads a little-endian `u16` at byte offset `offset` in `buf`.
pub(crate) fn read_u16(buf: &[u8], offset: usize) -> u16 {
    LittleEndian::read_u16(&buf[offset..offset + 2])
}

/// Writes `val` as a little-endian `u16` at byte offset `offset` in `buf`.
pub(crate) fn write_u16(buf: &mut [u8], offset: usize, val: u16) {
    LittleEndian::write_u16(&mut buf[offset..offset + 2], val);
}

/// Reads a little-endian `u32` at byte offset `offset` in `buf`.
pub(crate) fn read_u32(buf: &[u8], offset: usize) -> u32 {
    LittleEndian::read_u32(&buf[offset..offset + 4])
}

/// Writes `val` as a little-endian `u32` at byte offset `offset` in `buf`.
pub(crate) fn write_u32(buf: &mut [u8], offset: usize, val: u32) {
    LittleEndian::write_u32(&mut buf[offset..offset + 4], val);
}

/// Reads a little-endian `u64` at byte offset `offset` in `buf`.
pub(crate) fn read_u64(buf: &[u8], offset: usize) -> u64 {
    LittleEndian::read_u64(&buf[offset..offset + 8])
}

/// Writes `val` as a little-endian `u64` at byte offset `offset` in `buf`.
pub(crate) fn write_u64(buf: &mut [u8], offset: usize, val: u64) {
    LittleEndian::write_u64(&mut buf[offset..offset + 8], val);
}

/// Reads a [`Guid`] at byte offset `offset` in `buf`.
pub(crate) fn read_guid(buf: &[u8], offset: usize) -> Guid {
    Guid {
        data1: read_u32(buf, offset),
        data2: read_u16(buf, offset + 4),
        data3: read_u16(buf, offset + 6),
        data4: buf[offset + 8..offset + 16].try_into().unwrap(),
    }
}

/// Writes `guid` at byte offset `offset` in `buf`.
pub(crate) fn write_guid(buf: &mut [u8], offset: usize, guid: &Guid) {
    write_u32(buf, offset, guid.data1);
    write_u16(buf, offset + 4, guid.data2);
    write_u16(buf, offset + 6, guid.data3);
    buf[offset + 8..offset + 16].copy_from_slice(&guid.data4);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_integers() {
        let mut buf = [0u8; 16];
        write_u16(&mut buf, 0, 0xBEEF);
        write_u32(&mut buf, 2, 0xDEAD_C0DE);
        write_u64(&mut buf, 8, 0x0123_4567_89AB_CDEF);

        assert_eq!(read_u16(&buf, 0), 0xBEEF);
        assert_eq!(read_u32(&buf, 2), 0xDEAD_C0DE);
        assert_eq!(read_u64(&buf, 8), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn roundtrips_guid() {
        let guid = Guid {
            data1: 0x1234_5678,
            data2: 0xABCD,
            data3: 0xEF01,
            data4: [1, 2, 3, 4, 5, 6, 7, 8],
        };

        let mut buf = [0u8; 16];
        write_guid(&mut buf, 0, &guid);
        assert_eq!(read_guid(&buf, 0), guid);
    }
}

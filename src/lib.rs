//! A compound file (structured storage) engine: a single host file holding a hierarchical tree of
//! *storages* (directories) and *streams* (byte arrays), laid out on disk compatibly with
//! Microsoft's OLE 2 Compound Document Format.
//!
//! The crate is organized bottom-up, each module depending only on the ones before it:
//!
//! 1. [`util`] — little-endian integer and GUID packing on raw byte buffers.
//! 2. [`host_file`] — the pageable, block-indexed byte store a compound file is built on.
//! 3. [`block`] — block/property index newtypes and the format's sizing constants.
//! 4. [`depot`] — the Big Block Depot: next-pointer chains and big block allocation.
//! 5. [`block_chain`] — logical byte streams over chains of big blocks.
//! 6. [`small_block_chain`] — the Small Block Depot and chains inside the mini-stream.
//! 7. [`property`] — the 128-byte directory entry record and its name ordering.
//! 8. [`storage`] — the directory tree: create/open/rename/destroy, the per-directory BST.
//! 9. [`enumerator`] — in-order traversal of a directory's children.
//! 10. [`stream`] — the public random-access handle onto a stream's bytes.
//!
//! [`CompoundFile`] owns the host file and all on-disk state; [`Storage`] and [`Stream`] are
//! lightweight handles (just a property index) threaded explicitly through it, rather than
//! holding their own borrows onto it — the single-owning-root approach `DESIGN.md` discusses.

pub mod block;
pub mod block_chain;
mod depot;
pub mod enumerator;
pub mod error;
mod header;
pub mod host_file;
pub mod property;
pub mod small_block_chain;
pub mod storage;
pub mod stream;
pub mod util;

use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::block::{BlockId, PropertyIndex, DEFAULT_BIG_BLOCK_SIZE};
use crate::header::FileHeader;
use crate::host_file::{BigBlockFile, FileBackend};
use crate::property::{BlockLocation, Property, PropertyType};
use crate::storage::Storage;
use crate::util::{write_u32, Guid};

pub use crate::enumerator::ElementInfo;
pub use crate::error::{CfbError, CfbResult};
pub use crate::storage::{CreateMode, Storage as StorageHandle};
pub use crate::stream::{Seek, Stream};
pub use crate::util::Guid as Clsid;

/// The property index the root storage is required to occupy (invariant 3.3 of the on-disk
/// layout: "Root property is at property index 0").
const ROOT_PROPERTY_INDEX: u32 = 0;

/// An open compound file: the host-file adapter, the decoded header, and every operation that
/// walks the big/small block depots or the property table.
///
/// Single-threaded and cooperative: no method here suspends or retains a lock across calls, and
/// concurrent access to the same `CompoundFile` (or to the same file opened twice) is the host's
/// responsibility to serialize, not this crate's.
pub struct CompoundFile {
    host: Box<dyn BigBlockFile>,
    header: FileHeader,
    big_block_size: usize,
    small_block_size: usize,
    small_block_threshold: u32,
}

impl CompoundFile {
    /// Initializes a brand-new, empty compound file in `file`: header, a single Big Block Depot
    /// page, and the root property ("Root Entry").
    pub fn create_in(file: File) -> CfbResult<Self> {
        let mut host = FileBackend::new(file, DEFAULT_BIG_BLOCK_SIZE);
        host.set_block_count(3)?;

        let header = FileHeader::new_for_create();

        // Block 0 is the sole BBD page: slot 0 describes itself (BLOCK_SPECIAL, a depot page is
        // not a chain member), slot 1 is the root property block, end of its own one-block chain.
        let mut bbd_page = vec![0xFFu8; DEFAULT_BIG_BLOCK_SIZE];
        write_u32(&mut bbd_page, 0, BlockId::SPECIAL.0);
        write_u32(&mut bbd_page, 4, BlockId::END_OF_CHAIN.0);
        host.write_block(0, &bbd_page)?;

        let mut header_buf = vec![0u8; DEFAULT_BIG_BLOCK_SIZE];
        header.encode(&mut header_buf);
        host.write_header(&header_buf)?;

        let mut cf = CompoundFile {
            big_block_size: header.big_block_size(),
            small_block_size: header.small_block_size(),
            small_block_threshold: header.small_block_threshold,
            host: Box::new(host),
            header,
        };

        let root = Property {
            name: crate::property::encode_name("Root Entry")?,
            property_type: PropertyType::Root,
            block_location: BlockLocation::Big,
            previous: PropertyIndex::NULL,
            next: PropertyIndex::NULL,
            dir: PropertyIndex::NULL,
            clsid: Guid::NIL,
            starting_block: BlockId::END_OF_CHAIN,
            size: 0,
        };
        cf.write_property_raw(ROOT_PROPERTY_INDEX, &root)?;

        log::info!("created new compound file, 3 big blocks, 1 BBD page");
        Ok(cf)
    }

    /// Opens an existing compound file, validating its header and locating the root property.
    pub fn open_in(mut file: File) -> CfbResult<Self> {
        use std::io::{Read, Seek as IoSeek, SeekFrom};

        let mut header_buf = vec![0u8; DEFAULT_BIG_BLOCK_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_buf)?;
        let header = FileHeader::decode(&header_buf)?;

        let big_block_size = header.big_block_size();
        let host = FileBackend::new(file, big_block_size);

        let mut cf = CompoundFile {
            big_block_size,
            small_block_size: header.small_block_size(),
            small_block_threshold: header.small_block_threshold,
            host: Box::new(host),
            header,
        };

        cf.validate_root_property()?;
        log::info!("opened compound file, {} BBD page(s)", cf.header.bbd_count);
        Ok(cf)
    }

    /// Scans the property table for the `root`-typed property and confirms it sits at index 0,
    /// per invariant 3.3. Every other module in this crate relies on that placement rather than
    /// re-discovering it on each access.
    fn validate_root_property(&mut self) -> CfbResult<()> {
        let per_block = self.big_block_size / crate::block::PROPERTY_SIZE;
        let covered =
            self.chain_block_count(crate::block_chain::ChainOwner::RootPropertyTable)? as usize
                * per_block;

        for idx in 0..covered {
            let p = self.read_property_raw(idx as u32)?;
            if p.is_free() {
                continue;
            }
            if p.property_type == PropertyType::Root {
                if idx != ROOT_PROPERTY_INDEX as usize {
                    return Err(CfbError::Corruption(format!(
                        "root property found at index {idx}, expected {ROOT_PROPERTY_INDEX}"
                    )));
                }
                return Ok(());
            }
        }

        Err(CfbError::Corruption("no root property in file".into()))
    }

    fn write_header(&mut self) -> CfbResult<()> {
        let mut buf = vec![0u8; self.big_block_size];
        self.header.encode(&mut buf);
        self.host.write_header(&buf)
    }

    /// A handle onto the root storage.
    pub fn root(&self) -> Storage {
        Storage::new(ROOT_PROPERTY_INDEX)
    }
}

/// Creates a new compound file at `path`, failing if one already exists there.
///
/// Corresponds to the format's `CreateDocfile` entry point.
pub fn create_compound_file<P: AsRef<Path>>(path: P) -> CfbResult<CompoundFile> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)?;
    CompoundFile::create_in(file)
}

/// Opens an existing compound file at `path`.
///
/// Corresponds to the format's `OpenStorage` entry point.
pub fn open_compound_file<P: AsRef<Path>>(path: P) -> CfbResult<CompoundFile> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    CompoundFile::open_in(file)
}

/// Sets a storage's class identifier.
///
/// Corresponds to the format's `WriteClassStg` entry point; equivalent to
/// `storage.set_class(cf, clsid)`.
pub fn write_class_stg(cf: &mut CompoundFile, storage: &Storage, clsid: Guid) -> CfbResult<()> {
    storage.set_class(cf, clsid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CreateMode;
    use tempfile::tempfile;

    #[test]
    fn freshly_created_file_matches_the_documented_layout() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();
        assert_eq!(cf.header.bbd_count, 1);
        assert_eq!(cf.header.bbd_start[0], BlockId(0));

        let root_prop = cf.read_property_raw(ROOT_PROPERTY_INDEX).unwrap();
        assert_eq!(root_prop.name_string(), "Root Entry");
        assert_eq!(root_prop.property_type, PropertyType::Root);
    }

    #[test]
    fn create_then_reopen_round_trips_a_stream() {
        let path = std::env::temp_dir().join(format!(
            "docfile-test-{}-roundtrip.cfb",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        {
            let mut cf = create_compound_file(&path).unwrap();
            let root = cf.root();
            let a = root.create_storage(&mut cf, "A", CreateMode::FailIfExists).unwrap();
            let x = a.create_stream(&mut cf, "x", CreateMode::FailIfExists).unwrap();
            x.write_at(&mut cf, 0, b"hello compound file").unwrap();
        }

        {
            let mut cf = open_compound_file(&path).unwrap();
            let root = cf.root();
            let a = root.open_storage(&mut cf, "A").unwrap();
            let x = a.open_stream(&mut cf, "x").unwrap();
            let mut buf = vec![0u8; b"hello compound file".len()];
            x.read_at(&mut cf, 0, &mut buf).unwrap();
            assert_eq!(&buf, b"hello compound file");
        }

        std::fs::remove_file(&path).unwrap();
    }
}

//! Directory-tree operations: property allocation, the per-storage BST, and the
//! create/open/rename/destroy family.

use crate::block::PropertyIndex;
use crate::block_chain::ChainOwner;
use crate::enumerator::{ElementInfo, PropertyEnumerator, Relation};
use crate::error::{CfbError, CfbResult};
use crate::property::{property_name_cmp, BlockLocation, Property, PropertyType};
use crate::stream::Stream;
use crate::util::Guid;
use crate::CompoundFile;

/// Governs what `create_stream`/`create_storage` do when an element of the same name already
/// exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    /// Fail with [`CfbError::FileAlreadyExists`].
    FailIfExists,
    /// Destroy the existing element first, exactly as if `destroy_element` had been called.
    OverwriteIfExists,
}

/// A handle onto one storage (directory) within a [`CompoundFile`]: either the root, or a
/// `storage`-typed property reached by name from some ancestor.
///
/// Holds nothing but the owning property's index; every operation is performed against the
/// [`CompoundFile`] passed in, following the single-owning-root model the rest of the crate uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Storage {
    pub(crate) index: u32,
}

impl Storage {
    pub(crate) fn new(index: u32) -> Self {
        Storage { index }
    }

    pub fn create_stream(
        &self,
        cf: &mut CompoundFile,
        name: &str,
        mode: CreateMode,
    ) -> CfbResult<Stream> {
        let idx = cf.create_element(self.index, name, PropertyType::Stream, mode)?;
        Ok(Stream::new(idx))
    }

    pub fn create_storage(
        &self,
        cf: &mut CompoundFile,
        name: &str,
        mode: CreateMode,
    ) -> CfbResult<Storage> {
        let idx = cf.create_element(self.index, name, PropertyType::Storage, mode)?;
        Ok(Storage::new(idx))
    }

    pub fn open_stream(&self, cf: &mut CompoundFile, name: &str) -> CfbResult<Stream> {
        let idx = cf.open_element(self.index, name, PropertyType::Stream)?;
        Ok(Stream::new(idx))
    }

    pub fn open_storage(&self, cf: &mut CompoundFile, name: &str) -> CfbResult<Storage> {
        let idx = cf.open_element(self.index, name, PropertyType::Storage)?;
        Ok(Storage::new(idx))
    }

    pub fn destroy_element(&self, cf: &mut CompoundFile, name: &str) -> CfbResult<()> {
        cf.destroy_element(self.index, name)
    }

    pub fn rename_element(&self, cf: &mut CompoundFile, old: &str, new: &str) -> CfbResult<()> {
        cf.rename_element(self.index, old, new)
    }

    pub fn set_class(&self, cf: &mut CompoundFile, clsid: Guid) -> CfbResult<()> {
        let mut p = cf.read_property_raw(self.index)?;
        p.clsid = clsid;
        cf.write_property_raw(self.index, &p)
    }

    pub fn stat(&self, cf: &mut CompoundFile) -> CfbResult<ElementInfo> {
        cf.stat(self.index)
    }

    /// Lists this storage's direct children in directory (name) order.
    pub fn enum_elements(&self, cf: &mut CompoundFile) -> CfbResult<Vec<ElementInfo>> {
        let mut out = Vec::new();
        let mut e = PropertyEnumerator::new(cf, self.index)?;
        while let Some((idx, prop)) = e.next(cf)? {
            out.push(ElementInfo {
                index: idx,
                name: prop.name_string(),
                kind: prop.property_type,
                size: prop.size,
                clsid: prop.clsid,
            });
        }
        Ok(out)
    }

    /// No-op for a direct-mode storage: every write here is already durable as soon as the host
    /// file adapter flushes it. Transacted mode (shadow-paging a whole subtree until `commit`) is
    /// out of scope; see `DESIGN.md`.
    pub fn commit(&self) -> CfbResult<()> {
        Ok(())
    }

    pub fn revert(&self) -> CfbResult<()> {
        Err(CfbError::NotImplemented("Revert"))
    }

    pub fn copy_to(&self, _cf: &mut CompoundFile, _dest: &Storage) -> CfbResult<()> {
        Err(CfbError::NotImplemented("CopyTo"))
    }

    pub fn move_element_to(
        &self,
        _cf: &mut CompoundFile,
        _name: &str,
        _dest: &Storage,
        _new_name: &str,
    ) -> CfbResult<()> {
        Err(CfbError::NotImplemented("MoveElementTo"))
    }

    pub fn set_element_times(&self, _cf: &mut CompoundFile, _name: &str) -> CfbResult<()> {
        Err(CfbError::NotImplemented("SetElementTimes"))
    }

    pub fn set_state_bits(&self, _cf: &mut CompoundFile, _bits: u32, _mask: u32) -> CfbResult<()> {
        Err(CfbError::NotImplemented("SetStateBits"))
    }
}

impl CompoundFile {
    /// Finds the first free (`nameLen == 0`) property slot, growing the property table by one
    /// big block (and zero-initializing the newly covered slots) if none is free.
    pub(crate) fn allocate_free_property(&mut self) -> CfbResult<u32> {
        let per_block = self.big_block_size / crate::block::PROPERTY_SIZE;

        loop {
            let covered = self.chain_block_count(ChainOwner::RootPropertyTable)? as usize * per_block;
            for idx in 0..covered {
                if self.read_property_raw(idx as u32)?.is_free() {
                    return Ok(idx as u32);
                }
            }

            let old_blocks = self.chain_block_count(ChainOwner::RootPropertyTable)?;
            log::debug!("growing property table to {} block(s)", old_blocks + 1);
            self.chain_set_size(
                ChainOwner::RootPropertyTable,
                (old_blocks + 1) * self.big_block_size as u64,
            )?;
            let first_new = covered as u32;
            for idx in first_new..first_new + per_block as u32 {
                self.write_property_raw(idx, &Property::free())?;
            }
            return Ok(first_new);
        }
    }

    fn find_property_in(&mut self, storage_index: u32, name: &[u16]) -> CfbResult<Option<u32>> {
        let mut e = PropertyEnumerator::new(self, storage_index)?;
        e.find_property(self, name)
    }

    fn find_parent_link(&mut self, storage_index: u32, pi: u32) -> CfbResult<(u32, Relation)> {
        let owner = self.read_property_raw(storage_index)?;
        if !owner.dir.is_null() && owner.dir.index() as u32 == pi {
            return Ok((storage_index, Relation::Dir));
        }
        let mut e = PropertyEnumerator::new(self, storage_index)?;
        e.find_parent_property(self, pi)?
            .ok_or_else(|| CfbError::Corruption(format!("property {pi} has no parent link")))
    }

    fn set_parent_link(&mut self, parent_idx: u32, relation: Relation, value: PropertyIndex) -> CfbResult<()> {
        let mut p = self.read_property_raw(parent_idx)?;
        match relation {
            Relation::Previous => p.previous = value,
            Relation::Next => p.next = value,
            Relation::Dir => p.dir = value,
        }
        self.write_property_raw(parent_idx, &p)
    }

    /// Inserts `new_index` into the directory BST rooted at `storage_index`'s `dir` field.
    fn update_property_chain(&mut self, storage_index: u32, new_index: u32) -> CfbResult<()> {
        let mut storage = self.read_property_raw(storage_index)?;
        if storage.dir.is_null() {
            storage.dir = PropertyIndex::from(new_index);
            return self.write_property_raw(storage_index, &storage);
        }

        let new_name = self.read_property_raw(new_index)?.name;
        let mut cur_idx = storage.dir.index() as u32;
        loop {
            let mut cur = self.read_property_raw(cur_idx)?;
            let branch = if property_name_cmp(&new_name, &cur.name) == std::cmp::Ordering::Less {
                &mut cur.previous
            } else {
                &mut cur.next
            };

            if branch.is_null() {
                *branch = PropertyIndex::from(new_index);
                return self.write_property_raw(cur_idx, &cur);
            }
            let next_idx = branch.index() as u32;
            cur_idx = next_idx;
        }
    }

    /// Recursively descends `store_from`'s `next` chain until a free slot, and links `to_store`
    /// there. Everything reachable from `store_from` via `next*` is, by BST invariant, strictly
    /// less than `to_store`, so this preserves ordering.
    fn find_placeholder(&mut self, store_from: u32, to_store: PropertyIndex) -> CfbResult<()> {
        let mut cur = store_from;
        loop {
            let mut p = self.read_property_raw(cur)?;
            if p.next.is_null() {
                p.next = to_store;
                return self.write_property_raw(cur, &p);
            }
            cur = p.next.index() as u32;
        }
    }

    fn adjust_property_chain(
        &mut self,
        p: &Property,
        parent_idx: u32,
        relation: Relation,
    ) -> CfbResult<()> {
        let prev = p.previous;
        let next = p.next;

        let new_link = match (prev.is_null(), next.is_null()) {
            (true, true) => PropertyIndex::NULL,
            (true, false) => next,
            (false, true) => prev,
            (false, false) => {
                self.find_placeholder(prev.index() as u32, next)?;
                prev
            }
        };

        self.set_parent_link(parent_idx, relation, new_link)
    }

    fn create_element(
        &mut self,
        storage_index: u32,
        name: &str,
        ptype: PropertyType,
        mode: CreateMode,
    ) -> CfbResult<u32> {
        let encoded = crate::property::encode_name(name)?;
        if let Some(existing) = self.find_property_in(storage_index, &encoded)? {
            match mode {
                CreateMode::OverwriteIfExists => self.destroy_property(storage_index, existing)?,
                CreateMode::FailIfExists => return Err(CfbError::FileAlreadyExists),
            }
        }

        let property = Property::new(name, ptype)?;
        let idx = self.allocate_free_property()?;
        self.write_property_raw(idx, &property)?;
        self.update_property_chain(storage_index, idx)?;
        Ok(idx)
    }

    fn open_element(&mut self, storage_index: u32, name: &str, expected: PropertyType) -> CfbResult<u32> {
        let encoded = crate::property::encode_name(name)?;
        let idx = self
            .find_property_in(storage_index, &encoded)?
            .ok_or(CfbError::FileNotFound)?;
        let prop = self.read_property_raw(idx)?;
        if prop.property_type != expected {
            // Matches the source's OpenStream/OpenStorage: a name that resolves to the wrong
            // kind of element is reported the same as no match at all.
            return Err(CfbError::FileNotFound);
        }
        Ok(idx)
    }

    fn destroy_element(&mut self, storage_index: u32, name: &str) -> CfbResult<()> {
        let encoded = crate::property::encode_name(name)?;
        let idx = self
            .find_property_in(storage_index, &encoded)?
            .ok_or(CfbError::FileNotFound)?;
        self.destroy_property(storage_index, idx)
    }

    /// Destroys property `pi`, which must be a direct child of `owner_storage_index`'s BST:
    /// frees its stream content (or recursively destroys its children, for a storage),
    /// invalidates the slot, and repairs the BST link that pointed at it.
    pub(crate) fn destroy_property(&mut self, owner_storage_index: u32, pi: u32) -> CfbResult<()> {
        let p = self.read_property_raw(pi)?;
        log::debug!("destroying element {:?} (property {pi})", p.name_string());
        let (parent_idx, relation) = self.find_parent_link(owner_storage_index, pi)?;

        match p.property_type {
            PropertyType::Storage | PropertyType::Root => loop {
                let mut e = PropertyEnumerator::new(self, pi)?;
                match e.next(self)? {
                    Some((child_idx, _)) => self.destroy_property(pi, child_idx)?,
                    None => break,
                }
            },
            PropertyType::Stream => match p.block_location {
                BlockLocation::Big => self.chain_set_size(ChainOwner::Property(pi), 0)?,
                BlockLocation::Small => self.small_chain_set_size(pi, 0)?,
            },
        }

        self.write_property_raw(pi, &Property::free())?;
        self.adjust_property_chain(&p, parent_idx, relation)
    }

    fn rename_element(&mut self, storage_index: u32, old: &str, new: &str) -> CfbResult<()> {
        log::debug!("renaming element {old:?} to {new:?}");
        let new_encoded = crate::property::encode_name(new)?;
        if self.find_property_in(storage_index, &new_encoded)?.is_some() {
            return Err(CfbError::FileAlreadyExists);
        }

        let old_encoded = crate::property::encode_name(old)?;
        let old_idx = self
            .find_property_in(storage_index, &old_encoded)?
            .ok_or(CfbError::FileNotFound)?;
        let mut old_prop = self.read_property_raw(old_idx)?;

        let renamed = Property {
            name: new_encoded,
            property_type: old_prop.property_type,
            block_location: old_prop.block_location,
            previous: PropertyIndex::NULL,
            next: PropertyIndex::NULL,
            dir: old_prop.dir,
            clsid: old_prop.clsid,
            starting_block: old_prop.starting_block,
            size: old_prop.size,
        };

        let new_idx = self.allocate_free_property()?;
        self.write_property_raw(new_idx, &renamed)?;
        self.update_property_chain(storage_index, new_idx)?;

        // Mutate the old slot in place so DestroyElement treats it as an empty storage: it must
        // not truncate the stream data or descend into children now owned by the renamed
        // property. Re-read the record rather than reusing the pre-insert copy: when the new
        // name sorts into the old node's own subtree slot, `update_property_chain` just linked
        // it onto `old_idx`'s `previous`/`next`, and writing back the stale copy (still NULL/NULL)
        // would clobber that link before `destroy_property` ever sees it.
        old_prop = self.read_property_raw(old_idx)?;
        old_prop.dir = PropertyIndex::NULL;
        old_prop.property_type = PropertyType::Storage;
        self.write_property_raw(old_idx, &old_prop)?;

        self.destroy_property(storage_index, old_idx)
    }

    fn stat(&mut self, index: u32) -> CfbResult<ElementInfo> {
        let p = self.read_property_raw(index)?;
        Ok(ElementInfo {
            index,
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
    use tempfile::tempfile;

    #[test]
    fn enumerates_children_in_name_order() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();
        let root = cf.root();
        root.create_stream(&mut cf, "c", CreateMode::FailIfExists).unwrap();
        root.create_stream(&mut cf, "a", CreateMode::FailIfExists).unwrap();
        root.create_stream(&mut cf, "b", CreateMode::FailIfExists).unwrap();

        let names: Vec<String> = root
            .enum_elements(&mut cf)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn destroy_storage_removes_its_children() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();
        let root = cf.root();
        let s = root.create_storage(&mut cf, "S", CreateMode::FailIfExists).unwrap();
        s.create_stream(&mut cf, "inner", CreateMode::FailIfExists).unwrap();

        root.destroy_element(&mut cf, "S").unwrap();
        assert!(root.enum_elements(&mut cf).unwrap().is_empty());
    }

    #[test]
    fn rename_preserves_nested_stream() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();
        let root = cf.root();
        let foo = root.create_storage(&mut cf, "foo", CreateMode::FailIfExists).unwrap();
        foo.create_stream(&mut cf, "x", CreateMode::FailIfExists).unwrap();

        root.rename_element(&mut cf, "foo", "bar").unwrap();

        let bar = root.open_storage(&mut cf, "bar").unwrap();
        assert!(bar.open_stream(&mut cf, "x").is_ok());
        assert!(matches!(
            root.open_storage(&mut cf, "foo"),
            Err(CfbError::FileNotFound)
        ));
    }

    #[test]
    fn create_existing_without_overwrite_fails() {
        let mut cf = CompoundFile::create_in(tempfile().unwrap()).unwrap();
        let root = cf.root();
        root.create_stream(&mut cf, "x", CreateMode::FailIfExists).unwrap();
        assert!(matches!(
            root.create_stream(&mut cf, "x", CreateMode::FailIfExists),
            Err(CfbError::FileAlreadyExists)
        ));
    }
}

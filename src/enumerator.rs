//! In-order traversal of a storage's directory binary search tree.
//!
//! Mirrors the classic iterative in-order walk: an explicit stack holds the path down the left
//! spine, so `next`/`skip` can be resumed across calls instead of recursing. `Vec` already grows
//! as needed, so there's no separate "initial capacity, doubles on overflow" dance to hand-roll.

use crate::block::PropertyIndex;
use crate::error::CfbResult;
use crate::property::{property_name_cmp, Property};
use crate::CompoundFile;

/// Which of a property's three links points at a given child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    Previous,
    Next,
    Dir,
}

/// Read-only projection of a [`Property`] suitable for listing ([`crate::Storage::enum_elements`]).
#[derive(Clone, Debug)]
pub struct ElementInfo {
    pub index: u32,
    pub name: String,
    pub kind: crate::property::PropertyType,
    pub size: u64,
    pub clsid: crate::util::Guid,
}

/// Walks the directory BST rooted at `storage_index`'s `dir` field.
pub struct PropertyEnumerator {
    storage_index: u32,
    stack: Vec<u32>,
}

impl PropertyEnumerator {
    pub fn new(cf: &mut CompoundFile, storage_index: u32) -> CfbResult<Self> {
        let mut e = PropertyEnumerator {
            storage_index,
            stack: Vec::with_capacity(10),
        };
        e.reset(cf)?;
        Ok(e)
    }

    pub fn reset(&mut self, cf: &mut CompoundFile) -> CfbResult<()> {
        self.stack.clear();
        let storage = cf.read_property_raw(self.storage_index)?;
        self.push_search_node(cf, storage.dir)?;
        Ok(())
    }

    /// Pushes `idx` and walks its entire `previousProperty` spine onto the stack.
    fn push_search_node(&mut self, cf: &mut CompoundFile, idx: PropertyIndex) -> CfbResult<()> {
        let mut current = idx;
        while !current.is_null() {
            self.stack.push(current.index() as u32);
            let prop = cf.read_property_raw(current.index() as u32)?;
            current = prop.previous;
        }
        Ok(())
    }

    fn pop_search_node(&mut self) -> Option<u32> {
        self.stack.pop()
    }

    /// Returns the next property in in-order sequence, or `None` when the traversal is exhausted.
    pub fn next(&mut self, cf: &mut CompoundFile) -> CfbResult<Option<(u32, Property)>> {
        let Some(idx) = self.pop_search_node() else {
            return Ok(None);
        };
        let prop = cf.read_property_raw(idx)?;
        self.push_search_node(cf, prop.next)?;
        Ok(Some((idx, prop)))
    }

    /// Advances past `count` elements; `true` iff exactly `count` were actually visited.
    pub fn skip(&mut self, cf: &mut CompoundFile, count: usize) -> CfbResult<bool> {
        for _ in 0..count {
            if self.next(cf)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn clone_at(&self) -> PropertyEnumerator {
        PropertyEnumerator {
            storage_index: self.storage_index,
            stack: self.stack.clone(),
        }
    }

    /// Finds the index of the child named `name`, comparing with [`property_name_cmp`].
    pub fn find_property(&mut self, cf: &mut CompoundFile, name: &[u16]) -> CfbResult<Option<u32>> {
        self.reset(cf)?;
        while let Some((idx, prop)) = self.next(cf)? {
            if property_name_cmp(&prop.name, name) == std::cmp::Ordering::Equal {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }

    /// Finds the node whose `previous`, `next`, or `dir` link equals `child_idx`, and which of
    /// the three it was.
    pub fn find_parent_property(
        &mut self,
        cf: &mut CompoundFile,
        child_idx: u32,
    ) -> CfbResult<Option<(u32, Relation)>> {
        self.reset(cf)?;
        while let Some((idx, prop)) = self.next(cf)? {
            if prop.previous.index() as u32 == child_idx && !prop.previous.is_null() {
                return Ok(Some((idx, Relation::Previous)));
            }
            if prop.next.index() as u32 == child_idx && !prop.next.is_null() {
                return Ok(Some((idx, Relation::Next)));
            }
            if prop.dir.index() as u32 == child_idx && !prop.dir.is_null() {
                return Ok(Some((idx, Relation::Dir)));
            }
        }
        Ok(None)
    }
}

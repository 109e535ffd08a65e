// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Persistent B+ tree index: an ordered multi-map from 32-bit keys to
//! [`RecordId`]s, with all entries in a doubly-linked leaf list.

mod bulk_load;
mod internal;
mod leaf;
mod node;

use crate::{
    block_file::{BlockFile, DEFAULT_BLOCK_SIZE, INVALID_BLOCK_ID},
    value::RecordId,
};
use internal::{InternalNode, Router};
use leaf::LeafNode;
use node::{read_leaf, read_node, Node};
use std::path::Path;

/// One index entry: a key and the record it points at
///
/// A key may map to many entries.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Entry {
    /// Index key
    pub key: i32,

    /// Address of the indexed record
    pub rid: RecordId,
}

/// Fan-out limits derived from the block size
#[derive(Copy, Clone, Debug)]
pub(crate) struct NodeLimits {
    pub max_leaf_entries: usize,
    pub max_routers: usize,
}

// Leaf: 2B tag + 4B prev + 4B next + 2B count, 10B per entry, 1B flag.
// Internal: 2B tag + 2B count + 4B height + 4B underflow, 8B per router.
const LEAF_OVERHEAD: usize = 13;
const ENTRY_SIZE: usize = 10;
const INTERNAL_OVERHEAD: usize = 12;
const ROUTER_SIZE: usize = 8;

impl NodeLimits {
    fn for_block_size(block_size: usize) -> crate::Result<Self> {
        let max_leaf_entries = block_size.saturating_sub(LEAF_OVERHEAD) / ENTRY_SIZE;
        let max_routers = block_size.saturating_sub(INTERNAL_OVERHEAD) / ROUTER_SIZE;
        if max_leaf_entries < 1 || max_routers < 3 {
            return Err(crate::Error::InvalidArgument(format!(
                "block size {block_size} is too small for index nodes",
            )));
        }
        Ok(Self {
            max_leaf_entries,
            max_routers,
        })
    }
}

/// Cursor over the leaf list
pub(crate) struct IterState {
    leaf: Option<LeafNode>,
    pos: usize,
}

/// A persistent B+ tree
///
/// The root is always an internal node at block 0; a fresh tree gets a
/// single empty leaf reachable through the root's underflow pointer.
/// Not safe for concurrent mutation.
pub struct BPlusTree {
    bf: BlockFile,
    root: InternalNode,
    limits: NodeLimits,
    closed: bool,
}

impl BPlusTree {
    /// Opens the index at `path`, initializing it when the file is
    /// empty.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        Self::open_with_block_size(path, DEFAULT_BLOCK_SIZE)
    }

    /// Opens an index with a non-default block size.
    ///
    /// Small blocks make split behavior cheap to exercise.
    pub fn open_with_block_size(path: impl AsRef<Path>, block_size: usize) -> crate::Result<Self> {
        let limits = NodeLimits::for_block_size(block_size)?;
        let mut bf = BlockFile::open(&path, block_size)?;

        let root = if bf.num_blocks() == 0 {
            let root_block_id = bf.allocate_block()?;
            let leaf_block_id = bf.allocate_block()?;
            LeafNode::empty(leaf_block_id).flush(&mut bf)?;
            let root = InternalNode {
                block_id: root_block_id,
                subtree_height: 1,
                underflow_block_id: leaf_block_id,
                routers: Vec::new(),
            };
            root.flush(&mut bf)?;
            log::debug!("initialized fresh index at {}", path.as_ref().display());
            root
        } else {
            match read_node(&bf, 0)? {
                Node::Internal(root) => root,
                Node::Leaf(_) => {
                    return Err(crate::Error::InvalidArgument(
                        "corrupt index: root block is not an internal node".to_string(),
                    ))
                }
            }
        };

        Ok(Self {
            bf,
            root,
            limits,
            closed: false,
        })
    }

    fn check_open(&self) -> crate::Result<()> {
        if self.closed {
            return Err(crate::Error::InvalidArgument("index is closed".to_string()));
        }
        Ok(())
    }

    /// Inserts an entry.
    ///
    /// Any error leaves no consistency promise; callers treat insert
    /// errors as terminal for the tree.
    pub fn insert(&mut self, entry: Entry) -> crate::Result<()> {
        self.check_open()?;
        let limits = self.limits;
        if let Some(router) = self.root.insert_entry(entry, &mut self.bf, limits)? {
            self.handle_root_split(router)?;
        }
        Ok(())
    }

    /// The root stays at block 0: its old contents move to a fresh
    /// block, which becomes the new root's underflow child.
    fn handle_root_split(&mut self, split_router: Router) -> crate::Result<()> {
        let new_block_id = self.bf.allocate_block()?;
        log::debug!("index root split; old root relocated to block {new_block_id}");

        let mut relocated = self.root.clone();
        relocated.block_id = new_block_id;
        relocated.flush(&mut self.bf)?;

        self.root = InternalNode {
            block_id: 0,
            subtree_height: relocated.subtree_height + 1,
            underflow_block_id: new_block_id,
            routers: vec![split_router],
        };
        self.root.flush(&mut self.bf)
    }

    fn descend_to_leaf(&self, key: i32) -> crate::Result<LeafNode> {
        let mut block_id = self.root.child_for_key(key);
        loop {
            match read_node(&self.bf, block_id)? {
                Node::Leaf(leaf) => return Ok(leaf),
                Node::Internal(node) => block_id = node.child_for_key(key),
            }
        }
    }

    pub(crate) fn seek_equal(&self, key: i32) -> crate::Result<IterState> {
        let mut leaf = self.descend_to_leaf(key)?;
        let mut pos = leaf.lower_bound(key);

        // A key run can continue past this leaf without a router; the
        // continuation is reached by chasing the leaf list.
        while pos == leaf.entries.len()
            && leaf.duplicate_overflow
            && leaf.next_block_id != INVALID_BLOCK_ID
        {
            leaf = read_leaf(&self.bf, leaf.next_block_id)?;
            pos = leaf.lower_bound(key);
        }

        Ok(IterState {
            leaf: Some(leaf),
            pos,
        })
    }

    pub(crate) fn seek_greater_equal(&self, key: i32) -> crate::Result<IterState> {
        let mut leaf = self.descend_to_leaf(key)?;
        let mut pos = leaf.lower_bound(key);

        while pos == leaf.entries.len() && leaf.next_block_id != INVALID_BLOCK_ID {
            leaf = read_leaf(&self.bf, leaf.next_block_id)?;
            pos = leaf.lower_bound(key);
        }

        Ok(IterState {
            leaf: Some(leaf),
            pos,
        })
    }

    /// Advances an iterator state, following the leaf list.
    #[allow(clippy::indexing_slicing)]
    pub(crate) fn next_entry(
        &self,
        state: &mut IterState,
        upper_bound: Option<i32>,
    ) -> crate::Result<Option<Entry>> {
        loop {
            let Some(leaf) = &state.leaf else {
                return Ok(None);
            };
            if state.pos < leaf.entries.len() {
                let entry = leaf.entries[state.pos];
                if upper_bound.is_some_and(|bound| entry.key > bound) {
                    state.leaf = None;
                    return Ok(None);
                }
                state.pos += 1;
                return Ok(Some(entry));
            }
            if leaf.next_block_id == INVALID_BLOCK_ID {
                state.leaf = None;
                return Ok(None);
            }
            state.leaf = Some(read_leaf(&self.bf, leaf.next_block_id)?);
            state.pos = 0;
        }
    }

    /// Returns the entries whose key equals `key`, in leaf order.
    pub fn find_equal(&self, key: i32) -> crate::Result<EntryIter<'_>> {
        self.check_open()?;
        let state = self.seek_equal(key)?;
        Ok(EntryIter {
            tree: self,
            state,
            upper_bound: Some(key),
        })
    }

    /// Returns the entries whose key is >= `key`, key-ascending.
    pub fn find_greater_equal(&self, key: i32) -> crate::Result<EntryIter<'_>> {
        self.check_open()?;
        let state = self.seek_greater_equal(key)?;
        Ok(EntryIter {
            tree: self,
            state,
            upper_bound: None,
        })
    }

    /// Flushes the root and marks the tree closed. Idempotent.
    pub fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.root.flush(&mut self.bf)?;
        self.closed = true;
        Ok(())
    }
}

/// Pull iterator over index entries
///
/// Produced by [`BPlusTree::find_equal`] and
/// [`BPlusTree::find_greater_equal`].
pub struct EntryIter<'a> {
    tree: &'a BPlusTree,
    state: IterState,
    upper_bound: Option<i32>,
}

impl EntryIter<'_> {
    /// Pulls the next entry; `None` when drained.
    pub fn next(&mut self) -> crate::Result<Option<Entry>> {
        self.tree.next_entry(&mut self.state, self.upper_bound)
    }
}

// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    internal::{InternalNode, Router},
    leaf::LeafNode,
    BPlusTree, Entry, NodeLimits,
};
use crate::block_file::{BlockFile, DEFAULT_BLOCK_SIZE, INVALID_BLOCK_ID};
use rustc_hash::FxHashMap;
use std::path::Path;

/// The rightmost path of internal nodes, keyed by block ID so entries
/// survive splits and root relocation.
type RightmostPath = FxHashMap<i32, InternalNode>;

impl BPlusTree {
    /// Builds an index at `path` from key-sorted entries in one pass.
    ///
    /// Each leaf is filled to `floor(load_factor * max_leaf_entries)`
    /// entries. The resulting tree is observationally equivalent to
    /// inserting the entries in order.
    pub fn bulk_load(
        path: impl AsRef<Path>,
        sorted_entries: &[Entry],
        load_factor: f64,
    ) -> crate::Result<Self> {
        Self::bulk_load_with_block_size(path, sorted_entries, load_factor, DEFAULT_BLOCK_SIZE)
    }

    /// Bulk load with a non-default block size.
    #[allow(clippy::indexing_slicing)]
    pub fn bulk_load_with_block_size(
        path: impl AsRef<Path>,
        sorted_entries: &[Entry],
        load_factor: f64,
        block_size: usize,
    ) -> crate::Result<Self> {
        let limits = NodeLimits::for_block_size(block_size)?;

        if sorted_entries.is_empty() {
            return Err(crate::Error::InvalidArgument(
                "no entries to bulk load".to_string(),
            ));
        }
        if load_factor <= 0.0 || load_factor > 1.0 {
            return Err(crate::Error::InvalidArgument(format!(
                "load factor must be in (0, 1]; got {load_factor}",
            )));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let entries_per_leaf =
            (load_factor * limits.max_leaf_entries as f64).floor() as usize;

        if entries_per_leaf == 0 {
            return Err(crate::Error::InvalidArgument(format!(
                "load factor {load_factor} would leave leaves empty",
            )));
        }

        let mut bf = BlockFile::open(&path, block_size)?;
        if bf.num_blocks() > 0 {
            return Err(crate::Error::InvalidArgument(format!(
                "cannot bulk load into non-empty index file at {}",
                path.as_ref().display(),
            )));
        }

        let root_block_id = bf.allocate_block()?;
        let leaf_routers = write_leaf_run(&mut bf, sorted_entries, entries_per_leaf)?;

        log::debug!(
            "bulk load wrote {} entries into {} routed leaves",
            sorted_entries.len(),
            leaf_routers.len(),
        );

        let mut cache = RightmostPath::default();
        cache.insert(
            root_block_id,
            InternalNode {
                block_id: root_block_id,
                subtree_height: 1,
                underflow_block_id: leaf_routers[0].child_block_id,
                routers: Vec::new(),
            },
        );

        for router in &leaf_routers[1..] {
            if let Some(split_router) = append_descend(&mut cache, 0, *router, &mut bf, limits)? {
                handle_root_split_in_cache(&mut cache, split_router, &mut bf)?;
            }
        }

        for node in cache.values() {
            node.flush(&mut bf)?;
        }

        let root = cache.remove(&0).ok_or_else(|| {
            crate::Error::InvalidArgument("bulk load lost the root node".to_string())
        })?;

        Ok(Self {
            bf,
            root,
            limits,
            closed: false,
        })
    }
}

/// Emits leaves sequentially, linked in creation order.
///
/// A leaf cut in the middle of a key run marks `duplicate_overflow`,
/// and the following leaf gets no router: it is reachable only through
/// the leaf list, like an online split inside a run.
fn write_leaf_run(
    bf: &mut BlockFile,
    sorted_entries: &[Entry],
    entries_per_leaf: usize,
) -> crate::Result<Vec<Router>> {
    let mut leaf_routers = Vec::with_capacity(sorted_entries.len() / entries_per_leaf + 1);
    let mut remaining = sorted_entries;
    let mut prev_duplicate_overflow = false;

    while !remaining.is_empty() {
        let block_id = bf.allocate_block()?;
        let n = entries_per_leaf.min(remaining.len());
        let (chunk, rest) = remaining.split_at(n);

        let duplicate_overflow = match (chunk.last(), rest.first()) {
            (Some(last), Some(next)) => last.key == next.key,
            _ => false,
        };

        let leaf = LeafNode {
            block_id,
            prev_block_id: if block_id == 1 {
                INVALID_BLOCK_ID
            } else {
                block_id - 1
            },
            next_block_id: if rest.is_empty() {
                INVALID_BLOCK_ID
            } else {
                block_id + 1
            },
            entries: chunk.to_vec(),
            duplicate_overflow,
        };
        leaf.flush(bf)?;

        if !prev_duplicate_overflow {
            if let Some(first) = chunk.first() {
                leaf_routers.push(Router {
                    key: first.key,
                    child_block_id: block_id,
                });
            }
        }
        prev_duplicate_overflow = duplicate_overflow;
        remaining = rest;
    }

    Ok(leaf_routers)
}

/// Walks the cached rightmost path down to the lowest internal level
/// and appends the router there; splits propagate back up the path.
fn append_descend(
    cache: &mut RightmostPath,
    block_id: i32,
    router: Router,
    bf: &mut BlockFile,
    limits: NodeLimits,
) -> crate::Result<Option<Router>> {
    let (subtree_height, rightmost_child) = {
        let node = cache.get(&block_id).ok_or_else(|| {
            crate::Error::InvalidArgument(format!(
                "bulk load cache is missing block {block_id}",
            ))
        })?;
        (node.subtree_height, node.rightmost_child())
    };

    if subtree_height == 1 {
        return append_router(cache, block_id, router, bf, limits);
    }

    match append_descend(cache, rightmost_child, router, bf, limits)? {
        None => Ok(None),
        Some(split_router) => append_router(cache, block_id, split_router, bf, limits),
    }
}

/// Appends a router to a cached node; keys only ever grow, so the new
/// router always lands at the end.
fn append_router(
    cache: &mut RightmostPath,
    block_id: i32,
    router: Router,
    bf: &mut BlockFile,
    limits: NodeLimits,
) -> crate::Result<Option<Router>> {
    let node = cache.get_mut(&block_id).ok_or_else(|| {
        crate::Error::InvalidArgument(format!("bulk load cache is missing block {block_id}"))
    })?;

    node.routers.push(router);
    if node.routers.len() <= limits.max_routers {
        return Ok(None);
    }

    let split_router = node.split(bf)?;

    // The split flushed the left node and created the right one; keep
    // the right node cached since it is now the rightmost at its
    // level.
    let right = super::node::read_node(bf, split_router.child_block_id)?;
    match right {
        super::node::Node::Internal(right) => {
            cache.insert(right.block_id, right);
            Ok(Some(split_router))
        }
        super::node::Node::Leaf(_) => Err(crate::Error::InvalidArgument(
            "bulk load split produced a leaf where an internal node was expected".to_string(),
        )),
    }
}

/// Root split during bulk load: relocate the cached root and replace
/// the cache's block-0 entry with the taller root.
fn handle_root_split_in_cache(
    cache: &mut RightmostPath,
    split_router: Router,
    bf: &mut BlockFile,
) -> crate::Result<()> {
    let old_root = cache.remove(&0).ok_or_else(|| {
        crate::Error::InvalidArgument("bulk load cache is missing the root".to_string())
    })?;

    let new_block_id = bf.allocate_block()?;
    let mut relocated = old_root;
    relocated.block_id = new_block_id;
    relocated.flush(bf)?;
    let subtree_height = relocated.subtree_height;
    cache.insert(new_block_id, relocated);

    let new_root = InternalNode {
        block_id: 0,
        subtree_height: subtree_height + 1,
        underflow_block_id: new_block_id,
        routers: vec![split_router],
    };
    new_root.flush(bf)?;
    cache.insert(0, new_root);

    log::debug!("bulk load root split; old root relocated to block {new_block_id}");
    Ok(())
}

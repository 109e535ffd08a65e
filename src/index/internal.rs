// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    node::{read_node, Node, BLOCK_TYPE_INTERNAL},
    Entry, NodeLimits,
};
use crate::{block_file::BlockFile, coding::DecodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Separator pointing at a child subtree
///
/// Router (k, c) means the subtree rooted at block c holds keys >= k
/// and below the next router's key.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Router {
    pub key: i32,
    pub child_block_id: i32,
}

/// An internal node: sorted routers plus the underflow child for keys
/// below the first router key
#[derive(Clone, Debug)]
pub(crate) struct InternalNode {
    pub block_id: i32,
    pub subtree_height: i32,
    pub underflow_block_id: i32,
    pub routers: Vec<Router>,
}

impl InternalNode {
    /// Decodes an internal body; the block type tag has already been
    /// consumed.
    pub fn decode<R: Read>(reader: &mut R, block_id: i32) -> Result<Self, DecodeError> {
        let num_routers = reader.read_u16::<LittleEndian>()?;
        let subtree_height = reader.read_i32::<LittleEndian>()?;
        let underflow_block_id = reader.read_i32::<LittleEndian>()?;

        let mut routers = Vec::with_capacity(usize::from(num_routers));
        for _ in 0..num_routers {
            routers.push(Router {
                key: reader.read_i32::<LittleEndian>()?,
                child_block_id: reader.read_i32::<LittleEndian>()?,
            });
        }

        Ok(Self {
            block_id,
            subtree_height,
            underflow_block_id,
            routers,
        })
    }

    fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u16::<LittleEndian>(BLOCK_TYPE_INTERNAL)?;

        #[allow(clippy::cast_possible_truncation)]
        writer.write_u16::<LittleEndian>(self.routers.len() as u16)?;

        writer.write_i32::<LittleEndian>(self.subtree_height)?;
        writer.write_i32::<LittleEndian>(self.underflow_block_id)?;
        for router in &self.routers {
            writer.write_i32::<LittleEndian>(router.key)?;
            writer.write_i32::<LittleEndian>(router.child_block_id)?;
        }
        Ok(())
    }

    pub fn flush(&self, bf: &mut BlockFile) -> crate::Result<()> {
        let mut buf = Vec::with_capacity(bf.block_size());
        self.encode_into(&mut buf)?;
        buf.resize(bf.block_size(), 0);
        bf.write_block(&buf, self.block_id)
    }

    /// Block of the child subtree that may contain `key`.
    #[allow(clippy::indexing_slicing)]
    pub fn child_for_key(&self, key: i32) -> i32 {
        // The child sits immediately left of the first router with a
        // strictly greater key.
        let i = self.routers.partition_point(|r| r.key <= key);
        if i == 0 {
            self.underflow_block_id
        } else {
            self.routers[i - 1].child_block_id
        }
    }

    /// Rightmost child block; used by bulk load.
    pub fn rightmost_child(&self) -> i32 {
        self.routers
            .last()
            .map_or(self.underflow_block_id, |r| r.child_block_id)
    }

    /// Recursively inserts into the correct child, installing any
    /// router the child's split produced.
    pub fn insert_entry(
        &mut self,
        entry: Entry,
        bf: &mut BlockFile,
        limits: NodeLimits,
    ) -> crate::Result<Option<Router>> {
        let child_block_id = self.child_for_key(entry.key);
        let child_router = match read_node(bf, child_block_id)? {
            Node::Leaf(mut leaf) => leaf.insert_entry(entry, bf, limits)?,
            Node::Internal(mut node) => node.insert_entry(entry, bf, limits)?,
        };
        match child_router {
            None => Ok(None),
            Some(router) => self.insert_router(router, bf, limits),
        }
    }

    /// Inserts a router, splitting on overflow.
    pub fn insert_router(
        &mut self,
        router: Router,
        bf: &mut BlockFile,
        limits: NodeLimits,
    ) -> crate::Result<Option<Router>> {
        let i = self.routers.partition_point(|r| r.key <= router.key);
        self.routers.insert(i, router);
        if self.routers.len() > limits.max_routers {
            self.split(bf).map(Some)
        } else {
            self.flush(bf)?;
            Ok(None)
        }
    }

    /// Splits at the midpoint router, which is transferred upward: its
    /// child becomes the new right node's underflow.
    pub fn split(&mut self, bf: &mut BlockFile) -> crate::Result<Router> {
        let new_block_id = bf.allocate_block()?;
        let midpoint = self.routers.len() / 2;
        let mut right_routers = self.routers.split_off(midpoint);
        let midpoint_router = right_routers.remove(0);

        let new_node = Self {
            block_id: new_block_id,
            subtree_height: self.subtree_height,
            underflow_block_id: midpoint_router.child_block_id,
            routers: right_routers,
        };

        self.flush(bf)?;
        new_node.flush(bf)?;

        log::trace!(
            "split internal node {} (height {}) into {new_block_id}",
            self.block_id,
            self.subtree_height,
        );

        Ok(Router {
            key: midpoint_router.key,
            child_block_id: new_block_id,
        })
    }
}

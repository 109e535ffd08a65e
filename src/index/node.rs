// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{internal::InternalNode, leaf::LeafNode};
use crate::{block_file::BlockFile, coding::DecodeError};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

pub(crate) const BLOCK_TYPE_LEAF: u16 = 1;
pub(crate) const BLOCK_TYPE_INTERNAL: u16 = 2;

/// A decoded B+ tree node
pub(crate) enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

/// Reads and decodes the node stored in the given block.
pub(crate) fn read_node(bf: &BlockFile, block_id: i32) -> crate::Result<Node> {
    let mut data = vec![0; bf.block_size()];
    bf.read_block(&mut data, block_id)?;

    let mut cursor = Cursor::new(&data[..]);
    let block_type = cursor
        .read_u16::<LittleEndian>()
        .map_err(|e| crate::Error::Decode(e.into()))?;

    match block_type {
        BLOCK_TYPE_LEAF => Ok(Node::Leaf(
            LeafNode::decode(&mut cursor, block_id).map_err(crate::Error::Decode)?,
        )),
        BLOCK_TYPE_INTERNAL => Ok(Node::Internal(
            InternalNode::decode(&mut cursor, block_id).map_err(crate::Error::Decode)?,
        )),
        tag => {
            #[allow(clippy::cast_possible_truncation)]
            let tag_byte = tag as u8;
            Err(crate::Error::Decode(DecodeError::InvalidTag((
                "block type",
                tag_byte,
            ))))
        }
    }
}

/// Reads the node at `block_id`, which must be a leaf.
pub(crate) fn read_leaf(bf: &BlockFile, block_id: i32) -> crate::Result<LeafNode> {
    match read_node(bf, block_id)? {
        Node::Leaf(leaf) => Ok(leaf),
        Node::Internal(_) => Err(crate::Error::InvalidArgument(format!(
            "corrupt index: block {block_id} should be a leaf",
        ))),
    }
}

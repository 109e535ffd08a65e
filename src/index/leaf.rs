// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    internal::Router,
    node::{read_leaf, BLOCK_TYPE_LEAF},
    Entry, NodeLimits,
};
use crate::{
    block_file::{BlockFile, INVALID_BLOCK_ID},
    coding::DecodeError,
    value::RecordId,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// A leaf node: sorted entries plus the doubly-linked leaf list
///
/// `duplicate_overflow` marks that the last key on this leaf continues
/// on the next leaf, which lets a key run span leaves without its
/// continuation leaves appearing in any parent.
#[derive(Clone, Debug)]
pub(crate) struct LeafNode {
    pub block_id: i32,
    pub prev_block_id: i32,
    pub next_block_id: i32,
    pub entries: Vec<Entry>,
    pub duplicate_overflow: bool,
}

impl LeafNode {
    pub fn empty(block_id: i32) -> Self {
        Self {
            block_id,
            prev_block_id: INVALID_BLOCK_ID,
            next_block_id: INVALID_BLOCK_ID,
            entries: Vec::new(),
            duplicate_overflow: false,
        }
    }

    /// Decodes a leaf body; the block type tag has already been
    /// consumed.
    pub fn decode<R: Read>(reader: &mut R, block_id: i32) -> Result<Self, DecodeError> {
        let prev_block_id = reader.read_i32::<LittleEndian>()?;
        let next_block_id = reader.read_i32::<LittleEndian>()?;
        let num_entries = reader.read_u16::<LittleEndian>()?;

        let mut entries = Vec::with_capacity(usize::from(num_entries));
        for _ in 0..num_entries {
            entries.push(Entry {
                key: reader.read_i32::<LittleEndian>()?,
                rid: RecordId {
                    page_id: reader.read_i32::<LittleEndian>()?,
                    slot_id: reader.read_u16::<LittleEndian>()?,
                },
            });
        }

        let duplicate_overflow = match reader.read_u8()? {
            0 => false,
            1 => true,
            tag => return Err(DecodeError::InvalidTag(("duplicate overflow", tag))),
        };

        Ok(Self {
            block_id,
            prev_block_id,
            next_block_id,
            entries,
            duplicate_overflow,
        })
    }

    fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u16::<LittleEndian>(BLOCK_TYPE_LEAF)?;
        writer.write_i32::<LittleEndian>(self.prev_block_id)?;
        writer.write_i32::<LittleEndian>(self.next_block_id)?;

        #[allow(clippy::cast_possible_truncation)]
        writer.write_u16::<LittleEndian>(self.entries.len() as u16)?;

        for entry in &self.entries {
            writer.write_i32::<LittleEndian>(entry.key)?;
            writer.write_i32::<LittleEndian>(entry.rid.page_id)?;
            writer.write_u16::<LittleEndian>(entry.rid.slot_id)?;
        }
        writer.write_u8(u8::from(self.duplicate_overflow))?;
        Ok(())
    }

    pub fn flush(&self, bf: &mut BlockFile) -> crate::Result<()> {
        let mut buf = Vec::with_capacity(bf.block_size());
        self.encode_into(&mut buf)?;
        buf.resize(bf.block_size(), 0);
        bf.write_block(&buf, self.block_id)
    }

    /// Smallest index whose key is >= `key`.
    pub fn lower_bound(&self, key: i32) -> usize {
        self.entries.partition_point(|e| e.key < key)
    }

    /// Smallest index whose key is > `key`.
    fn upper_bound(&self, key: i32) -> usize {
        self.entries.partition_point(|e| e.key <= key)
    }

    /// Inserts an entry, splitting on overflow.
    ///
    /// New duplicates land at the end of their key run. A run that
    /// continues on the next leaf is chased first, like on lookup;
    /// the entry belongs at the chain's tail, and a greater key
    /// belongs past the whole run. The returned router (if any)
    /// belongs to a newly created leaf and must be installed in the
    /// parent.
    pub fn insert_entry(
        &mut self,
        entry: Entry,
        bf: &mut BlockFile,
        limits: NodeLimits,
    ) -> crate::Result<Option<Router>> {
        let i = self.upper_bound(entry.key);
        if i == self.entries.len()
            && self.duplicate_overflow
            && self.next_block_id != INVALID_BLOCK_ID
        {
            let mut next = read_leaf(bf, self.next_block_id)?;
            return next.insert_entry(entry, bf, limits);
        }
        self.entries.insert(i, entry);
        if self.entries.len() > limits.max_leaf_entries {
            self.split(bf)
        } else {
            self.flush(bf)?;
            Ok(None)
        }
    }

    /// Splits at the midpoint; the right half moves to a fresh leaf.
    ///
    /// When the boundary falls inside a key run, the left leaf is
    /// marked `duplicate_overflow` and no router is returned: the
    /// parent stays unchanged and readers reach the continuation by
    /// chaining through the leaf list.
    #[allow(clippy::indexing_slicing)]
    fn split(&mut self, bf: &mut BlockFile) -> crate::Result<Option<Router>> {
        let new_block_id = bf.allocate_block()?;
        let midpoint = self.entries.len() / 2;
        let right_entries = self.entries.split_off(midpoint);
        let continues_run = self.entries[midpoint - 1].key == right_entries[0].key;
        let router_key = right_entries[0].key;

        let new_leaf = Self {
            block_id: new_block_id,
            prev_block_id: self.block_id,
            next_block_id: self.next_block_id,
            entries: right_entries,
            // The old tail key moved right, and with it any overflow
            // into the old right neighbour.
            duplicate_overflow: self.duplicate_overflow,
        };

        if self.next_block_id != INVALID_BLOCK_ID {
            let mut neighbour = read_leaf(bf, self.next_block_id)?;
            neighbour.prev_block_id = new_block_id;
            neighbour.flush(bf)?;
        }

        self.next_block_id = new_block_id;
        self.duplicate_overflow = continues_run;
        self.flush(bf)?;
        new_leaf.flush(bf)?;

        log::trace!("split leaf {} into {new_block_id}", self.block_id);

        if continues_run {
            Ok(None)
        } else {
            Ok(Some(Router {
                key: router_key,
                child_block_id: new_block_id,
            }))
        }
    }
}

// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::RecordSource;
use crate::{
    heap::HeapFile,
    index::BPlusTree,
    value::{Record, TableHeader},
};
use std::path::Path;

enum Mode {
    Equal(i32),
    GreaterEqual,
}

/// Resolves index entries against a heap file
///
/// Walks the B+ tree's leaf list from the sought key and fetches each
/// entry's record by its address. Entries whose records have since
/// been deleted are skipped.
pub struct IndexScan {
    tree: BPlusTree,
    heap: HeapFile,
    state: crate::index::IterState,
    mode: Mode,
    closed: bool,
}

impl IndexScan {
    /// Opens a scan over the records whose key equals `key`.
    pub fn open_equal(
        index_path: impl AsRef<Path>,
        heap_path: impl AsRef<Path>,
        key: i32,
    ) -> crate::Result<Self> {
        let tree = BPlusTree::open(index_path)?;
        let heap = HeapFile::open(heap_path)?;
        let state = tree.seek_equal(key)?;
        Ok(Self {
            tree,
            heap,
            state,
            mode: Mode::Equal(key),
            closed: false,
        })
    }

    /// Opens a scan over the records whose key is >= `key`,
    /// key-ascending.
    pub fn open_greater_equal(
        index_path: impl AsRef<Path>,
        heap_path: impl AsRef<Path>,
        key: i32,
    ) -> crate::Result<Self> {
        let tree = BPlusTree::open(index_path)?;
        let heap = HeapFile::open(heap_path)?;
        let state = tree.seek_greater_equal(key)?;
        Ok(Self {
            tree,
            heap,
            state,
            mode: Mode::GreaterEqual,
            closed: false,
        })
    }
}

impl RecordSource for IndexScan {
    fn header(&self) -> &TableHeader {
        self.heap.header()
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        if self.closed {
            return Err(crate::Error::InvalidArgument(
                "index scan is closed".to_string(),
            ));
        }
        let upper_bound = match self.mode {
            Mode::Equal(key) => Some(key),
            Mode::GreaterEqual => None,
        };
        loop {
            let Some(entry) = self.tree.next_entry(&mut self.state, upper_bound)? else {
                return Ok(None);
            };
            if let Some(record) = self.heap.get(entry.rid)? {
                return Ok(Some(record));
            }
        }
    }

    fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = None;
        if let Err(e) = self.tree.close() {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.heap.close() {
            first_error.get_or_insert(e);
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

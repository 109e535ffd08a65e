// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Heap files: unordered collections of records stored on slotted
//! pages, addressed by stable [`RecordId`]s.

mod page;
mod scan;

pub use scan::HeapFileScan;

use crate::{
    block_file::{BlockFile, DEFAULT_BLOCK_SIZE},
    exec::RecordSource,
    value::{Record, RecordId, TableHeader},
};
use page::HeapPage;
use std::path::Path;

fn check_page_size(page_size: usize) -> crate::Result<()> {
    if page_size > 1 << 16 {
        return Err(crate::Error::InvalidArgument(format!(
            "page size must be at most {} (slot offsets are 16-bit); got {page_size}",
            1usize << 16,
        )));
    }
    Ok(())
}

/// A page-organized file of records for one table
///
/// The last page is cached as the write cursor; pages before it are
/// read on demand. Not safe for concurrent mutation.
pub struct HeapFile {
    bf: BlockFile,
    last_page: HeapPage,
    closed: bool,
}

impl HeapFile {
    /// Creates a heap file at `path`, which must not already hold one.
    ///
    /// An initial empty page is written.
    pub fn create(path: impl AsRef<Path>, header: &TableHeader) -> crate::Result<Self> {
        Self::create_with_page_size(path, header, DEFAULT_BLOCK_SIZE)
    }

    /// Creates a heap file with a non-default page size.
    ///
    /// Small pages make page-boundary behavior cheap to exercise.
    pub fn create_with_page_size(
        path: impl AsRef<Path>,
        header: &TableHeader,
        page_size: usize,
    ) -> crate::Result<Self> {
        check_page_size(page_size)?;
        let mut bf = BlockFile::open(&path, page_size)?;
        if bf.num_blocks() > 0 {
            return Err(crate::Error::InvalidArgument(format!(
                "cannot create heap file at non-empty file {}",
                path.as_ref().display(),
            )));
        }
        log::debug!(
            "creating heap file for table {:?} at {}",
            header.name,
            path.as_ref().display(),
        );
        let last_page = HeapPage::create(&mut bf, header)?;
        Ok(Self {
            bf,
            last_page,
            closed: false,
        })
    }

    /// Opens an existing heap file.
    ///
    /// The last page becomes the write cursor and provides the table
    /// header.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        Self::open_with_page_size(path, DEFAULT_BLOCK_SIZE)
    }

    /// Opens an existing heap file with a non-default page size.
    pub fn open_with_page_size(path: impl AsRef<Path>, page_size: usize) -> crate::Result<Self> {
        check_page_size(page_size)?;
        let bf = BlockFile::open(&path, page_size)?;
        if bf.num_blocks() == 0 {
            return Err(crate::Error::InvalidArgument(format!(
                "cannot open heap file from empty file at {}",
                path.as_ref().display(),
            )));
        }
        let last_page = HeapPage::load(&bf, bf.num_blocks() - 1)?;
        Ok(Self {
            bf,
            last_page,
            closed: false,
        })
    }

    /// Creates a heap file at `path` and streams every record of
    /// `source` into it in one pass.
    pub fn bulk_load(
        path: impl AsRef<Path>,
        source: &mut dyn RecordSource,
    ) -> crate::Result<()> {
        let header = source.header().clone();
        let mut hf = Self::create(path, &header)?;
        while let Some(record) = source.next()? {
            hf.insert(&record)?;
        }
        hf.close()
    }

    /// Returns the table header.
    #[must_use]
    pub fn header(&self) -> &TableHeader {
        &self.last_page.header
    }

    fn check_open(&self) -> crate::Result<()> {
        if self.closed {
            return Err(crate::Error::InvalidArgument(
                "heap file is closed".to_string(),
            ));
        }
        Ok(())
    }

    /// Appends a record, returning its stable address.
    ///
    /// When the cursor page has no room, it is flushed and a fresh
    /// page allocated. Records must fit an empty page.
    pub fn insert(&mut self, record: &Record) -> crate::Result<RecordId> {
        self.check_open()?;
        loop {
            if self.last_page.insert(record)? {
                return Ok(RecordId {
                    page_id: self.last_page.page_id,
                    slot_id: self.last_page.num_slots() - 1,
                });
            }
            if self.last_page.num_slots() == 0 {
                return Err(crate::Error::InvalidArgument(
                    "record does not fit an empty page".to_string(),
                ));
            }
            self.flush_last_page()?;
            log::trace!("heap page {} is full, allocating another", self.last_page.page_id);
            let header = self.last_page.header.clone();
            self.last_page = HeapPage::create(&mut self.bf, &header)?;
        }
    }

    fn load_page(&self, page_id: i32) -> crate::Result<HeapPage> {
        if page_id > self.last_page.page_id {
            return Err(crate::Error::InvalidArgument(format!(
                "invalid page ID {page_id} exceeds max page ID {}",
                self.last_page.page_id,
            )));
        }
        HeapPage::load(&self.bf, page_id)
    }

    /// Reads the record at `rid`; `None` if it has been deleted.
    pub fn get(&self, rid: RecordId) -> crate::Result<Option<Record>> {
        self.check_open()?;
        if rid.page_id == self.last_page.page_id {
            return self.last_page.get(rid.slot_id);
        }
        self.load_page(rid.page_id)?.get(rid.slot_id)
    }

    /// Tombstones the record at `rid` and flushes its page eagerly.
    ///
    /// Deleting an already-deleted record is a no-op.
    pub fn delete(&mut self, rid: RecordId) -> crate::Result<()> {
        self.check_open()?;
        if rid.page_id == self.last_page.page_id {
            self.last_page.delete(rid.slot_id)?;
            return self.last_page.flush(&mut self.bf);
        }
        let mut page = self.load_page(rid.page_id)?;
        page.delete(rid.slot_id)?;
        page.flush(&mut self.bf)
    }

    fn flush_last_page(&mut self) -> crate::Result<()> {
        self.last_page.flush(&mut self.bf)
    }

    /// Flushes the cursor page and marks the file closed. Idempotent.
    pub fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush_last_page()?;
        self.closed = true;
        Ok(())
    }
}

// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{sort_in_memory::sort_records, BoxedSource, Merge, RecordSource};
use crate::{
    stream::{self, StreamScan},
    value::{Record, TableHeader},
};
use tempfile::TempDir;

/// Default number of records sorted in memory per run
pub const DEFAULT_SORT_BATCH_SIZE: usize = 100_000;

/// External merge sort
///
/// Batches of the input are sorted in memory and written as stream
/// files ("sorted runs") into a private temp directory; the output is
/// a k-way merge over the runs. Close deletes the directory.
pub struct SortOnDisk {
    merge: Merge,
    child: BoxedSource,
    run_dir: Option<TempDir>,
    closed: bool,
}

impl SortOnDisk {
    /// Creates an external sort with the default batch size.
    pub fn new(child: BoxedSource, sort_field: &str, descending: bool) -> crate::Result<Self> {
        Self::with_batch_size(child, sort_field, descending, DEFAULT_SORT_BATCH_SIZE)
    }

    /// Creates an external sort with a custom in-memory batch size.
    ///
    /// Run generation happens eagerly on the caller thread: the child
    /// is fully drained before this returns.
    pub fn with_batch_size(
        mut child: BoxedSource,
        sort_field: &str,
        descending: bool,
        batch_size: usize,
    ) -> crate::Result<Self> {
        if batch_size == 0 {
            return Err(crate::Error::InvalidArgument(
                "sort batch size must be positive".to_string(),
            ));
        }

        let header = child.header().clone();
        let (sort_position, _) = header.position_and_type(sort_field)?;

        let run_dir = tempfile::tempdir()?;
        let mut run_paths = vec![];

        for run_id in 0.. {
            let mut batch = Vec::new();
            while batch.len() < batch_size {
                match child.next()? {
                    Some(record) => batch.push(record),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            let exhausted = batch.len() < batch_size;

            sort_records(&mut batch, sort_position, descending);

            let run_path = run_dir.path().join(format!("sorted-run-{run_id}"));
            stream::write_all(&run_path, &header, &batch)?;
            log::debug!("wrote sorted run {run_id} ({} records)", batch.len());
            run_paths.push(run_path);

            if exhausted {
                break;
            }
        }

        let mut run_scans: Vec<BoxedSource> = Vec::with_capacity(run_paths.len());
        for run_path in &run_paths {
            run_scans.push(Box::new(StreamScan::open(run_path)?));
        }
        let merge = Merge::new(run_scans, header, sort_field, descending)?;

        Ok(Self {
            merge,
            child,
            run_dir: Some(run_dir),
            closed: false,
        })
    }
}

impl RecordSource for SortOnDisk {
    fn header(&self) -> &TableHeader {
        self.merge.header()
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        self.merge.next()
    }

    fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = None;
        if let Err(e) = self.merge.close() {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.child.close() {
            first_error.get_or_insert(e);
        }
        if let Some(run_dir) = self.run_dir.take() {
            if let Err(e) = run_dir.close() {
                first_error.get_or_insert(crate::Error::Io(e));
            }
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{
        sort_in_memory::{column, SortInMemory},
        test_utils::{drain, movies, movies_header},
        InMemoryScan,
    };
    use super::*;
    use test_log::test;

    #[test]
    fn matches_in_memory_sort_with_tiny_batches() -> crate::Result<()> {
        // Batch size smaller than the input forces multiple runs.
        for field in ["title", "rating", "views"] {
            for descending in [false, true] {
                let scan = InMemoryScan::new(movies_header(), movies());
                let mut disk_sort =
                    SortOnDisk::with_batch_size(Box::new(scan), field, descending, 2)?;
                let from_disk = drain(&mut disk_sort)?;
                disk_sort.close()?;

                let scan = InMemoryScan::new(movies_header(), movies());
                let mut mem_sort = SortInMemory::new(Box::new(scan), field, descending)?;
                let from_memory = drain(&mut mem_sort)?;
                mem_sort.close()?;

                let (position, _) = movies_header().position_and_type(field)?;
                assert_eq!(
                    column(&from_memory, position),
                    column(&from_disk, position),
                );
                assert_eq!(from_memory.len(), from_disk.len());
            }
        }
        Ok(())
    }

    #[test]
    fn empty_input_produces_empty_output() -> crate::Result<()> {
        let scan = InMemoryScan::new(movies_header(), vec![]);
        let mut sort = SortOnDisk::with_batch_size(Box::new(scan), "views", false, 10)?;
        assert!(drain(&mut sort)?.is_empty());
        sort.close()?;
        Ok(())
    }
}

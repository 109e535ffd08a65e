// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{BoxedSource, RecordSource};
use crate::value::{Record, TableHeader, Value};
use interval_heap::IntervalHeap as Heap;

/// One buffered record from one input, ordered by its sort key
struct HeapItem {
    source_idx: usize,
    record: Record,
    key: Value,
    descending: bool,
}

impl Eq for HeapItem {}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let ordering = self.key.sort_cmp(&other.key);
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// K-way merge of sorted inputs into one sorted stream
///
/// Keyed on the sort field via a heap; the merge is not stable across
/// inputs. Inputs whose first pull is already end-of-stream take no
/// part in the merge and are only closed.
pub struct Merge {
    header: TableHeader,
    sources: Vec<BoxedSource>,
    heap: Heap<HeapItem>,
    sort_position: usize,
    descending: bool,
}

impl Merge {
    /// Creates a merge over sorted `sources`.
    ///
    /// One record is pulled from every input up front to seed the
    /// heap.
    pub fn new(
        mut sources: Vec<BoxedSource>,
        header: TableHeader,
        sort_field: &str,
        descending: bool,
    ) -> crate::Result<Self> {
        let (sort_position, _) = header.position_and_type(sort_field)?;

        let mut heap = Heap::with_capacity(sources.len());
        for (source_idx, source) in sources.iter_mut().enumerate() {
            if let Some(record) = source.next()? {
                heap.push(make_item(source_idx, record, sort_position, descending)?);
            }
        }

        Ok(Self {
            header,
            sources,
            heap,
            sort_position,
            descending,
        })
    }
}

fn make_item(
    source_idx: usize,
    record: Record,
    sort_position: usize,
    descending: bool,
) -> crate::Result<HeapItem> {
    let key = record
        .get(sort_position)
        .ok_or_else(|| {
            crate::Error::SchemaMismatch(format!(
                "record is narrower than sort position {sort_position}",
            ))
        })?
        .clone();
    Ok(HeapItem {
        source_idx,
        record,
        key,
        descending,
    })
}

impl RecordSource for Merge {
    fn header(&self) -> &TableHeader {
        &self.header
    }

    #[allow(clippy::indexing_slicing)]
    fn next(&mut self) -> crate::Result<Option<Record>> {
        let Some(item) = self.heap.pop_min() else {
            return Ok(None);
        };
        if let Some(record) = self.sources[item.source_idx].next()? {
            self.heap.push(make_item(
                item.source_idx,
                record,
                self.sort_position,
                self.descending,
            )?);
        }
        Ok(Some(item.record))
    }

    fn close(&mut self) -> crate::Result<()> {
        let mut first_error = None;
        for source in &mut self.sources {
            if let Err(e) = source.close() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

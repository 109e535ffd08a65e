// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{read_all, BoxedSource, RecordSource};
use crate::value::{Record, TableHeader};
use std::cmp::Ordering;

/// Compares two records on one field position.
pub(crate) fn compare_by_field(
    a: &Record,
    b: &Record,
    sort_position: usize,
    descending: bool,
) -> Ordering {
    let left = a.get(sort_position);
    let right = b.get(sort_position);
    let ordering = match (left, right) {
        (Some(left), Some(right)) => left.sort_cmp(right),
        // Missing positions order first; they cannot occur for records
        // matching the header.
        _ => left.is_some().cmp(&right.is_some()),
    };
    if descending {
        ordering.reverse()
    } else {
        ordering
    }
}

pub(crate) fn sort_records(records: &mut [Record], sort_position: usize, descending: bool) {
    records.sort_by(|a, b| compare_by_field(a, b, sort_position, descending));
}

/// Reads the whole input, sorts it by one field, then replays it
pub struct SortInMemory {
    child: BoxedSource,
    sorted: Vec<Record>,
    pos: usize,
}

impl SortInMemory {
    /// Creates a sort over `child`; the input is drained eagerly.
    pub fn new(
        mut child: BoxedSource,
        sort_field: &str,
        descending: bool,
    ) -> crate::Result<Self> {
        let (sort_position, _) = child.header().position_and_type(sort_field)?;
        let mut sorted = read_all(child.as_mut())?;
        sort_records(&mut sorted, sort_position, descending);
        Ok(Self {
            child,
            sorted,
            pos: 0,
        })
    }
}

impl RecordSource for SortInMemory {
    fn header(&self) -> &TableHeader {
        self.child.header()
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        match self.sorted.get(self.pos) {
            Some(record) => {
                self.pos += 1;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> crate::Result<()> {
        self.sorted = Vec::new();
        self.child.close()
    }
}

/// Extracts the sort column for assertions.
#[cfg(test)]
pub(crate) fn column(records: &[Record], position: usize) -> Vec<crate::value::Value> {
    records
        .iter()
        .filter_map(|r| r.get(position).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::{
        test_utils::{drain, movies, movies_header},
        InMemoryScan,
    };
    use super::*;
    use test_log::test;

    #[test]
    fn sort_in_memory_each_field_both_orders() -> crate::Result<()> {
        for (field, position) in [("title", 0), ("rating", 1), ("views", 2)] {
            for descending in [false, true] {
                let scan = InMemoryScan::new(movies_header(), movies());
                let mut sort = SortInMemory::new(Box::new(scan), field, descending)?;
                let result = drain(&mut sort)?;
                sort.close()?;

                let mut expected = movies();
                sort_records(&mut expected, position, descending);
                assert_eq!(column(&expected, position), column(&result, position));
                assert_eq!(movies().len(), result.len());
            }
        }
        Ok(())
    }
}

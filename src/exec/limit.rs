// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{BoxedSource, RecordSource};
use crate::value::{Record, TableHeader};

/// Caps the number of records read from the child
pub struct Limit {
    child: BoxedSource,
    max_records: usize,
    records_read: usize,
}

impl Limit {
    /// Creates a limit of `max_records` over `child`.
    #[must_use]
    pub fn new(child: BoxedSource, max_records: usize) -> Self {
        Self {
            child,
            max_records,
            records_read: 0,
        }
    }
}

impl RecordSource for Limit {
    fn header(&self) -> &TableHeader {
        self.child.header()
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        if self.records_read == self.max_records {
            return Ok(None);
        }
        match self.child.next()? {
            None => Ok(None),
            Some(record) => {
                self.records_read += 1;
                Ok(Some(record))
            }
        }
    }

    fn close(&mut self) -> crate::Result<()> {
        self.child.close()
    }
}

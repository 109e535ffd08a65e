// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::RecordSource;
use crate::value::{Record, TableHeader};

/// Serves a preloaded list of records
pub struct InMemoryScan {
    header: TableHeader,
    records: Vec<Record>,
    pos: usize,
}

impl InMemoryScan {
    /// Creates a scan over `records`.
    #[must_use]
    pub fn new(header: TableHeader, records: Vec<Record>) -> Self {
        Self {
            header,
            records,
            pos: 0,
        }
    }
}

impl RecordSource for InMemoryScan {
    fn header(&self) -> &TableHeader {
        &self.header
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        match self.records.get(self.pos) {
            Some(record) => {
                self.pos += 1;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> crate::Result<()> {
        self.records = Vec::new();
        self.pos = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{drain, movies, movies_header};
    use super::*;
    use test_log::test;

    #[test]
    fn in_memory_scan_yields_all() -> crate::Result<()> {
        let mut scan = InMemoryScan::new(movies_header(), movies());
        assert_eq!(movies_header(), *scan.header());
        assert_eq!(movies(), drain(&mut scan)?);
        scan.close()?;
        Ok(())
    }
}

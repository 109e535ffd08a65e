// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::Decode,
    exec::RecordSource,
    value::{Record, TableHeader},
};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

/// Sequential reader of a stream file
///
/// Pull-driven on the caller thread. A clean end of file at a record
/// boundary is end-of-stream; there is no truncation check.
pub struct StreamScan {
    reader: BufReader<File>,
    header: TableHeader,
    closed: bool,
}

impl StreamScan {
    /// Opens the stream file at `path` and reads its header.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let header = TableHeader::decode_from(&mut reader).map_err(crate::Error::Decode)?;
        Ok(Self {
            reader,
            header,
            closed: false,
        })
    }
}

impl RecordSource for StreamScan {
    fn header(&self) -> &TableHeader {
        &self.header
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        if self.closed {
            return Err(crate::Error::InvalidArgument(
                "stream scan is closed".to_string(),
            ));
        }
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }
        let record = self
            .header
            .read_record(&mut self.reader)
            .map_err(crate::Error::Decode)?;
        Ok(Some(record))
    }

    fn close(&mut self) -> crate::Result<()> {
        self.closed = true;
        Ok(())
    }
}

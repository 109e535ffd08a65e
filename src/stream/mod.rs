// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Stream files: self-describing, append-only record files used as
//! ephemeral scratch for sort runs and join partitions.
//!
//! Layout: a serialized [`TableHeader`] followed by concatenated
//! records. There is no index; streams are read strictly sequentially.

mod scan;

pub use scan::StreamScan;

use crate::{
    coding::Encode,
    value::{Record, TableHeader},
};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Buffered writer for a stream file
pub struct StreamWriter {
    writer: BufWriter<File>,
    header: TableHeader,
    closed: bool,
}

impl StreamWriter {
    /// Creates a stream file at `path` and writes its header.
    pub fn create(path: impl AsRef<Path>, header: &TableHeader) -> crate::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        header
            .encode_into(&mut writer)
            .map_err(crate::Error::Encode)?;
        Ok(Self {
            writer,
            header: header.clone(),
            closed: false,
        })
    }

    /// Appends one record.
    pub fn write_record(&mut self, record: &Record) -> crate::Result<()> {
        self.header.write_record(&mut self.writer, record)
    }

    /// Flushes buffered bytes and marks the writer closed. Idempotent.
    pub fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.writer.flush()?;
        self.closed = true;
        Ok(())
    }
}

/// Writes all records to a fresh stream file at `path`.
pub fn write_all(
    path: impl AsRef<Path>,
    header: &TableHeader,
    records: &[Record],
) -> crate::Result<()> {
    let mut writer = StreamWriter::create(path, header)?;
    for record in records {
        writer.write_record(record)?;
    }
    writer.close()
}

/// Fan-out writer: one stream file per partition path
///
/// Used by the hybrid hash join to spill records to their on-disk
/// partitions.
pub struct PartitionedWriter {
    writers: Vec<StreamWriter>,
    closed: bool,
}

impl PartitionedWriter {
    /// Creates one stream file per path, all with the same header.
    pub fn create(paths: &[PathBuf], header: &TableHeader) -> crate::Result<Self> {
        let mut writers = Vec::with_capacity(paths.len());
        for path in paths {
            writers.push(StreamWriter::create(path, header)?);
        }
        Ok(Self {
            writers,
            closed: false,
        })
    }

    /// Appends a record to the given partition.
    pub fn write_to_partition(&mut self, record: &Record, partition: usize) -> crate::Result<()> {
        let writer = self.writers.get_mut(partition).ok_or_else(|| {
            crate::Error::InvalidArgument(format!("invalid partition {partition}"))
        })?;
        writer.write_record(record)
    }

    /// Closes every partition writer; the first error is returned but
    /// all writers are attempted. Idempotent.
    pub fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut first_error = None;
        for writer in &mut self.writers {
            if let Err(e) = writer.close() {
                first_error.get_or_insert(e);
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
    use super::*;
    use crate::{
        exec::RecordSource,
        value::{Field, Type, Value},
    };
    use test_log::test;

    fn movies_header() -> TableHeader {
        TableHeader::new(
            "movies",
            vec![
                Field::new("title", Type::Str),
                Field::new("rating", Type::Float64),
                Field::new("views", Type::Int32),
            ],
        )
    }

    fn movies() -> Vec<Record> {
        vec![
            vec![
                Value::Str("Leon: The Professional".into()),
                Value::Float64(4.6),
                Value::Int32(2),
            ],
            vec![
                Value::Str("Gattaca".into()),
                Value::Float64(4.5),
                Value::Int32(2),
            ],
            vec![
                Value::Str("Hackers".into()),
                Value::Float64(3.7),
                Value::Int32(3),
            ],
            vec![
                Value::Str("Inside Out".into()),
                Value::Float64(4.7),
                Value::Int32(3),
            ],
        ]
    }

    #[test]
    fn stream_roundtrip() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("movies.stream");

        write_all(&path, &movies_header(), &movies())?;

        let mut scan = StreamScan::open(&path)?;
        assert_eq!(movies_header(), *scan.header());

        let mut read_back = vec![];
        while let Some(record) = scan.next()? {
            read_back.push(record);
        }
        assert_eq!(movies(), read_back);

        // Reading past the end stays at end-of-stream.
        assert_eq!(None, scan.next()?);
        assert_eq!(None, scan.next()?);

        scan.close()?;
        Ok(())
    }

    #[test]
    fn empty_stream_yields_nothing() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.stream");

        write_all(&path, &movies_header(), &[])?;

        let mut scan = StreamScan::open(&path)?;
        assert_eq!(None, scan.next()?);
        scan.close()?;
        Ok(())
    }

    #[test]
    fn partitioned_writer_routes_records() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let paths: Vec<_> = (0..3).map(|i| dir.path().join(format!("p-{i}"))).collect();

        let mut writer = PartitionedWriter::create(&paths, &movies_header())?;
        for (i, record) in movies().iter().enumerate() {
            writer.write_to_partition(record, i % 3)?;
        }
        assert!(matches!(
            writer.write_to_partition(&movies()[0], 3),
            Err(crate::Error::InvalidArgument(_)),
        ));
        writer.close()?;

        let mut total = 0;
        for path in &paths {
            let mut scan = StreamScan::open(path)?;
            while scan.next()?.is_some() {
                total += 1;
            }
            scan.close()?;
        }
        assert_eq!(movies().len(), total);

        Ok(())
    }
}

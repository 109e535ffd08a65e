// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::RecordSource;
use crate::value::{Record, TableHeader, Type, Value};
use std::{fs::File, path::Path};

/// Parses a CSV file into records matching a declared header
///
/// The CSV's required header row must match the declared field names
/// positionwise; values are parsed per the declared types.
pub struct CsvScan {
    reader: csv::Reader<File>,
    header: TableHeader,
    row: csv::StringRecord,
    closed: bool,
}

impl CsvScan {
    /// Opens the CSV at `path` and validates its header row.
    pub fn open(path: impl AsRef<Path>, header: TableHeader) -> crate::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;

        let csv_header = reader.headers()?;
        if csv_header.len() != header.fields.len()
            || csv_header
                .iter()
                .zip(&header.fields)
                .any(|(name, field)| name != field.name)
        {
            return Err(crate::Error::SchemaMismatch(format!(
                "csv header {:?} does not match table header {:?}",
                csv_header.iter().collect::<Vec<_>>(),
                header,
            )));
        }

        Ok(Self {
            reader,
            header,
            row: csv::StringRecord::new(),
            closed: false,
        })
    }
}

fn parse_value(value_type: Type, s: &str) -> crate::Result<Value> {
    match value_type {
        Type::Int32 => s
            .parse::<i32>()
            .map(Value::Int32)
            .map_err(|_| crate::Error::InvalidArgument(format!("cannot parse {s:?} as Int32"))),
        Type::Float64 => s
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|_| crate::Error::InvalidArgument(format!("cannot parse {s:?} as Float64"))),
        Type::Str => Ok(Value::Str(s.to_string())),
    }
}

impl RecordSource for CsvScan {
    fn header(&self) -> &TableHeader {
        &self.header
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        if self.closed {
            return Err(crate::Error::InvalidArgument(
                "csv scan is closed".to_string(),
            ));
        }
        if !self.reader.read_record(&mut self.row)? {
            return Ok(None);
        }
        if self.row.len() != self.header.fields.len() {
            return Err(crate::Error::SchemaMismatch(format!(
                "csv row has {} columns, table {:?} has {} fields",
                self.row.len(),
                self.header.name,
                self.header.fields.len(),
            )));
        }
        self.row
            .iter()
            .zip(&self.header.fields)
            .map(|(column, field)| parse_value(field.value_type, column))
            .collect::<crate::Result<Record>>()
            .map(Some)
    }

    fn close(&mut self) -> crate::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::{drain, movies, movies_header};
    use super::*;
    use test_log::test;

    const CSV: &str = "\
title,rating,views
Leon: The Professional,4.6,2
Gattaca,4.5,2
Hackers,3.7,3
Inside Out,4.7,3
";

    #[test]
    fn csv_scan_parses_per_declared_type() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("movies.csv");
        std::fs::write(&path, CSV)?;

        let mut scan = CsvScan::open(&path, movies_header())?;
        assert_eq!(movies(), drain(&mut scan)?);
        scan.close()?;
        Ok(())
    }

    #[test]
    fn csv_scan_rejects_header_mismatch() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("movies.csv");
        std::fs::write(&path, "title,views,rating\n")?;

        assert!(matches!(
            CsvScan::open(&path, movies_header()),
            Err(crate::Error::SchemaMismatch(_)),
        ));
        Ok(())
    }

    #[test]
    fn csv_scan_fails_on_unparseable_value() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("movies.csv");
        std::fs::write(&path, "title,rating,views\nGattaca,not-a-number,2\n")?;

        let mut scan = CsvScan::open(&path, movies_header())?;
        assert!(scan.next().is_err());
        scan.close()?;
        Ok(())
    }
}

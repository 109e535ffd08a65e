// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{BoxedSource, RecordSource};
use crate::value::{Record, TableHeader};

/// Reorders and subsets columns by name
pub struct Projection {
    child: BoxedSource,
    header: TableHeader,
    positions: Vec<usize>,
}

impl Projection {
    /// Creates a projection of `child` onto the named fields.
    pub fn new(child: BoxedSource, field_names: &[&str]) -> crate::Result<Self> {
        let child_header = child.header();
        let mut positions = Vec::with_capacity(field_names.len());
        let mut fields = Vec::with_capacity(field_names.len());
        for name in field_names {
            let (position, value_type) = child_header.position_and_type(name)?;
            positions.push(position);
            fields.push(crate::value::Field::new((*name).to_string(), value_type));
        }
        let header = TableHeader::new(
            format!(
                "projection({}, [{}])",
                child_header.name,
                field_names.join(","),
            ),
            fields,
        );
        Ok(Self {
            child,
            header,
            positions,
        })
    }
}

impl RecordSource for Projection {
    fn header(&self) -> &TableHeader {
        &self.header
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        let Some(record) = self.child.next()? else {
            return Ok(None);
        };
        let mut projected = Vec::with_capacity(self.positions.len());
        for &position in &self.positions {
            let value = record.get(position).ok_or_else(|| {
                crate::Error::SchemaMismatch(format!(
                    "record is narrower than position {position}",
                ))
            })?;
            projected.push(value.clone());
        }
        Ok(Some(projected))
    }

    fn close(&mut self) -> crate::Result<()> {
        self.child.close()
    }
}

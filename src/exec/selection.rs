// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{BoxedSource, RecordSource};
use crate::value::{Record, TableHeader, Value};
use std::cmp::Ordering;

/// Row filter applied by [`Selection`]
pub type Predicate = Box<dyn Fn(&Record) -> bool + Send>;

/// Restricts records to those satisfying a predicate
pub struct Selection {
    child: BoxedSource,
    predicate: Predicate,
}

impl Selection {
    /// Creates a selection over `child`.
    #[must_use]
    pub fn new(child: BoxedSource, predicate: Predicate) -> Self {
        Self { child, predicate }
    }
}

impl RecordSource for Selection {
    fn header(&self) -> &TableHeader {
        self.child.header()
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        loop {
            match self.child.next()? {
                None => return Ok(None),
                Some(record) if (self.predicate)(&record) => return Ok(Some(record)),
                Some(_) => {}
            }
        }
    }

    fn close(&mut self) -> crate::Result<()> {
        self.child.close()
    }
}

/// Predicate matching records whose field equals `value`.
pub fn field_equals(
    header: &TableHeader,
    field_name: &str,
    value: Value,
) -> crate::Result<Predicate> {
    let (position, _) = header.position_and_type(field_name)?;
    Ok(Box::new(move |record: &Record| {
        record.get(position) == Some(&value)
    }))
}

/// Predicate matching records whose field is strictly less than
/// `value`.
///
/// The comparison value must have the field's declared type.
pub fn field_less(
    header: &TableHeader,
    field_name: &str,
    value: Value,
) -> crate::Result<Predicate> {
    let (position, value_type) = header.position_and_type(field_name)?;
    if value.value_type() != value_type {
        return Err(crate::Error::InvalidArgument(format!(
            "field {field_name:?} has type {value_type:?}; got {:?}",
            value.value_type(),
        )));
    }
    Ok(Box::new(move |record: &Record| {
        record.get(position).is_some_and(|v| {
            matches!(v.cmp_same_type(&value), Ok(Ordering::Less))
        })
    }))
}

// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Pull-based operator pipeline.
//!
//! Operator trees are built bottom-up; the caller repeatedly pulls
//! records from the root. Operators own their children and close them
//! on close.

mod average;
mod csv_scan;
mod distinct;
mod hash_join_classic;
mod hash_join_hybrid;
mod in_memory_scan;
mod index_scan;
mod limit;
mod merge;
mod projection;
mod selection;
mod sort_in_memory;
mod sort_on_disk;

pub use {
    average::Average,
    csv_scan::CsvScan,
    distinct::Distinct,
    hash_join_classic::HashJoinClassic,
    hash_join_hybrid::{HashJoinHybrid, MAX_PARTITIONS},
    in_memory_scan::InMemoryScan,
    index_scan::IndexScan,
    limit::Limit,
    merge::Merge,
    projection::Projection,
    selection::{field_equals, field_less, Predicate, Selection},
    sort_in_memory::SortInMemory,
    sort_on_disk::{SortOnDisk, DEFAULT_SORT_BATCH_SIZE},
};

use crate::value::{Field, Record, TableHeader, Value};

/// A pull-based source of records
///
/// `next` returns `Ok(None)` when the source is drained; errors are
/// terminal and the source is then abandoned. `close` is idempotent
/// and releases children; the first error wins but every child is
/// closed. Returned records must not be mutated by callers.
pub trait RecordSource: Send {
    /// Returns the header describing the produced records.
    fn header(&self) -> &TableHeader;

    /// Pulls the next record.
    fn next(&mut self) -> crate::Result<Option<Record>>;

    /// Releases the source and everything it owns.
    fn close(&mut self) -> crate::Result<()>;
}

/// An owned, dynamically typed record source
pub type BoxedSource = Box<dyn RecordSource>;

/// Drains a source into memory.
pub(crate) fn read_all(source: &mut dyn RecordSource) -> crate::Result<Vec<Record>> {
    let mut records = vec![];
    while let Some(record) = source.next()? {
        records.push(record);
    }
    Ok(records)
}

/// Concatenates a build-side and probe-side record.
pub(crate) fn joined_record(r: &Record, s: &Record) -> Record {
    let mut result = Vec::with_capacity(r.len() + s.len());
    result.extend_from_slice(r);
    result.extend_from_slice(s);
    result
}

/// Prepends the table name and "." to each field name for
/// disambiguation, e.g. "id" in table "user" becomes "user.id".
fn qualified_fields(t: &TableHeader) -> Vec<Field> {
    t.fields
        .iter()
        .map(|f| Field::new(format!("{}.{}", t.name, f.name), f.value_type))
        .collect()
}

/// Header of an equi-join result: r's fields then s's fields, each
/// qualified with its table name.
pub(crate) fn joined_header(
    r: &TableHeader,
    s: &TableHeader,
    r_join_field: &str,
    s_join_field: &str,
) -> crate::Result<TableHeader> {
    r.position_and_type(r_join_field)?;
    s.position_and_type(s_join_field)?;

    let name = format!("({}.{} = {}.{})", r.name, r_join_field, s.name, s_join_field);
    let mut fields = qualified_fields(r);
    fields.extend(qualified_fields(s));
    Ok(TableHeader::new(name, fields))
}

/// Hashable join key with the equality the joins need
///
/// Matches value equality for the supported types: float zeroes
/// collapse into one key, and NaN (which equals nothing) produces no
/// key at all, so NaN rows never join.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) enum JoinKey {
    Int32(i32),
    Float64(u64),
    Str(String),
}

impl JoinKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int32(x) => Some(Self::Int32(*x)),
            Value::Float64(x) if x.is_nan() => None,
            Value::Float64(x) => {
                let normalized = if *x == 0.0 { 0.0f64 } else { *x };
                Some(Self::Float64(normalized.to_bits()))
            }
            Value::Str(s) => Some(Self::Str(s.clone())),
        }
    }
}

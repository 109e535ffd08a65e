// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{BoxedSource, RecordSource};
use crate::value::{Field, Record, TableHeader, Type, Value};

/// Per-group average over grouped input
///
/// The input must already be grouped by the group field. For each
/// group one record `(group value, average)` is emitted; integers and
/// strings coerce to floats, failing loudly when a string does not
/// parse.
pub struct Average {
    child: BoxedSource,
    header: TableHeader,
    average_position: usize,
    group_position: usize,
    pending: Option<Record>,
}

impl Average {
    /// Creates an average of `average_field` grouped by `group_field`.
    ///
    /// The first record is pulled eagerly so the first group is ready.
    pub fn new(
        mut child: BoxedSource,
        average_field: &str,
        group_field: &str,
    ) -> crate::Result<Self> {
        let child_header = child.header();
        let (average_position, _) = child_header.position_and_type(average_field)?;
        let (group_position, group_type) = child_header.position_and_type(group_field)?;

        let header = TableHeader::new(
            format!("average({}.{average_field})", child_header.name),
            vec![
                Field::new(group_field, group_type),
                Field::new("average", Type::Float64),
            ],
        );

        let pending = child.next()?;
        Ok(Self {
            child,
            header,
            average_position,
            group_position,
            pending,
        })
    }

    fn value_at(record: &Record, position: usize) -> crate::Result<&Value> {
        record.get(position).ok_or_else(|| {
            crate::Error::SchemaMismatch(format!("record is narrower than position {position}"))
        })
    }
}

impl RecordSource for Average {
    fn header(&self) -> &TableHeader {
        &self.header
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        let Some(first) = self.pending.take() else {
            return Ok(None);
        };

        let group_value = Self::value_at(&first, self.group_position)?.clone();
        let mut sum = Self::value_at(&first, self.average_position)?.coerce_to_f64()?;
        let mut count = 1u64;

        loop {
            match self.child.next()? {
                None => break,
                Some(record) => {
                    if *Self::value_at(&record, self.group_position)? != group_value {
                        self.pending = Some(record);
                        break;
                    }
                    sum += Self::value_at(&record, self.average_position)?.coerce_to_f64()?;
                    count += 1;
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let average = sum / count as f64;
        Ok(Some(vec![group_value, Value::Float64(average)]))
    }

    fn close(&mut self) -> crate::Result<()> {
        self.pending = None;
        self.child.close()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{test_utils::drain, InMemoryScan};
    use super::*;
    use test_log::test;

    fn ratings_header() -> TableHeader {
        TableHeader::new(
            "ratings",
            vec![
                Field::new("movie_id", Type::Int32),
                Field::new("rating", Type::Float64),
            ],
        )
    }

    #[test]
    fn average_emits_one_record_per_group() -> crate::Result<()> {
        let records = vec![
            vec![Value::Int32(1), Value::Float64(4.0)],
            vec![Value::Int32(1), Value::Float64(5.0)],
            vec![Value::Int32(2), Value::Float64(3.0)],
            vec![Value::Int32(3), Value::Float64(1.0)],
            vec![Value::Int32(3), Value::Float64(2.0)],
            vec![Value::Int32(3), Value::Float64(3.0)],
        ];
        let scan = InMemoryScan::new(ratings_header(), records);
        let mut average = Average::new(Box::new(scan), "rating", "movie_id")?;

        assert_eq!("average(ratings.rating)", average.header().name);
        assert_eq!(
            vec![
                vec![Value::Int32(1), Value::Float64(4.5)],
                vec![Value::Int32(2), Value::Float64(3.0)],
                vec![Value::Int32(3), Value::Float64(2.0)],
            ],
            drain(&mut average)?,
        );

        average.close()?;
        Ok(())
    }

    #[test]
    fn average_coerces_integers() -> crate::Result<()> {
        let header = TableHeader::new(
            "views",
            vec![
                Field::new("group", Type::Str),
                Field::new("n", Type::Int32),
            ],
        );
        let records = vec![
            vec![Value::Str("a".into()), Value::Int32(1)],
            vec![Value::Str("a".into()), Value::Int32(2)],
        ];
        let mut average = Average::new(
            Box::new(InMemoryScan::new(header, records)),
            "n",
            "group",
        )?;

        assert_eq!(
            vec![vec![Value::Str("a".into()), Value::Float64(1.5)]],
            drain(&mut average)?,
        );

        average.close()?;
        Ok(())
    }

    #[test]
    fn average_of_empty_input_is_empty() -> crate::Result<()> {
        let scan = InMemoryScan::new(ratings_header(), vec![]);
        let mut average = Average::new(Box::new(scan), "rating", "movie_id")?;
        assert!(drain(&mut average)?.is_empty());
        average.close()?;
        Ok(())
    }
}

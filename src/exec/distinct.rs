// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{BoxedSource, RecordSource};
use crate::value::{Record, TableHeader};

/// Drops consecutive duplicate records
///
/// The input must already be grouped: each record is emitted only when
/// it differs from the immediately preceding emitted record.
pub struct Distinct {
    child: BoxedSource,
    last_emitted: Option<Record>,
}

impl Distinct {
    /// Creates a distinct over grouped input.
    #[must_use]
    pub fn new(child: BoxedSource) -> Self {
        Self {
            child,
            last_emitted: None,
        }
    }
}

impl RecordSource for Distinct {
    fn header(&self) -> &TableHeader {
        self.child.header()
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        loop {
            match self.child.next()? {
                None => return Ok(None),
                Some(record) => {
                    if self.last_emitted.as_ref() != Some(&record) {
                        self.last_emitted = Some(record.clone());
                        return Ok(Some(record));
                    }
                }
            }
        }
    }

    fn close(&mut self) -> crate::Result<()> {
        self.child.close()
    }
}

// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{joined_header, joined_record, BoxedSource, JoinKey, RecordSource};
use crate::{
    stop_signal::StopSignal,
    value::{Record, TableHeader},
};
use rustc_hash::FxHashMap;
use std::{
    sync::mpsc::{Receiver, SyncSender},
    thread::JoinHandle,
};

/// Inner equi-join where the build side (r) fits in memory
///
/// A producer thread builds a hash table over r, then probes it with
/// s, pushing joined records through a bounded handoff channel. The
/// result header is r's fields then s's fields, each qualified
/// `table.field`; join equality is on the deserialized value.
pub struct HashJoinClassic {
    header: TableHeader,
    rx: Option<Receiver<crate::Result<Record>>>,
    stop: StopSignal,
    handle: Option<JoinHandle<(BoxedSource, BoxedSource)>>,
    closed: bool,
}

impl HashJoinClassic {
    /// Creates a classic hash join of `r` and `s` on the given fields.
    pub fn new(
        r: BoxedSource,
        s: BoxedSource,
        r_join_field: &str,
        s_join_field: &str,
    ) -> crate::Result<Self> {
        let header = joined_header(r.header(), s.header(), r_join_field, s_join_field)?;
        let (r_position, _) = r.header().position_and_type(r_join_field)?;
        let (s_position, _) = s.header().position_and_type(s_join_field)?;

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let stop = StopSignal::default();
        let producer_stop = stop.clone();
        let handle = std::thread::spawn(move || {
            produce(r, s, r_position, s_position, &tx, &producer_stop)
        });

        Ok(Self {
            header,
            rx: Some(rx),
            stop,
            handle: Some(handle),
            closed: false,
        })
    }
}

fn produce(
    mut r: BoxedSource,
    mut s: BoxedSource,
    r_position: usize,
    s_position: usize,
    tx: &SyncSender<crate::Result<Record>>,
    stop: &StopSignal,
) -> (BoxedSource, BoxedSource) {
    let send = |result: crate::Result<Record>| -> bool {
        if stop.is_stopped() {
            return false;
        }
        tx.send(result).is_ok()
    };

    // Build the in-memory hash table over r.
    let mut table: FxHashMap<JoinKey, Vec<Record>> = FxHashMap::default();
    loop {
        match r.next() {
            Ok(Some(record)) => {
                if let Some(key) = record.get(r_position).and_then(JoinKey::from_value) {
                    table.entry(key).or_default().push(record);
                }
            }
            Ok(None) => break,
            Err(e) => {
                send(Err(e));
                return (r, s);
            }
        }
    }
    log::debug!("hash join built {} build-side keys", table.len());

    // Probe with s, emitting all matching pairs.
    loop {
        match s.next() {
            Ok(Some(record)) => {
                let matches = record
                    .get(s_position)
                    .and_then(JoinKey::from_value)
                    .and_then(|key| table.get(&key));
                if let Some(r_records) = matches {
                    for r_record in r_records {
                        if !send(Ok(joined_record(r_record, &record))) {
                            return (r, s);
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                send(Err(e));
                return (r, s);
            }
        }
    }

    (r, s)
}

impl RecordSource for HashJoinClassic {
    fn header(&self) -> &TableHeader {
        &self.header
    }

    fn next(&mut self) -> crate::Result<Option<Record>> {
        let Some(rx) = &self.rx else {
            return Err(crate::Error::InvalidArgument(
                "hash join is closed".to_string(),
            ));
        };
        match rx.recv() {
            Ok(result) => result.map(Some),
            // The producer hung up: the join is drained.
            Err(_) => Ok(None),
        }
    }

    fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stop.send();
        self.rx = None;

        let mut first_error = None;
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok((mut r, mut s)) => {
                    if let Err(e) = r.close() {
                        first_error.get_or_insert(e);
                    }
                    if let Err(e) = s.close() {
                        first_error.get_or_insert(e);
                    }
                }
                Err(_) => {
                    first_error.get_or_insert(crate::Error::InvalidArgument(
                        "hash join producer panicked".to_string(),
                    ));
                }
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
    use super::super::{test_utils::drain, InMemoryScan};
    use super::*;
    use crate::value::{Field, Type, Value};
    use test_log::test;

    fn user_header() -> TableHeader {
        TableHeader::new(
            "user",
            vec![
                Field::new("username", Type::Str),
                Field::new("id", Type::Int32),
            ],
        )
    }

    fn login_header() -> TableHeader {
        TableHeader::new(
            "login",
            vec![
                Field::new("user_id", Type::Int32),
                Field::new("timestamp", Type::Int32),
            ],
        )
    }

    #[test]
    fn classic_join_emits_matching_pairs() -> crate::Result<()> {
        let users = vec![
            vec![Value::Str("alice".into()), Value::Int32(1)],
            vec![Value::Str("bob".into()), Value::Int32(2)],
        ];
        let logins = vec![
            vec![Value::Int32(1), Value::Int32(100)],
            vec![Value::Int32(3), Value::Int32(101)],
            vec![Value::Int32(1), Value::Int32(102)],
        ];

        let mut join = HashJoinClassic::new(
            Box::new(InMemoryScan::new(user_header(), users)),
            Box::new(InMemoryScan::new(login_header(), logins)),
            "id",
            "user_id",
        )?;

        let result = drain(&mut join)?;
        assert_eq!(2, result.len());
        for record in &result {
            // user.id == login.user_id
            assert_eq!(record.get(1), record.get(2));
            assert_eq!(Some(&Value::Str("alice".into())), record.first());
        }

        join.close()?;
        Ok(())
    }

    #[test]
    fn close_before_drain_terminates_producer() -> crate::Result<()> {
        let users: Vec<Record> = (0..100)
            .map(|i| vec![Value::Str(format!("u{i}")), Value::Int32(i)])
            .collect();
        let logins: Vec<Record> = (0..1000)
            .map(|i| vec![Value::Int32(i % 100), Value::Int32(i)])
            .collect();

        let mut join = HashJoinClassic::new(
            Box::new(InMemoryScan::new(user_header(), users)),
            Box::new(InMemoryScan::new(login_header(), logins)),
            "id",
            "user_id",
        )?;

        // Pull a couple of records, then abandon the join.
        assert!(join.next()?.is_some());
        assert!(join.next()?.is_some());
        join.close()?;
        join.close()?; // idempotent

        assert!(join.next().is_err());
        Ok(())
    }
}

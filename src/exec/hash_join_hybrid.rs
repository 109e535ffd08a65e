// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{joined_header, joined_record, BoxedSource, JoinKey, RecordSource};
use crate::{
    bloom::BloomFilter,
    coding::Encode,
    stop_signal::StopSignal,
    stream::{PartitionedWriter, StreamScan},
    value::{Record, TableHeader},
};
use rustc_hash::FxHashMap;
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{Receiver, SyncSender},
    thread::JoinHandle,
};
use tempfile::TempDir;

/// Upper bound on the partition count
pub const MAX_PARTITIONS: usize = 1 << 20;

// Bloom filter parameters, matching the classic sizing for a large
// build side.
const BLOOM_BIT_COUNT: usize = 1 << 28;
const BLOOM_HASH_COUNT: usize = 3;

type JoinTable = FxHashMap<JoinKey, Vec<Record>>;

struct JoinConfig {
    r_position: usize,
    s_position: usize,
    use_bloom_filter: bool,
    in_memory_threshold: u32,
    num_partitions: usize,
    partition_dir: PathBuf,
    r_table_name: String,
    s_table_name: String,
}

/// Hybrid hash join: an equi-join that keeps a fraction of the build
/// side resident in memory and partitions the rest to disk
///
/// The partition of a record is a 32-bit hash of its serialized join
/// value: hashes up to `floor(in_memory_fraction * (2^32 - 1))` stay
/// in the resident hash table, the rest go to `hash % num_partitions`
/// on disk. An optional Bloom filter over the build side discards
/// probe rows that cannot match. Close removes the partition
/// directory.
pub struct HashJoinHybrid {
    header: TableHeader,
    rx: Option<Receiver<crate::Result<Record>>>,
    stop: StopSignal,
    handle: Option<JoinHandle<(BoxedSource, BoxedSource)>>,
    partition_dir: Option<TempDir>,
    closed: bool,
}

impl HashJoinHybrid {
    /// Creates a hybrid hash join of `r` and `s` on the given fields.
    ///
    /// `in_memory_fraction` must be in (0, 1) and `num_partitions` in
    /// (0, 2^20].
    pub fn new(
        r: BoxedSource,
        s: BoxedSource,
        r_join_field: &str,
        s_join_field: &str,
        use_bloom_filter: bool,
        in_memory_fraction: f64,
        num_partitions: usize,
    ) -> crate::Result<Self> {
        let header = joined_header(r.header(), s.header(), r_join_field, s_join_field)?;
        let (r_position, _) = r.header().position_and_type(r_join_field)?;
        let (s_position, _) = s.header().position_and_type(s_join_field)?;

        if in_memory_fraction <= 0.0 || in_memory_fraction >= 1.0 {
            return Err(crate::Error::InvalidArgument(format!(
                "in-memory fraction must be in (0, 1); got {in_memory_fraction}",
            )));
        }
        if num_partitions == 0 || num_partitions > MAX_PARTITIONS {
            return Err(crate::Error::InvalidArgument(format!(
                "partition count must be in (0, {MAX_PARTITIONS}]; got {num_partitions}",
            )));
        }

        let partition_dir = tempfile::tempdir()?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let in_memory_threshold = (in_memory_fraction * f64::from(u32::MAX)).floor() as u32;

        let config = JoinConfig {
            r_position,
            s_position,
            use_bloom_filter,
            in_memory_threshold,
            num_partitions,
            partition_dir: partition_dir.path().to_path_buf(),
            r_table_name: r.header().name.clone(),
            s_table_name: s.header().name.clone(),
        };

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let stop = StopSignal::default();
        let producer_stop = stop.clone();
        let handle = std::thread::spawn(move || produce(r, s, &config, &tx, &producer_stop));

        Ok(Self {
            header,
            rx: Some(rx),
            stop,
            handle: Some(handle),
            partition_dir: Some(partition_dir),
            closed: false,
        })
    }
}

fn partition_paths(dir: &Path, table_name: &str, num_partitions: usize) -> Vec<PathBuf> {
    (0..num_partitions)
        .map(|i| dir.join(format!("{table_name}-{i}")))
        .collect()
}

/// Partition of a serialized join value; `None` means the resident
/// in-memory partition.
fn partition_for(serialized: &[u8], threshold: u32, num_partitions: usize) -> Option<usize> {
    let hash = xxhash_rust::xxh32::xxh32(serialized, 0);
    if hash <= threshold {
        None
    } else {
        Some(hash as usize % num_partitions)
    }
}

fn produce(
    mut r: BoxedSource,
    mut s: BoxedSource,
    config: &JoinConfig,
    tx: &SyncSender<crate::Result<Record>>,
    stop: &StopSignal,
) -> (BoxedSource, BoxedSource) {
    let send = |result: crate::Result<Record>| -> bool {
        if stop.is_stopped() {
            return false;
        }
        tx.send(result).is_ok()
    };

    match initial_pass(&mut r, &mut s, config, &send) {
        // Cancelled mid-stream; nothing more to do.
        Ok(None) => return (r, s),
        Ok(Some((r_paths, s_paths))) => {
            for (r_path, s_path) in r_paths.iter().zip(&s_paths) {
                match process_partition(r_path, s_path, config, &send) {
                    Ok(true) => {}
                    Ok(false) => return (r, s),
                    Err(e) => {
                        send(Err(e));
                        return (r, s);
                    }
                }
            }
        }
        Err(e) => {
            send(Err(e));
        }
    }

    (r, s)
}

/// First pass over both inputs.
///
/// Build side: feed the Bloom filter, keep low-hash records resident,
/// spill the rest. Probe side: discard Bloom-negative rows, probe the
/// resident table immediately, spill the rest. Returns the partition
/// paths, or `None` when the consumer went away.
#[allow(clippy::type_complexity)]
fn initial_pass(
    r: &mut BoxedSource,
    s: &mut BoxedSource,
    config: &JoinConfig,
    send: &dyn Fn(crate::Result<Record>) -> bool,
) -> crate::Result<Option<(Vec<PathBuf>, Vec<PathBuf>)>> {
    let mut bloom_filter = config
        .use_bloom_filter
        .then(|| BloomFilter::with_bit_count(BLOOM_BIT_COUNT, BLOOM_HASH_COUNT));

    let mut resident: JoinTable = FxHashMap::default();

    // Sides are prefixed separately; a self-join may carry the same
    // table name on both inputs.
    let r_paths = partition_paths(
        &config.partition_dir,
        &format!("r-{}", config.r_table_name),
        config.num_partitions,
    );
    let mut r_writer = PartitionedWriter::create(&r_paths, r.header())?;
    let mut spilled = 0usize;

    while let Some(record) = r.next()? {
        let Some(value) = record.get(config.r_position) else {
            continue;
        };
        let serialized = value.encode_into_vec().map_err(crate::Error::Encode)?;
        if let Some(filter) = &mut bloom_filter {
            filter.insert(&serialized);
        }
        match partition_for(&serialized, config.in_memory_threshold, config.num_partitions) {
            None => {
                if let Some(key) = JoinKey::from_value(value) {
                    resident.entry(key).or_default().push(record);
                }
            }
            Some(partition) => {
                r_writer.write_to_partition(&record, partition)?;
                spilled += 1;
            }
        }
    }
    r_writer.close()?;
    log::debug!(
        "hybrid join initial pass kept {} resident keys, spilled {spilled} build rows",
        resident.len(),
    );

    let s_paths = partition_paths(
        &config.partition_dir,
        &format!("s-{}", config.s_table_name),
        config.num_partitions,
    );
    let mut s_writer = PartitionedWriter::create(&s_paths, s.header())?;

    while let Some(record) = s.next()? {
        let Some(value) = record.get(config.s_position) else {
            continue;
        };
        let serialized = value.encode_into_vec().map_err(crate::Error::Encode)?;

        // A Bloom miss means the row joins with nothing in r.
        if bloom_filter
            .as_ref()
            .is_some_and(|filter| !filter.contains(&serialized))
        {
            continue;
        }

        match partition_for(&serialized, config.in_memory_threshold, config.num_partitions) {
            None => {
                let matches = JoinKey::from_value(value).and_then(|key| resident.get(&key));
                if let Some(r_records) = matches {
                    for r_record in r_records {
                        if !send(Ok(joined_record(r_record, &record))) {
                            return Ok(None);
                        }
                    }
                }
            }
            Some(partition) => s_writer.write_to_partition(&record, partition)?,
        }
    }
    s_writer.close()?;

    Ok(Some((r_paths, s_paths)))
}

/// Second phase for one partition pair: rebuild a hash table from r's
/// partition and probe it with s's. Returns `false` when the consumer
/// went away.
fn process_partition(
    r_path: &Path,
    s_path: &Path,
    config: &JoinConfig,
    send: &dyn Fn(crate::Result<Record>) -> bool,
) -> crate::Result<bool> {
    let mut table: JoinTable = FxHashMap::default();

    let mut r_scan = StreamScan::open(r_path)?;
    while let Some(record) = r_scan.next()? {
        if let Some(key) = record.get(config.r_position).and_then(JoinKey::from_value) {
            table.entry(key).or_default().push(record);
        }
    }
    r_scan.close()?;

    let mut s_scan = StreamScan::open(s_path)?;
    while let Some(record) = s_scan.next()? {
        let matches = record
            .get(config.s_position)
            .and_then(JoinKey::from_value)
            .and_then(|key| table.get(&key));
        if let Some(r_records) = matches {
            for r_record in r_records {
                if !send(Ok(joined_record(r_record, &record))) {
                    return Ok(false);
                }
            }
        }
    }
    s_scan.close()?;

    Ok(true)
}

impl RecordSource for HashJoinHybrid {
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
        if let Some(partition_dir) = self.partition_dir.take() {
            if let Err(e) = partition_dir.close() {
                first_error.get_or_insert(crate::Error::Io(e));
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

    #[test]
    fn hybrid_join_validates_parameters() {
        let r = || {
            Box::new(InMemoryScan::new(
                TableHeader::new("r", vec![Field::new("k", Type::Int32)]),
                vec![],
            )) as BoxedSource
        };
        let s = || {
            Box::new(InMemoryScan::new(
                TableHeader::new("s", vec![Field::new("k", Type::Int32)]),
                vec![],
            )) as BoxedSource
        };

        assert!(HashJoinHybrid::new(r(), s(), "k", "k", false, 0.0, 3).is_err());
        assert!(HashJoinHybrid::new(r(), s(), "k", "k", false, 1.0, 3).is_err());
        assert!(HashJoinHybrid::new(r(), s(), "k", "k", false, 0.5, 0).is_err());
        assert!(
            HashJoinHybrid::new(r(), s(), "k", "k", false, 0.5, MAX_PARTITIONS + 1).is_err()
        );
    }

    #[test]
    fn hybrid_join_small_fraction_spills_everything() -> crate::Result<()> {
        let r_header = TableHeader::new(
            "r",
            vec![Field::new("k", Type::Int32), Field::new("a", Type::Str)],
        );
        let s_header = TableHeader::new(
            "s",
            vec![Field::new("k", Type::Int32), Field::new("b", Type::Int32)],
        );

        let r_records: Vec<Record> = (0..20)
            .map(|i| vec![Value::Int32(i), Value::Str(format!("r{i}"))])
            .collect();
        let s_records: Vec<Record> = (0..40)
            .map(|i| vec![Value::Int32(i % 20), Value::Int32(i)])
            .collect();

        let mut join = HashJoinHybrid::new(
            Box::new(InMemoryScan::new(r_header, r_records)),
            Box::new(InMemoryScan::new(s_header, s_records)),
            "k",
            "k",
            true,
            0.001,
            4,
        )?;

        let result = drain(&mut join)?;
        assert_eq!(40, result.len());
        for record in &result {
            assert_eq!(record.first(), record.get(2));
        }

        join.close()?;
        Ok(())
    }
}

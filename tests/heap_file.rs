use rowstore::{
    Field, HeapFile, HeapFileScan, Record, RecordSource, TableHeader, Type, Value,
};
use std::collections::HashMap;
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

fn movie_cycle() -> Vec<Record> {
    vec![
        vec![
            Value::Str("Leon".into()),
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

fn multiset(records: &[Record]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(format!("{record:?}")).or_insert(0) += 1;
    }
    counts
}

#[test]
fn heap_roundtrip_with_deletions() -> rowstore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("movies.heap");

    let cycle = movie_cycle();
    let total = 5000usize;

    let mut hf = HeapFile::create(&path, &movies_header())?;
    let mut rids = Vec::with_capacity(total);
    for i in 0..total {
        let record = &cycle[i % cycle.len()];
        let rid = hf.insert(record)?;
        assert_eq!(Some(record.clone()), hf.get(rid)?);
        rids.push(rid);
    }

    // Delete a random window of ten records.
    let k = rand::random_range(0..total - 10);
    for rid in &rids[k..k + 10] {
        hf.delete(*rid)?;
        assert_eq!(None, hf.get(*rid)?);
        // Delete idempotence.
        hf.delete(*rid)?;
        assert_eq!(None, hf.get(*rid)?);
    }
    hf.close()?;

    // 5000 records of this shape span at least 3 default-size pages.
    let file_len = std::fs::metadata(&path)?.len();
    assert!(file_len >= 3 * rowstore::DEFAULT_BLOCK_SIZE as u64);

    let mut scan = HeapFileScan::open(&path)?;
    assert_eq!(movies_header(), *scan.header());

    let mut scanned = vec![];
    let mut last_rid = None;
    while let Some((record, rid)) = scan.next_with_id()? {
        // (page, slot) ascending order.
        if let Some(last) = last_rid {
            assert!((rid.page_id, rid.slot_id) > last);
        }
        last_rid = Some((rid.page_id, rid.slot_id));
        scanned.push(record);
    }
    scan.close()?;

    assert_eq!(total - 10, scanned.len());

    let expected: Vec<Record> = (0..total)
        .filter(|i| !(k..k + 10).contains(i))
        .map(|i| cycle[i % cycle.len()].clone())
        .collect();
    assert_eq!(multiset(&expected), multiset(&scanned));

    Ok(())
}

#[test]
fn scan_sees_only_live_records_after_reopen() -> rowstore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("movies.heap");

    {
        let mut hf = HeapFile::create(&path, &movies_header())?;
        let keep = hf.insert(&movie_cycle()[0])?;
        let gone = hf.insert(&movie_cycle()[1])?;
        hf.delete(gone)?;
        hf.close()?;
        drop(keep);
    }

    // Deletes survive reopen.
    let hf = HeapFile::open(&path)?;
    drop(hf);

    let mut scan = HeapFileScan::open(&path)?;
    let mut records = vec![];
    while let Some(record) = scan.next()? {
        records.push(record);
    }
    scan.close()?;

    assert_eq!(vec![movie_cycle()[0].clone()], records);
    Ok(())
}

#[test]
fn bulk_load_streams_a_source() -> rowstore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("movies.heap");

    let records: Vec<Record> = (0..100)
        .map(|i| movie_cycle()[i % 4].clone())
        .collect();
    let mut source = rowstore::exec::InMemoryScan::new(movies_header(), records.clone());
    HeapFile::bulk_load(&path, &mut source)?;
    source.close()?;

    let mut scan = HeapFileScan::open(&path)?;
    let mut scanned = vec![];
    while let Some(record) = scan.next()? {
        scanned.push(record);
    }
    scan.close()?;

    assert_eq!(records, scanned);
    Ok(())
}

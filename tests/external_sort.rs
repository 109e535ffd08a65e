use rowstore::{
    exec::{InMemoryScan, RecordSource, SortInMemory, SortOnDisk},
    Field, Record, TableHeader, Type, Value,
};
use std::collections::HashMap;
use test_log::test;

fn movies_header() -> TableHeader {
    TableHeader::new(
        "movies",
        vec![
            Field::new("movie", Type::Str),
            Field::new("rating", Type::Float64),
            Field::new("year", Type::Int32),
        ],
    )
}

fn small_input() -> Vec<Record> {
    vec![
        vec![
            Value::Str("Hackers".into()),
            Value::Float64(3.7),
            Value::Int32(1995),
        ],
        vec![
            Value::Str("Gattaca".into()),
            Value::Float64(4.5),
            Value::Int32(1997),
        ],
        vec![
            Value::Str("Inside Out".into()),
            Value::Float64(4.7),
            Value::Int32(2015),
        ],
        vec![
            Value::Str("Leon".into()),
            Value::Float64(4.6),
            Value::Int32(1994),
        ],
    ]
}

fn random_input(n: usize) -> Vec<Record> {
    (0..n)
        .map(|_| {
            vec![
                Value::Str(nanoid::nanoid!(8)),
                Value::Float64(f64::from(rand::random_range(0..=50)) / 10.0),
                Value::Int32(rand::random_range(1950..2026)),
            ]
        })
        .collect()
}

fn drain(source: &mut dyn RecordSource) -> rowstore::Result<Vec<Record>> {
    let mut records = vec![];
    while let Some(record) = source.next()? {
        records.push(record);
    }
    Ok(records)
}

fn multiset(records: &[Record]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry(format!("{record:?}")).or_insert(0) += 1;
    }
    counts
}

fn assert_sorted_on(records: &[Record], position: usize, descending: bool) {
    for pair in records.windows(2) {
        let (a, b) = (&pair[0][position], &pair[1][position]);
        let ordering = a
            .cmp_same_type(b)
            .expect("sort column should be uniformly typed");
        if descending {
            assert!(ordering != std::cmp::Ordering::Less, "{a:?} before {b:?}");
        } else {
            assert!(ordering != std::cmp::Ordering::Greater, "{a:?} before {b:?}");
        }
    }
}

#[test]
fn tiny_input_matches_in_memory_sort() -> rowstore::Result<()> {
    // Batch size larger than the input: a single sorted run.
    for (field, position) in [("movie", 0), ("rating", 1), ("year", 2)] {
        for descending in [false, true] {
            let scan = InMemoryScan::new(movies_header(), small_input());
            let mut on_disk = SortOnDisk::with_batch_size(Box::new(scan), field, descending, 10)?;
            let disk_sorted = drain(&mut on_disk)?;
            on_disk.close()?;

            let scan = InMemoryScan::new(movies_header(), small_input());
            let mut in_memory = SortInMemory::new(Box::new(scan), field, descending)?;
            let memory_sorted = drain(&mut in_memory)?;
            in_memory.close()?;

            assert_eq!(memory_sorted.len(), disk_sorted.len());
            assert_sorted_on(&disk_sorted, position, descending);
            assert_eq!(multiset(&memory_sorted), multiset(&disk_sorted));
        }
    }
    Ok(())
}

#[test]
fn many_runs_merge_into_total_order() -> rowstore::Result<()> {
    let input = random_input(1000);

    for (field, position) in [("movie", 0), ("rating", 1), ("year", 2)] {
        for descending in [false, true] {
            let scan = InMemoryScan::new(movies_header(), input.clone());
            // Forces ten sorted runs.
            let mut sort = SortOnDisk::with_batch_size(Box::new(scan), field, descending, 100)?;
            let sorted = drain(&mut sort)?;
            sort.close()?;

            assert_eq!(input.len(), sorted.len());
            assert_sorted_on(&sorted, position, descending);
            assert_eq!(multiset(&input), multiset(&sorted));
        }
    }
    Ok(())
}

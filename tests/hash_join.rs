use rowstore::{
    exec::{HashJoinClassic, HashJoinHybrid, InMemoryScan, RecordSource},
    Field, Record, TableHeader, Type, Value,
};
use std::collections::HashMap;
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

/// Seven users, concatenated with themselves: every id appears twice.
fn users() -> Vec<Record> {
    let names = ["ada", "bob", "cleo", "dan", "eve", "fred", "gus"];
    let mut records: Vec<Record> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            vec![Value::Str((*name).to_string()), Value::Int32(i as i32)]
        })
        .collect();
    let copy = records.clone();
    records.extend(copy);
    records
}

/// One hundred logins with user_id = timestamp mod 7.
fn logins() -> Vec<Record> {
    (0..100)
        .map(|ts| vec![Value::Int32(ts % 7), Value::Int32(ts)])
        .collect()
}

fn nested_loop_join(
    r: &[Record],
    s: &[Record],
    r_position: usize,
    s_position: usize,
) -> Vec<Record> {
    let mut result = vec![];
    for r_record in r {
        for s_record in s {
            if r_record[r_position] == s_record[s_position] {
                let mut joined = r_record.clone();
                joined.extend(s_record.iter().cloned());
                result.push(joined);
            }
        }
    }
    result
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

#[test]
fn hybrid_join_with_duplicates() -> rowstore::Result<()> {
    let mut join = HashJoinHybrid::new(
        Box::new(InMemoryScan::new(user_header(), users())),
        Box::new(InMemoryScan::new(login_header(), logins())),
        "id",
        "user_id",
        true,
        0.3,
        3,
    )?;

    assert_eq!("(user.id = login.user_id)", join.header().name);

    let result = drain(&mut join)?;
    join.close()?;

    // 100 logins, each matching a user id that appears twice.
    assert_eq!(200, result.len());
    for record in &result {
        // user.id == login.user_id
        assert_eq!(record[1], record[2]);
    }

    let expected = nested_loop_join(&users(), &logins(), 1, 0);
    assert_eq!(multiset(&expected), multiset(&result));

    Ok(())
}

#[test]
fn classic_and_hybrid_agree_with_nested_loop() -> rowstore::Result<()> {
    let expected = multiset(&nested_loop_join(&users(), &logins(), 1, 0));

    let mut classic = HashJoinClassic::new(
        Box::new(InMemoryScan::new(user_header(), users())),
        Box::new(InMemoryScan::new(login_header(), logins())),
        "id",
        "user_id",
    )?;
    let classic_result = drain(&mut classic)?;
    classic.close()?;
    assert_eq!(expected, multiset(&classic_result));

    // Several hybrid configurations, Bloom on and off: the multiset
    // never changes.
    for (use_bloom, fraction, partitions) in
        [(true, 0.3, 3), (false, 0.3, 3), (true, 0.9, 1), (false, 0.05, 8)]
    {
        let mut hybrid = HashJoinHybrid::new(
            Box::new(InMemoryScan::new(user_header(), users())),
            Box::new(InMemoryScan::new(login_header(), logins())),
            "id",
            "user_id",
            use_bloom,
            fraction,
            partitions,
        )?;
        let hybrid_result = drain(&mut hybrid)?;
        hybrid.close()?;
        assert_eq!(
            expected,
            multiset(&hybrid_result),
            "bloom={use_bloom} fraction={fraction} partitions={partitions}",
        );
    }

    Ok(())
}

#[test]
fn string_join_keys() -> rowstore::Result<()> {
    let left_header = TableHeader::new(
        "left",
        vec![Field::new("name", Type::Str), Field::new("x", Type::Int32)],
    );
    let right_header = TableHeader::new(
        "right",
        vec![Field::new("who", Type::Str), Field::new("y", Type::Int32)],
    );

    let left: Vec<Record> = ["a", "b", "c"]
        .iter()
        .enumerate()
        .map(|(i, n)| {
            vec![Value::Str((*n).to_string()), Value::Int32(i as i32)]
        })
        .collect();
    let right: Vec<Record> = ["b", "c", "d", "b"]
        .iter()
        .enumerate()
        .map(|(i, n)| {
            vec![Value::Str((*n).to_string()), Value::Int32(10 + i as i32)]
        })
        .collect();

    let expected = multiset(&nested_loop_join(&left, &right, 0, 0));
    assert_eq!(3, expected.values().sum::<usize>());

    let mut join = HashJoinHybrid::new(
        Box::new(InMemoryScan::new(left_header, left)),
        Box::new(InMemoryScan::new(right_header, right)),
        "name",
        "who",
        true,
        0.5,
        2,
    )?;
    let result = drain(&mut join)?;
    join.close()?;

    assert_eq!(expected, multiset(&result));
    Ok(())
}

#[test]
fn join_of_empty_inputs_is_empty() -> rowstore::Result<()> {
    let mut join = HashJoinClassic::new(
        Box::new(InMemoryScan::new(user_header(), vec![])),
        Box::new(InMemoryScan::new(login_header(), logins())),
        "id",
        "user_id",
    )?;
    assert!(drain(&mut join)?.is_empty());
    join.close()?;

    let mut join = HashJoinHybrid::new(
        Box::new(InMemoryScan::new(user_header(), users())),
        Box::new(InMemoryScan::new(login_header(), vec![])),
        "id",
        "user_id",
        true,
        0.4,
        4,
    )?;
    assert!(drain(&mut join)?.is_empty());
    join.close()?;

    Ok(())
}

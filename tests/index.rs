use rand::seq::SliceRandom;
use rowstore::{BPlusTree, Entry, RecordId};
use std::collections::HashSet;
use test_log::test;

// Small blocks keep the trees deep enough to exercise splits at every
// level without huge inserts.
const BLOCK_SIZE: usize = 256;

fn entry(key: i32, j: i32) -> Entry {
    Entry {
        key,
        rid: RecordId {
            page_id: j,
            slot_id: j as u16,
        },
    }
}

fn drain(iter: &mut rowstore::index::EntryIter<'_>) -> rowstore::Result<Vec<Entry>> {
    let mut entries = vec![];
    while let Some(e) = iter.next()? {
        entries.push(e);
    }
    // Repeated pulls stay drained.
    assert!(iter.next()?.is_none());
    assert!(iter.next()?.is_none());
    Ok(entries)
}

#[test]
fn stress_with_duplicate_keys() -> rowstore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("index");

    let num_keys = 1000;
    let entries_per_key = 10;

    let mut keys: Vec<i32> = (0..num_keys).map(|i| i * 5).collect();
    keys.shuffle(&mut rand::rng());

    let mut tree = BPlusTree::open_with_block_size(&path, BLOCK_SIZE)?;
    for &key in &keys {
        for j in 0..entries_per_key {
            tree.insert(entry(key, j))?;
        }
    }

    for i in 0..num_keys {
        let key = i * 5;

        let found = drain(&mut tree.find_equal(key)?)?;
        assert_eq!(entries_per_key as usize, found.len(), "key {key}");
        let expected: HashSet<Entry> = (0..entries_per_key).map(|j| entry(key, j)).collect();
        assert_eq!(expected, found.into_iter().collect());

        // Keys between used keys find nothing.
        assert!(drain(&mut tree.find_equal(key + 1)?)?.is_empty());
    }

    // Range from the middle: exactly half the entries, key-ascending.
    let upper_half = drain(&mut tree.find_greater_equal(2500)?)?;
    assert_eq!(5000, upper_half.len());
    for pair in upper_half.windows(2) {
        assert!(pair[0].key <= pair[1].key);
    }
    assert!(upper_half.iter().all(|e| e.key >= 2500));

    // Range law: everything comes back, key-ascending.
    let all = drain(&mut tree.find_greater_equal(i32::MIN)?)?;
    assert_eq!(10_000, all.len());
    for pair in all.windows(2) {
        assert!(pair[0].key <= pair[1].key);
    }

    // Nothing beyond the largest key.
    assert!(drain(&mut tree.find_greater_equal(num_keys * 5)?)?.is_empty());

    tree.close()?;
    Ok(())
}

#[test]
fn survives_reopen() -> rowstore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("index");

    {
        let mut tree = BPlusTree::open_with_block_size(&path, BLOCK_SIZE)?;
        for key in 0..500 {
            tree.insert(entry(key, key))?;
        }
        tree.close()?;
    }

    let tree = BPlusTree::open_with_block_size(&path, BLOCK_SIZE)?;
    for key in 0..500 {
        let found = drain(&mut tree.find_equal(key)?)?;
        assert_eq!(vec![entry(key, key)], found);
    }

    Ok(())
}

#[test]
fn long_duplicate_runs_chain_across_leaves() -> rowstore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("index");

    // Far more duplicates per key than fit one leaf.
    let mut tree = BPlusTree::open_with_block_size(&path, BLOCK_SIZE)?;
    for key in [10, 20, 30] {
        for j in 0..200 {
            tree.insert(entry(key, j))?;
        }
    }

    for key in [10, 20, 30] {
        let found = drain(&mut tree.find_equal(key)?)?;
        assert_eq!(200, found.len());
        assert!(found.iter().all(|e| e.key == key));
    }
    assert!(drain(&mut tree.find_equal(15)?)?.is_empty());
    assert_eq!(400, drain(&mut tree.find_greater_equal(11)?)?.len());

    tree.close()?;
    Ok(())
}

#[test]
fn bulk_load_matches_incremental_inserts() -> rowstore::Result<()> {
    let dir = tempfile::tempdir()?;

    let mut sorted_entries = vec![];
    for key in 0..300 {
        for j in 0..(1 + key % 7) {
            sorted_entries.push(entry(key * 3, j));
        }
    }

    let inserted_path = dir.path().join("inserted");
    let mut inserted = BPlusTree::open_with_block_size(&inserted_path, BLOCK_SIZE)?;
    for e in &sorted_entries {
        inserted.insert(*e)?;
    }

    for load_factor in [0.3, 0.5, 1.0] {
        let loaded_path = dir.path().join(format!("loaded-{load_factor}"));
        let loaded = BPlusTree::bulk_load_with_block_size(
            &loaded_path,
            &sorted_entries,
            load_factor,
            BLOCK_SIZE,
        )?;

        // Observationally indistinguishable from the insert-built tree.
        assert_eq!(
            drain(&mut inserted.find_greater_equal(i32::MIN)?)?,
            drain(&mut loaded.find_greater_equal(i32::MIN)?)?,
        );
        for key in [0, 3, 299 * 3, 1, 500] {
            assert_eq!(
                drain(&mut inserted.find_equal(key)?)?,
                drain(&mut loaded.find_equal(key)?)?,
            );
        }
    }

    inserted.close()?;
    Ok(())
}

#[test]
fn bulk_load_validates_parameters() -> rowstore::Result<()> {
    let dir = tempfile::tempdir()?;

    let entries = vec![entry(1, 1)];
    for (name, entries, load_factor) in [
        ("empty", vec![], 0.5),
        ("zero-lf", entries.clone(), 0.0),
        ("negative-lf", entries.clone(), -0.5),
        ("lf-above-one", entries.clone(), 1.5),
        ("lf-too-small", entries, 0.001),
    ] {
        let path = dir.path().join(name);
        assert!(
            BPlusTree::bulk_load_with_block_size(&path, &entries, load_factor, BLOCK_SIZE)
                .is_err(),
            "{name}",
        );
    }

    Ok(())
}

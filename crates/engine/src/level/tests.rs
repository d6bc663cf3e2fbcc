use super::*;
use meta::{Meta, VALUE_TYPE_STRING};
use sstable::{Record, SSTableWriter};
use tempfile::tempdir;

fn write_table(dir: &std::path::Path, name: &str, entries: &[(&str, &str, u64)]) -> SSTableReader {
    let path = dir.join(name);
    let records = entries.iter().map(|(k, v, seq)| Record {
        key: k.as_bytes().to_vec(),
        value: v.as_bytes().to_vec(),
        seq: *seq,
        meta: Meta::put(VALUE_TYPE_STRING),
    });
    SSTableWriter::write(&path, entries.len(), 0.01, records).unwrap();
    SSTableReader::open(&path).unwrap()
}

#[test]
fn get_checks_level_0_before_higher_levels() {
    let dir = tempdir().unwrap();
    let lm = LevelManager::new(4);
    lm.add_table(1, 1, write_table(dir.path(), "l1.sst", &[("k", "old", 1)]));
    lm.add_table(0, 2, write_table(dir.path(), "l0.sst", &[("k", "new", 2)]));

    let got = lm.get(b"k").unwrap().unwrap();
    assert_eq!(got.value, b"new");
}

#[test]
fn get_returns_none_for_missing_key() {
    let dir = tempdir().unwrap();
    let lm = LevelManager::new(4);
    lm.add_table(0, 1, write_table(dir.path(), "l0.sst", &[("k", "v", 1)]));
    assert!(lm.get(b"missing").unwrap().is_none());
}

#[test]
fn capacity_grows_geometrically() {
    let lm = LevelManager::new(4);
    assert_eq!(lm.capacity(0), 4);
    assert_eq!(lm.capacity(1), 16);
    assert_eq!(lm.capacity(2), 64);
}

#[test]
fn replace_levels_clears_inputs_and_installs_output() {
    let dir = tempdir().unwrap();
    let lm = LevelManager::new(4);
    lm.add_table(0, 1, write_table(dir.path(), "a.sst", &[("k1", "1", 1)]));
    lm.add_table(1, 2, write_table(dir.path(), "b.sst", &[("k2", "2", 2)]));

    let merged = write_table(dir.path(), "merged.sst", &[("k1", "1", 1), ("k2", "2", 2)]);
    lm.replace_levels(&[0, 1], 1, vec![LevelTable { id: 3, reader: merged }]);

    assert_eq!(lm.count_at(0), 0);
    assert_eq!(lm.count_at(1), 1);
    assert!(lm.get(b"k1").unwrap().is_some());
    assert!(lm.get(b"k2").unwrap().is_some());
}

#[test]
fn drain_all_empties_the_manager() {
    let dir = tempdir().unwrap();
    let lm = LevelManager::new(4);
    lm.add_table(0, 1, write_table(dir.path(), "a.sst", &[("k", "v", 1)]));
    let drained = lm.drain_all();
    assert_eq!(drained.len(), 1);
    assert_eq!(lm.table_count(), 0);
}

#[test]
fn take_levels_removes_only_named_levels() {
    let dir = tempdir().unwrap();
    let lm = LevelManager::new(4);
    lm.add_table(0, 1, write_table(dir.path(), "a.sst", &[("k1", "1", 1)]));
    lm.add_table(1, 2, write_table(dir.path(), "b.sst", &[("k2", "2", 2)]));
    lm.add_table(2, 3, write_table(dir.path(), "c.sst", &[("k3", "3", 3)]));

    let taken = lm.take_levels(&[0, 1]);
    let ids: Vec<u64> = taken.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(lm.count_at(0), 0);
    assert_eq!(lm.count_at(1), 0);
    assert_eq!(lm.count_at(2), 1);
}

#[test]
fn populated_levels_lists_only_nonempty_levels() {
    let dir = tempdir().unwrap();
    let lm = LevelManager::new(4);
    lm.add_table(0, 1, write_table(dir.path(), "a.sst", &[("k", "v", 1)]));
    lm.add_table(2, 2, write_table(dir.path(), "b.sst", &[("k2", "v2", 2)]));
    assert_eq!(lm.populated_levels(), vec![0, 2]);
}

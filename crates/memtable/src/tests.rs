use super::*;
use meta::VALUE_TYPE_STRING;
use std::sync::Arc;
use std::thread;

const HUGE: usize = 1 << 30;

fn fresh() -> Memtable {
    Memtable::new(HUGE, 4)
}

// -------------------- Basic CRUD --------------------

#[test]
fn put_and_get_single_key() {
    let m = fresh();
    m.put(b"k1".to_vec(), b"v1".to_vec(), 1, VALUE_TYPE_STRING);
    assert_eq!(m.len(), 1);
    let entry = m.get(b"k1").unwrap();
    assert_eq!(entry.seq, 1);
    assert_eq!(entry.value, b"v1");
}

#[test]
fn put_overwrites_with_newer_seq() {
    let m = fresh();
    m.put(b"k1".to_vec(), b"v1".to_vec(), 1, VALUE_TYPE_STRING);
    m.put(b"k1".to_vec(), b"v2".to_vec(), 2, VALUE_TYPE_STRING);
    assert_eq!(m.get(b"k1").unwrap().value, b"v2");
}

#[test]
fn put_ignores_stale_seq() {
    let m = fresh();
    m.put(b"k1".to_vec(), b"v2".to_vec(), 5, VALUE_TYPE_STRING);
    m.put(b"k1".to_vec(), b"v-old".to_vec(), 3, VALUE_TYPE_STRING);
    assert_eq!(m.get(b"k1").unwrap().value, b"v2");
}

#[test]
fn put_ignores_equal_seq() {
    let m = fresh();
    m.put(b"k".to_vec(), b"first".to_vec(), 1, VALUE_TYPE_STRING);
    m.put(b"k".to_vec(), b"second".to_vec(), 1, VALUE_TYPE_STRING);
    assert_eq!(m.get(b"k").unwrap().value, b"first");
}

#[test]
fn get_missing_key_returns_none() {
    let m = fresh();
    assert!(m.get(b"nonexistent").is_none());
}

#[test]
fn delete_creates_tombstone() {
    let m = fresh();
    m.put(b"k1".to_vec(), b"v1".to_vec(), 1, VALUE_TYPE_STRING);
    m.delete(b"k1".to_vec(), 2);
    assert!(m.get(b"k1").unwrap().is_tombstone());
    assert_eq!(m.len(), 1); // tombstone still present
}

// -------------------- Load tests --------------------

#[test]
fn write_load_10k_unique_keys() {
    let m = fresh();
    for i in 0..10_000u64 {
        let key = format!("key{}", i).into_bytes();
        let val = vec![b'x'; 100];
        m.put(key, val, i, VALUE_TYPE_STRING);
    }
    assert_eq!(m.len(), 10_000);
}

#[test]
fn write_load_with_key_reuse() {
    let m = fresh();
    let mut seq = 0u64;
    for i in 0..100_000u64 {
        seq += 1;
        let key = format!("key{}", i % 1_000).into_bytes();
        m.put(key, vec![b'x'; 50], seq, VALUE_TYPE_STRING);
    }
    assert_eq!(m.len(), 1_000);
}

// -------------------- Snapshot ordering --------------------

#[test]
fn snapshot_yields_sorted_keys() {
    let m = fresh();
    m.put(b"c".to_vec(), b"3".to_vec(), 3, VALUE_TYPE_STRING);
    m.put(b"a".to_vec(), b"1".to_vec(), 1, VALUE_TYPE_STRING);
    m.put(b"b".to_vec(), b"2".to_vec(), 2, VALUE_TYPE_STRING);

    let keys: Vec<Vec<u8>> = m.snapshot().into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn snapshot_includes_tombstones() {
    let m = fresh();
    m.put(b"a".to_vec(), b"1".to_vec(), 1, VALUE_TYPE_STRING);
    m.delete(b"b".to_vec(), 2);
    m.put(b"c".to_vec(), b"3".to_vec(), 3, VALUE_TYPE_STRING);

    let entries = m.snapshot();
    assert_eq!(entries.len(), 3);
    assert!(entries[1].1.is_tombstone());
}

#[test]
fn snapshot_empty_memtable() {
    let m = fresh();
    assert_eq!(m.snapshot().len(), 0);
}

// -------------------- approx_size tracking --------------------

#[test]
fn approx_size_includes_key_and_value() {
    let m = fresh();
    assert_eq!(m.approx_size(), 0);
    m.put(b"ab".to_vec(), b"ccc".to_vec(), 1, VALUE_TYPE_STRING);
    assert_eq!(m.approx_size(), 5);
}

#[test]
fn seq_max_u64() {
    let m = fresh();
    m.put(b"k".to_vec(), b"v".to_vec(), u64::MAX, VALUE_TYPE_STRING);
    assert_eq!(m.get(b"k").unwrap().seq, u64::MAX);
}

// -------------------- len / is_empty --------------------

#[test]
fn len_counts_tombstones() {
    let m = fresh();
    m.put(b"a".to_vec(), b"1".to_vec(), 1, VALUE_TYPE_STRING);
    m.delete(b"b".to_vec(), 2);
    assert_eq!(m.len(), 2);
}

#[test]
fn is_empty_on_new() {
    let m = fresh();
    assert!(m.is_empty());
}

#[test]
fn is_empty_after_insert() {
    let m = fresh();
    m.put(b"k".to_vec(), b"v".to_vec(), 1, VALUE_TYPE_STRING);
    assert!(!m.is_empty());
}

// -------------------- Many / stress tests --------------------

#[test]
fn many_distinct_keys_stay_sorted() {
    let m = fresh();
    for i in 0u64..1000 {
        m.put(
            format!("key{:04}", i).into_bytes(),
            b"v".to_vec(),
            i,
            VALUE_TYPE_STRING,
        );
    }
    assert_eq!(m.len(), 1000);
    let keys: Vec<Vec<u8>> = m.snapshot().into_iter().map(|(k, _)| k).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn overwrite_same_key_many_times() {
    let m = fresh();
    for seq in 1..=10_000u64 {
        m.put(
            b"k".to_vec(),
            format!("v{}", seq).into_bytes(),
            seq,
            VALUE_TYPE_STRING,
        );
    }
    assert_eq!(m.len(), 1);
    assert_eq!(m.get(b"k").unwrap().seq, 10_000);
}

#[test]
fn alternating_put_delete() {
    let m = fresh();
    for i in 0..1_000u64 {
        let seq = i * 2 + 1;
        m.put(b"k".to_vec(), b"v".to_vec(), seq, VALUE_TYPE_STRING);
        m.delete(b"k".to_vec(), seq + 1);
    }
    assert!(m.get(b"k").unwrap().is_tombstone());
    assert_eq!(m.len(), 1);
}

// -------------------- Edge cases --------------------

#[test]
fn empty_key() {
    let m = fresh();
    m.put(b"".to_vec(), b"val".to_vec(), 1, VALUE_TYPE_STRING);
    assert_eq!(m.get(b"").unwrap().value, b"val");
}

#[test]
fn empty_value() {
    let m = fresh();
    m.put(b"k".to_vec(), b"".to_vec(), 1, VALUE_TYPE_STRING);
    assert!(m.get(b"k").unwrap().value.is_empty());
}

#[test]
fn binary_key_and_value() {
    let m = fresh();
    let key = vec![0x00, 0xFF, 0x80, 0x01];
    let val = vec![0xDE, 0xAD, 0xBE, 0xEF];
    m.put(key.clone(), val.clone(), 1, VALUE_TYPE_STRING);
    assert_eq!(m.get(&key).unwrap().value, val);
}

#[test]
fn large_value() {
    let m = fresh();
    let val = vec![b'x'; 1_000_000]; // 1 MB
    m.put(b"big".to_vec(), val.clone(), 1, VALUE_TYPE_STRING);
    assert_eq!(m.get(b"big").unwrap().value.len(), 1_000_000);
    assert_eq!(m.approx_size(), 3 + 1_000_000);
}

#[test]
fn seq_zero_is_valid() {
    let m = fresh();
    m.put(b"k".to_vec(), b"v".to_vec(), 0, VALUE_TYPE_STRING);
    assert_eq!(m.get(b"k").unwrap().seq, 0);
}

#[test]
fn delete_with_stale_seq_ignored() {
    let m = fresh();
    m.put(b"k1".to_vec(), b"v1".to_vec(), 5, VALUE_TYPE_STRING);
    m.delete(b"k1".to_vec(), 3);
    assert_eq!(m.get(b"k1").unwrap().value, b"v1");
}

#[test]
fn delete_nonexistent_key_creates_tombstone() {
    let m = fresh();
    m.delete(b"k".to_vec(), 1);
    assert_eq!(m.len(), 1);
    assert!(m.get(b"k").unwrap().is_tombstone());
}

#[test]
fn put_after_delete_with_higher_seq_resurrects_key() {
    let m = fresh();
    m.put(b"k".to_vec(), b"v1".to_vec(), 1, VALUE_TYPE_STRING);
    m.delete(b"k".to_vec(), 2);
    assert!(m.get(b"k").unwrap().is_tombstone());

    m.put(b"k".to_vec(), b"v2".to_vec(), 3, VALUE_TYPE_STRING);
    assert_eq!(m.get(b"k").unwrap().value, b"v2");
}

#[test]
fn put_after_delete_with_lower_seq_ignored() {
    let m = fresh();
    m.delete(b"k".to_vec(), 5);
    m.put(b"k".to_vec(), b"v".to_vec(), 3, VALUE_TYPE_STRING);
    assert!(m.get(b"k").unwrap().is_tombstone());
}

// -------------------- Rotation --------------------

#[test]
fn rotation_seals_active_and_publishes_once() {
    // threshold of 10 bytes; each key+value pair is ~10 bytes so the second
    // insert should trigger exactly one rotation.
    let m = Memtable::new(10, 4);
    let rx = m.rotation_receiver();

    m.put(b"key01".to_vec(), b"val01".to_vec(), 1, VALUE_TYPE_STRING);
    m.put(b"key02".to_vec(), b"val02".to_vec(), 2, VALUE_TYPE_STRING);

    let sealed = rx.try_recv().expect("expected a rotated segment");
    assert_eq!(sealed.len(), 1);
    assert!(rx.try_recv().is_err(), "expected exactly one rotation");

    // The entry survives via the immutable list even though it's no longer active.
    assert_eq!(m.get(b"key01").unwrap().value, b"val01");
    assert_eq!(m.get(b"key02").unwrap().value, b"val02");
}

#[test]
fn release_segment_removes_only_the_matching_immutable() {
    let m = Memtable::new(10, 4);
    let rx = m.rotation_receiver();

    m.put(b"key01".to_vec(), b"val01".to_vec(), 1, VALUE_TYPE_STRING);
    m.put(b"key02".to_vec(), b"val02".to_vec(), 2, VALUE_TYPE_STRING);
    let sealed = rx.try_recv().expect("expected a rotated segment");

    assert_eq!(m.get(b"key01").unwrap().value, b"val01");
    m.release_segment(&sealed);
    assert!(m.get(b"key01").is_none());
}

#[test]
fn force_rotate_seals_a_non_empty_active_segment() {
    let m = Memtable::new(4096, 4);
    let rx = m.rotation_receiver();
    m.put(b"key01".to_vec(), b"val01".to_vec(), 1, VALUE_TYPE_STRING);

    assert!(m.force_rotate());
    let sealed = rx.try_recv().expect("expected the forced rotation to publish a segment");
    assert_eq!(sealed.len(), 1);
}

#[test]
fn force_rotate_on_empty_active_segment_is_a_no_op() {
    let m = Memtable::new(4096, 4);
    let rx = m.rotation_receiver();

    assert!(!m.force_rotate());
    assert!(rx.try_recv().is_err());
}

#[test]
fn concurrent_writers_each_observe_exactly_one_rotation_per_crossing() {
    // Large enough channel buffer that no writer thread blocks mid-test on
    // back-pressure (nothing concurrently drains the rotation channel here).
    let m = Arc::new(Memtable::new(4096, 64));
    let rx = m.rotation_receiver();

    let mut handles = Vec::new();
    for t in 0..8u64 {
        let m = Arc::clone(&m);
        handles.push(thread::spawn(move || {
            for i in 0..200u64 {
                let seq = t * 1000 + i;
                let key = format!("k{:02}-{:04}", t, i).into_bytes();
                m.put(key, vec![b'x'; 16], seq, VALUE_TYPE_STRING);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(m.len(), 1600);

    let mut total_sealed = 0usize;
    while let Ok(seg) = rx.try_recv() {
        total_sealed += seg.len();
    }
    // every key is reachable through either the active segment or an
    // immutable, and the total count matches regardless of how many
    // rotations happened.
    assert_eq!(total_sealed + m.snapshot().len(), 1600);
}

use super::helpers::test_engine;
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn put_then_get_round_trips() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    let seq = engine.put_string(b"name".to_vec(), b"alice".to_vec())?;
    let (got_seq, val) = engine.get_string(b"name")?.unwrap();
    assert_eq!(got_seq, seq);
    assert_eq!(val, b"alice");
    Ok(())
}

#[test]
fn get_missing_key_returns_none() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());
    assert!(engine.get_string(b"nope")?.is_none());
    Ok(())
}

#[test]
fn delete_removes_key() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    engine.put_string(b"k".to_vec(), b"v".to_vec())?;
    assert!(engine.get_string(b"k")?.is_some());

    engine.delete(b"k".to_vec())?;
    assert!(engine.get_string(b"k")?.is_none());
    Ok(())
}

#[test]
fn overwrite_replaces_value_and_bumps_seq() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    let first = engine.put_string(b"k".to_vec(), b"v1".to_vec())?;
    let second = engine.put_string(b"k".to_vec(), b"v2".to_vec())?;
    assert!(second > first);

    let (seq, val) = engine.get_string(b"k")?.unwrap();
    assert_eq!(seq, second);
    assert_eq!(val, b"v2");
    Ok(())
}

#[test]
fn empty_key_is_rejected() {
    let dir = tempdir().unwrap();
    let engine = test_engine(dir.path());
    assert!(engine.put_string(Vec::new(), b"v".to_vec()).is_err());
    assert!(engine.delete(Vec::new()).is_err());
}

#[test]
fn oversized_key_is_rejected() {
    let dir = tempdir().unwrap();
    let engine = test_engine(dir.path());
    let huge_key = vec![b'k'; crate::MAX_KEY_SIZE + 1];
    assert!(engine.put_string(huge_key, b"v".to_vec()).is_err());
}

#[test]
fn oversized_value_is_rejected() {
    let dir = tempdir().unwrap();
    let engine = test_engine(dir.path());
    let huge_value = vec![0u8; crate::MAX_VALUE_SIZE + 1];
    assert!(engine.put_string(b"k".to_vec(), huge_value).is_err());
}

#[test]
fn sequence_numbers_are_strictly_increasing_across_writes() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    let mut last = 0;
    for i in 0..50 {
        let key = format!("k{i}").into_bytes();
        let seq = engine.put_string(key, b"v".to_vec())?;
        assert!(seq > last);
        last = seq;
    }
    assert_eq!(engine.seq(), last);
    Ok(())
}

#[test]
fn force_flush_is_a_no_op_on_an_empty_engine() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());
    engine.force_flush()?;
    assert_eq!(engine.memtable_entries(), 0);
    Ok(())
}

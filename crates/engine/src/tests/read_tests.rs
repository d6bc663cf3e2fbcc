use super::helpers::{test_engine, wait_until};
use anyhow::Result;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn scan_returns_live_keys_in_ascending_order() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    engine.put_string(b"b".to_vec(), b"2".to_vec())?;
    engine.put_string(b"a".to_vec(), b"1".to_vec())?;
    engine.put_string(b"c".to_vec(), b"3".to_vec())?;

    let got = engine.scan(b"", b"")?;
    assert_eq!(
        got,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ]
    );
    Ok(())
}

#[test]
fn scan_respects_start_and_end_bounds() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    for k in ["a", "b", "c", "d"] {
        engine.put_string(k.as_bytes().to_vec(), k.as_bytes().to_vec())?;
    }

    let got = engine.scan(b"b", b"d")?;
    assert_eq!(
        got,
        vec![(b"b".to_vec(), b"b".to_vec()), (b"c".to_vec(), b"c".to_vec())]
    );
    Ok(())
}

#[test]
fn scan_filters_tombstones() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    engine.put_string(b"a".to_vec(), b"1".to_vec())?;
    engine.put_string(b"b".to_vec(), b"2".to_vec())?;
    engine.delete(b"a".to_vec())?;

    let got = engine.scan(b"", b"")?;
    assert_eq!(got, vec![(b"b".to_vec(), b"2".to_vec())]);
    Ok(())
}

#[test]
fn get_after_flush_still_finds_the_value() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    // flush_threshold is 64 bytes in the test engine; a handful of writes
    // rotates the active segment and the background flusher picks it up.
    for i in 0..20 {
        let key = format!("key-{i:03}").into_bytes();
        engine.put_string(key, b"some value padding".to_vec())?;
    }

    wait_until(Duration::from_secs(5), || engine.sstable_count() > 0);

    for i in 0..20 {
        let key = format!("key-{i:03}").into_bytes();
        let (_, val) = engine.get_string(&key)?.expect("flushed key should still be readable");
        assert_eq!(val, b"some value padding");
    }
    Ok(())
}

#[test]
fn delete_after_flush_shadows_the_flushed_value() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    for i in 0..20 {
        let key = format!("key-{i:03}").into_bytes();
        engine.put_string(key, b"some value padding".to_vec())?;
    }
    wait_until(Duration::from_secs(5), || engine.sstable_count() > 0);

    engine.delete(b"key-005".to_vec())?;
    assert!(engine.get_string(b"key-005")?.is_none());
    Ok(())
}

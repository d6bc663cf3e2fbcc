use super::helpers::{test_engine, wait_until};
use anyhow::Result;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn writes_past_the_flush_threshold_land_in_level_zero() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    for i in 0..30 {
        let key = format!("flush-key-{i:03}").into_bytes();
        engine.put_string(key, b"enough bytes to cross the tiny test threshold".to_vec())?;
    }

    wait_until(Duration::from_secs(5), || engine.sstable_count_at(0) > 0);
    assert!(engine.sstable_count_at(0) > 0);
    Ok(())
}

#[test]
fn force_flush_seals_the_active_segment_even_under_threshold() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    engine.put_string(b"only-one-key".to_vec(), b"v".to_vec())?;
    assert_eq!(engine.sstable_count(), 0);

    engine.force_flush()?;
    wait_until(Duration::from_secs(5), || engine.sstable_count_at(0) > 0);

    let (_, val) = engine.get_string(b"only-one-key")?.expect("value should survive the flush");
    assert_eq!(val, b"v");
    Ok(())
}

#[test]
fn reads_stay_consistent_while_a_flush_is_in_flight() -> Result<()> {
    let dir = tempdir()?;
    let engine = test_engine(dir.path());

    for i in 0..40 {
        let key = format!("race-key-{i:03}").into_bytes();
        let value = format!("value-{i}").into_bytes();
        engine.put_string(key, value)?;
    }

    for i in 0..40 {
        let key = format!("race-key-{i:03}").into_bytes();
        let expect = format!("value-{i}").into_bytes();
        let (_, val) = engine.get_string(&key)?.expect("key must be visible regardless of flush progress");
        assert_eq!(val, expect);
    }

    wait_until(Duration::from_secs(5), || engine.sstable_count() > 0);

    for i in 0..40 {
        let key = format!("race-key-{i:03}").into_bytes();
        let expect = format!("value-{i}").into_bytes();
        let (_, val) = engine.get_string(&key)?.expect("key must remain visible once flushed");
        assert_eq!(val, expect);
    }
    Ok(())
}

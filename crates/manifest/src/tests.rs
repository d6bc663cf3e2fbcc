use super::*;
use tempfile::tempdir;

fn table(id: u64, level: u32) -> TableInfo {
    TableInfo {
        id,
        file_path: format!("sst-{id:020}.sst"),
        level,
        size: 1024,
    }
}

#[test]
fn load_missing_manifest_starts_empty() -> Result<()> {
    let dir = tempdir()?;
    let m = Manifest::load(dir.path())?;
    assert_eq!(m.persistent_id(), 0);
    assert_eq!(m.levels().count(), 0);
    Ok(())
}

#[test]
fn next_table_id_increments_and_persists() -> Result<()> {
    let dir = tempdir()?;
    let mut m = Manifest::load(dir.path())?;
    assert_eq!(m.next_table_id()?, 0);
    assert_eq!(m.next_table_id()?, 1);

    let reloaded = Manifest::load(dir.path())?;
    assert_eq!(reloaded.doc.next_table_id, 2);
    Ok(())
}

#[test]
fn add_table_is_visible_after_reload() -> Result<()> {
    let dir = tempdir()?;
    let mut m = Manifest::load(dir.path())?;
    m.add_table(table(0, 0))?;
    m.add_table(table(1, 0))?;
    m.add_table(table(2, 1))?;

    let reloaded = Manifest::load(dir.path())?;
    assert_eq!(reloaded.tables_at(0).len(), 2);
    assert_eq!(reloaded.tables_at(1).len(), 1);
    assert_eq!(reloaded.tables_at(0)[0].id, 0);
    Ok(())
}

#[test]
fn remove_tables_clears_empty_levels() -> Result<()> {
    let dir = tempdir()?;
    let mut m = Manifest::load(dir.path())?;
    m.add_table(table(0, 0))?;
    m.remove_tables(&[0])?;
    assert_eq!(m.tables_at(0).len(), 0);
    assert_eq!(m.levels().count(), 0);
    Ok(())
}

#[test]
fn compact_levels_replaces_inputs_with_merged_output() -> Result<()> {
    let dir = tempdir()?;
    let mut m = Manifest::load(dir.path())?;
    m.add_table(table(0, 0))?;
    m.add_table(table(1, 0))?;
    m.add_table(table(2, 1))?;

    m.compact_levels(&[0, 1, 2], 1, vec![table(3, 1)])?;

    assert_eq!(m.tables_at(0).len(), 0);
    assert_eq!(m.tables_at(1).len(), 1);
    assert_eq!(m.tables_at(1)[0].id, 3);
    Ok(())
}

#[test]
fn persistent_id_round_trips() -> Result<()> {
    let dir = tempdir()?;
    let mut m = Manifest::load(dir.path())?;
    m.set_persistent_id(42)?;
    let reloaded = Manifest::load(dir.path())?;
    assert_eq!(reloaded.persistent_id(), 42);
    Ok(())
}

#[test]
fn corrupt_manifest_file_fails_to_load() -> Result<()> {
    let dir = tempdir()?;
    std::fs::write(dir.path().join(MANIFEST_FILENAME), b"not json")?;
    assert!(Manifest::load(dir.path()).is_err());
    Ok(())
}

#[test]
fn save_uses_atomic_rename_not_tmp_leftover() -> Result<()> {
    let dir = tempdir()?;
    let mut m = Manifest::load(dir.path())?;
    m.add_table(table(0, 0))?;
    assert!(!dir.path().join("MANIFEST.json.tmp").exists());
    assert!(dir.path().join(MANIFEST_FILENAME).exists());
    Ok(())
}

//! Cold-start recovery: replay the journal into a fresh memtable, load every
//! table the manifest knows about into the level manager, and clean up
//! files left behind by an interrupted flush or compaction.

use anyhow::Result;
use manifest::Manifest;
use memtable::Memtable;
use meta::VALUE_TYPE_STRING;
use sstable::SSTableReader;
use std::path::Path;
use wal::{WalReader, WalRecord};

use crate::level::LevelManager;

/// Replays a journal file into `mem`, returning the highest sequence number
/// encountered. Returns `Ok(0)` if the journal does not exist yet (fresh
/// start). Replays the entire journal (`from_exclusive = 0`) — there is no
/// checkpoint to resume from since nothing truncates the journal yet.
pub(crate) fn replay_wal_and_build<P: AsRef<Path>>(path: P, mem: &Memtable) -> Result<u64> {
    match WalReader::open(path.as_ref()) {
        Ok(mut reader) => {
            let mut max_seq = 0u64;
            reader.replay(0, |r| match r {
                WalRecord::Put { seq, key, value } => {
                    mem.put(key, value, seq, VALUE_TYPE_STRING);
                    max_seq = max_seq.max(seq);
                }
                WalRecord::Del { seq, key } => {
                    mem.delete(key, seq);
                    max_seq = max_seq.max(seq);
                }
            })?;
            Ok(max_seq)
        }
        Err(e) => {
            if matches!(e, wal::WalError::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
            {
                Ok(0)
            } else {
                Err(anyhow::anyhow!(e).context("failed to open journal for replay"))
            }
        }
    }
}

/// Opens every table the manifest knows about and registers it with
/// `levels`, oldest-added first per level so the newest-first invariant the
/// level manager relies on for L0 lookups comes out right. Returns the
/// highest `max_seq` observed across the loaded tables.
pub(crate) fn load_tables_from_manifest(
    manifest: &Manifest,
    sst_dir: &Path,
    levels: &LevelManager,
    cache_capacity: usize,
) -> Result<u64> {
    let mut max_seq = 0u64;
    for level in manifest.levels() {
        for info in manifest.tables_at(level) {
            let path = sst_dir.join(&info.file_path);
            let reader = SSTableReader::open_with_cache(&path, cache_capacity)?;
            max_seq = max_seq.max(reader.max_seq());
            levels.add_table(level, info.id, reader);
        }
    }
    Ok(max_seq)
}

/// Deletes leftover `.sst.tmp` table files and their `.sst.tmp.bloom`
/// sidecars from a flush or compaction interrupted mid-write.
pub(crate) fn cleanup_tmp_files(sst_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(sst_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let p = entry.path();
        if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(".sst.tmp") || name.ends_with(".sst.tmp.bloom") {
                let _ = std::fs::remove_file(&p);
            }
        }
    }
}

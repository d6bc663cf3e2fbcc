//! Compaction: merges a level that has grown past its capacity together
//! with the level directly below it, producing a single fresh table one
//! level down.
//!
//! Uses [`MergeIterator`] for sorted, deduplicated streaming across the
//! tables being merged. Tombstone GC only runs when no level deeper than
//! the merge target is currently populated — dropping a tombstone earlier
//! could un-shadow a value a level left untouched still holds. A tombstone
//! is kept regardless if the memtable still references the key, since the
//! memtable itself is never part of a compaction.
//!
//! If the table write or the manifest commit fails partway through, the
//! tables already pulled out of the level manager are not put back — the
//! manifest was never mutated (it's the last step on success), so they're
//! still intact on disk and reappear correctly the next time the engine
//! starts from that manifest. The current process simply stops seeing them
//! until then.

use anyhow::Result;
use manifest::TableInfo;
use sstable::{MergeIterator, Record, SSTableReader, SSTableWriter};

use crate::level::LevelTable;
use crate::Engine;

impl Engine {
    /// Compacts the lowest level that has grown past its capacity together
    /// with the level below it. A no-op if no level is over capacity.
    pub fn compact(&self) -> Result<()> {
        let Some(level) = self.level_needing_compaction() else {
            return Ok(());
        };
        self.compact_pair(level, level + 1)
    }

    fn level_needing_compaction(&self) -> Option<u32> {
        self.levels
            .populated_levels()
            .into_iter()
            .find(|&level| self.levels.count_at(level) as u64 > self.levels.capacity(level))
    }

    fn compact_pair(&self, from_level: u32, into_level: u32) -> Result<()> {
        let deeper_levels_populated = self
            .levels
            .populated_levels()
            .into_iter()
            .any(|l| l > into_level);

        let from_tables = self.levels.take_levels(&[from_level]);
        let into_tables = self.levels.take_levels(&[into_level]);
        let total = from_tables.len() + into_tables.len();
        if total <= 1 {
            self.levels.replace_levels(&[], from_level, from_tables);
            self.levels.replace_levels(&[], into_level, into_tables);
            return Ok(());
        }

        let mut taken: Vec<LevelTable> = Vec::with_capacity(total);
        taken.extend(from_tables);
        taken.extend(into_tables);

        let old_ids: Vec<u64> = taken.iter().map(|t| t.id).collect();
        let readers: Vec<SSTableReader> = taken.into_iter().map(|t| t.reader).collect();
        let old_paths: Vec<std::path::PathBuf> =
            readers.iter().map(|r| r.file_path().to_path_buf()).collect();
        let estimated_count: usize = readers.iter().map(|r| r.len()).sum();

        let mut merge = MergeIterator::new(&readers)?;
        let mem = &self.mem;
        let drop_tombstones = !deeper_levels_populated;
        let mut merge_error: Option<anyhow::Error> = None;

        let streaming = std::iter::from_fn(|| loop {
            match merge.next_entry() {
                Ok(Some((key, rec))) => {
                    if rec.meta.is_delete() && drop_tombstones && mem.get(&key).is_none() {
                        continue;
                    }
                    return Some(Record {
                        key,
                        value: rec.value,
                        seq: rec.seq,
                        meta: rec.meta,
                    });
                }
                Ok(None) => return None,
                Err(e) => {
                    merge_error = Some(e);
                    return None;
                }
            }
        });

        let table_id = self.manifest.lock().unwrap().next_table_id()?;
        let file_name = format!("L{into_level}_{table_id:020}.sst");
        let path = self.sst_dir.join(&file_name);

        let write_result =
            SSTableWriter::write(&path, estimated_count, self.bloom_fp_rate, streaming);

        if let Some(e) = merge_error {
            let _ = std::fs::remove_file(path.with_extension("sst.tmp"));
            return Err(e);
        }
        let table_meta = write_result?;

        self.manifest.lock().unwrap().compact_levels(
            &old_ids,
            into_level,
            vec![TableInfo {
                id: table_id,
                file_path: file_name,
                level: into_level,
                size: table_meta.file_size,
            }],
        )?;

        // Safe to delete the merged-away files now that the manifest commit
        // above durably points only at the new table.
        drop(readers);
        for old_path in &old_paths {
            let _ = std::fs::remove_file(old_path);
            let mut bloom_path = old_path.as_os_str().to_owned();
            bloom_path.push(".bloom");
            let _ = std::fs::remove_file(std::path::PathBuf::from(bloom_path));
        }

        let reader = SSTableReader::open_with_cache(&path, self.cache_capacity)?;
        self.levels
            .replace_levels(&[], into_level, vec![LevelTable { id: table_id, reader }]);

        Ok(())
    }
}

//! Multi-level table manager.
//!
//! Tables are grouped into numbered levels. Level 0 holds freshly flushed
//! tables and may have overlapping key ranges; each level beyond that is
//! produced by compaction and has a capacity of `size_multiplier *
//! 4^level` tables, growing geometrically so higher levels hold
//! exponentially more data before they, too, need compacting.
//!
//! A single [`RwLock`] protects the level map: `add_table` takes the write
//! lock only long enough to push a reader into a level's `Vec`; `get` takes
//! the read lock for the duration of a lookup, newest level-0 table first,
//! then ascending through the rest, and short-circuits per table on the
//! bloom filter. Each table is tracked alongside its manifest id so
//! compaction can tell the manifest exactly which entries it replaced.

use sstable::SSTableReader;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Geometric growth factor between adjacent level capacities.
const LEVEL_FANOUT: u64 = 4;

/// A table reader paired with the manifest id that identifies it.
pub struct LevelTable {
    pub id: u64,
    pub reader: SSTableReader,
}

pub struct LevelManager {
    levels: RwLock<BTreeMap<u32, Vec<LevelTable>>>,
    size_multiplier: u64,
}

impl LevelManager {
    pub fn new(size_multiplier: u64) -> Self {
        Self {
            levels: RwLock::new(BTreeMap::new()),
            size_multiplier: size_multiplier.max(1),
        }
    }

    /// Table-count capacity of `level` before it should be compacted down.
    pub fn capacity(&self, level: u32) -> u64 {
        self.size_multiplier * LEVEL_FANOUT.saturating_pow(level)
    }

    /// Registers a freshly opened table reader at `level`, newest-first.
    pub fn add_table(&self, level: u32, id: u64, reader: SSTableReader) {
        let mut levels = self.levels.write().unwrap();
        levels
            .entry(level)
            .or_default()
            .insert(0, LevelTable { id, reader });
    }

    /// Removes and returns every table at each of `levels_to_take`, in the
    /// order given, leaving every other level untouched.
    pub fn take_levels(&self, levels_to_take: &[u32]) -> Vec<LevelTable> {
        let mut guard = self.levels.write().unwrap();
        let mut out = Vec::new();
        for level in levels_to_take {
            if let Some(tables) = guard.remove(level) {
                out.extend(tables);
            }
        }
        out
    }

    /// Replaces every table in `levels_to_clear` with `merged`, newest-first,
    /// at `into_level`. Used after compaction collapses a pair of levels'
    /// tables into one freshly-written set.
    pub fn replace_levels(&self, levels_to_clear: &[u32], into_level: u32, merged: Vec<LevelTable>) {
        let mut guard = self.levels.write().unwrap();
        for level in levels_to_clear {
            guard.remove(level);
        }
        if !merged.is_empty() {
            guard.insert(into_level, merged);
        }
    }

    /// Point lookup across every level, level 0 (newest-first) through the
    /// highest populated level. The bloom filter of each table is checked
    /// before reading its block index, so tables that can't contain `key`
    /// never touch disk beyond the bloom probe.
    pub fn get(&self, key: &[u8]) -> anyhow::Result<Option<sstable::Record>> {
        let levels = self.levels.read().unwrap();
        for (_level, tables) in levels.iter() {
            for table in tables {
                if !table.reader.may_contain(key) {
                    continue;
                }
                if let Some(rec) = table.reader.get(key)? {
                    return Ok(Some(rec));
                }
            }
        }
        Ok(None)
    }

    /// Every table across every level.
    pub fn table_count(&self) -> usize {
        self.levels.read().unwrap().values().map(|v| v.len()).sum()
    }

    pub fn count_at(&self, level: u32) -> usize {
        self.levels
            .read()
            .unwrap()
            .get(&level)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Populated level numbers, ascending.
    pub fn populated_levels(&self) -> Vec<u32> {
        self.levels.read().unwrap().keys().copied().collect()
    }

    /// Snapshot of every key visible across every level (debug/scan use
    /// only), newest table's value winning on duplicates.
    pub fn merged_keys(&self) -> anyhow::Result<Vec<Vec<u8>>> {
        use std::collections::BTreeSet;
        let levels = self.levels.read().unwrap();
        let mut keys = BTreeSet::new();
        for tables in levels.values() {
            for table in tables {
                keys.extend(table.reader.keys()?);
            }
        }
        Ok(keys.into_iter().collect())
    }

    /// Takes every table reader out of the manager, across all levels. The
    /// manager is left empty until `replace_levels` (or further `add_table`
    /// calls) repopulate it.
    pub fn drain_all(&self) -> Vec<(u32, Vec<LevelTable>)> {
        let mut guard = self.levels.write().unwrap();
        std::mem::take(&mut *guard).into_iter().collect()
    }
}

#[cfg(test)]
mod tests;

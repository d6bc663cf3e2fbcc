//! # Manifest
//!
//! Durable catalog of sorted tables and the monotone table-id allocator.
//!
//! The manifest is a single JSON document at a well-known path inside the
//! data root. It records, per level, which table files exist and how big
//! they are, plus the next table id to hand out and the highest
//! sequence number known to be durable across a full flush+manifest commit
//! (`persistent_id`).
//!
//! Every mutation ([`Manifest::add_table`], [`Manifest::remove_table`],
//! [`Manifest::compact_levels`], [`Manifest::next_table_id`]) is followed by
//! a full rewrite of the document; the rewrite is atomic against crashes —
//! write to a `.tmp` file, fsync, rename over the target, fsync the parent
//! directory — the same discipline the sorted-table writer uses.
//!
//! Invariant upheld by callers, not enforced here: every persisted
//! `TableInfo` must point at an existing, fully-written table file, and the
//! manifest is written only after that file has been flushed to disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Filename of the manifest document within the data root.
pub const MANIFEST_FILENAME: &str = "MANIFEST.json";

/// One table's catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: u64,
    pub file_path: String,
    pub level: u32,
    pub size: u64,
}

/// The on-disk document shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    next_table_id: u64,
    levels: BTreeMap<u32, Vec<TableInfo>>,
    persistent_id: u64,
}

/// In-memory manifest, backed by a JSON document on disk.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    doc: Document,
}

impl Manifest {
    /// Loads the manifest from `data_root/MANIFEST.json`, or starts empty if
    /// the file does not exist.
    pub fn load(data_root: &Path) -> Result<Self> {
        let path = data_root.join(MANIFEST_FILENAME);
        let doc = if path.exists() {
            let bytes = fs::read(&path)
                .with_context(|| format!("failed to read manifest at {}", path.display()))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("failed to parse manifest at {}", path.display()))?
        } else {
            Document::default()
        };
        Ok(Self { path, doc })
    }

    /// Tables registered at `level`, in the order they were added.
    pub fn tables_at(&self, level: u32) -> &[TableInfo] {
        self.doc
            .levels
            .get(&level)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All levels that currently have at least one table, ascending.
    pub fn levels(&self) -> impl Iterator<Item = u32> + '_ {
        self.doc.levels.keys().copied()
    }

    pub fn persistent_id(&self) -> u64 {
        self.doc.persistent_id
    }

    pub fn set_persistent_id(&mut self, id: u64) -> Result<()> {
        self.doc.persistent_id = id;
        self.save()
    }

    /// Returns the next table id, then increments the allocator and
    /// durably commits the new value.
    pub fn next_table_id(&mut self) -> Result<u64> {
        let id = self.doc.next_table_id;
        self.doc.next_table_id += 1;
        self.save()?;
        Ok(id)
    }

    /// Registers a newly-flushed or newly-compacted table at `level`.
    ///
    /// Callers must only call this after the table file itself is fully
    /// written and fsynced — the manifest records facts about files that
    /// already exist.
    pub fn add_table(&mut self, info: TableInfo) -> Result<()> {
        self.doc.levels.entry(info.level).or_default().push(info);
        self.save()
    }

    /// Removes table entries matching `ids` from every level.
    pub fn remove_tables(&mut self, ids: &[u64]) -> Result<()> {
        for tables in self.doc.levels.values_mut() {
            tables.retain(|t| !ids.contains(&t.id));
        }
        self.doc.levels.retain(|_, tables| !tables.is_empty());
        self.save()
    }

    /// Replaces the tables named by `old_ids` (drawn from `from_level` and
    /// `into_level`) with the freshly-written `merged` tables registered at
    /// `into_level`. Used by compaction to publish its output atomically
    /// alongside removing its inputs.
    pub fn compact_levels(
        &mut self,
        old_ids: &[u64],
        into_level: u32,
        merged: Vec<TableInfo>,
    ) -> Result<()> {
        for tables in self.doc.levels.values_mut() {
            tables.retain(|t| !old_ids.contains(&t.id));
        }
        self.doc.levels.retain(|_, tables| !tables.is_empty());
        self.doc.levels.entry(into_level).or_default().extend(merged);
        self.save()
    }

    /// Atomically rewrites the manifest document: temp file, fsync, rename,
    /// then fsync the parent directory so the rename itself survives a
    /// crash.
    fn save(&self) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to create manifest tmp at {}", tmp_path.display()))?;
            let bytes = serde_json::to_vec_pretty(&self.doc)?;
            f.write_all(&bytes)?;
            f.flush()?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename manifest into place at {}", self.path.display()))?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;

use crate::format::{self, IndexEntry, Record, RECORDS_PER_BLOCK};
use anyhow::Result;
use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

/// Metadata handed back to the caller after a successful write, so the
/// level manager/manifest can record it without reopening the file.
#[derive(Debug, Clone, Copy)]
pub struct TableMeta {
    pub max_seq: u64,
    pub file_size: u64,
    pub entry_count: usize,
}

fn bloom_sidecar_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".bloom");
    PathBuf::from(s)
}

/// Writes an immutable sorted table file (plus its bloom-filter sidecar) at
/// `path`. Crash-safe: both files are built under a `.tmp` suffix, fsynced,
/// then atomically renamed into place; the parent directory is fsynced last
/// so the rename itself survives a crash.
pub struct SSTableWriter;

impl SSTableWriter {
    /// Writes a table from a sorted, deduplicated iterator of records.
    ///
    /// * `expected_count` — estimated entry count, used to size the bloom
    ///   filter. Over-estimating is safe; under-estimating only raises the
    ///   false-positive rate.
    /// * `fp_rate` — target bloom filter false-positive rate.
    pub fn write<I>(path: &Path, expected_count: usize, fp_rate: f64, records: I) -> Result<TableMeta>
    where
        I: Iterator<Item = Record>,
    {
        let tmp_path = path.with_extension("sst.tmp");
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        let mut file = BufWriter::new(raw_file);

        let mut bloom = BloomFilter::new(expected_count.max(1), fp_rate);
        let mut index: Vec<IndexEntry> = Vec::new();
        let mut max_seq: u64 = 0;
        let mut entry_count = 0usize;

        let mut block_start: Option<u64> = None;
        let mut block_first_key: Vec<u8> = Vec::new();
        let mut block_count = 0usize;
        let mut block_index = 0u32;

        for rec in records {
            let pos = file.stream_position()?;
            if block_start.is_none() {
                block_start = Some(pos);
                block_first_key = rec.key.clone();
            }

            max_seq = max_seq.max(rec.seq);
            bloom.insert(&rec.key);
            format::write_record(&mut file, &rec)?;
            entry_count += 1;
            block_count += 1;

            if block_count >= RECORDS_PER_BLOCK {
                let end = file.stream_position()?;
                let start = block_start.take().unwrap();
                index.push(IndexEntry {
                    first_key: std::mem::take(&mut block_first_key),
                    block_offset: start,
                    block_size: (end - start) as u32,
                    block_index,
                });
                block_index += 1;
                block_count = 0;
            }
        }

        // Flush a trailing partial block.
        if let Some(start) = block_start {
            let end = file.stream_position()?;
            index.push(IndexEntry {
                first_key: block_first_key,
                block_offset: start,
                block_size: (end - start) as u32,
                block_index,
            });
        }

        if entry_count == 0 {
            drop(file);
            let _ = std::fs::remove_file(&tmp_path);
            anyhow::bail!("refusing to write an empty sorted table (no entries)");
        }

        let index_offset = file.stream_position()?;
        for entry in &index {
            format::write_index_entry(&mut file, entry)?;
        }
        let index_size = (file.stream_position()? - index_offset) as u32;
        file.write_u32::<LittleEndian>(index_size)?;

        file.flush()?;
        let inner: File = file.into_inner()?;
        inner.sync_all()?;
        let file_size = inner.metadata()?.len();
        drop(inner);
        rename(&tmp_path, path)?;

        let bloom_tmp = {
            let mut s = tmp_path.as_os_str().to_owned();
            s.push(".bloom");
            PathBuf::from(s)
        };
        {
            let bloom_file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&bloom_tmp)?;
            let mut w = BufWriter::new(bloom_file);
            bloom.write_to(&mut w)?;
            w.flush()?;
            w.into_inner()?.sync_all()?;
        }
        rename(&bloom_tmp, bloom_sidecar_path(path))?;

        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(TableMeta {
            max_seq,
            file_size,
            entry_count,
        })
    }
}

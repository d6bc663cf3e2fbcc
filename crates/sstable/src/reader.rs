use crate::format::{self, IndexEntry, Record, TRAILER_BYTES};
use anyhow::{bail, Result};
use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt};
use lru::LruCache;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

fn bloom_sidecar_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".bloom");
    PathBuf::from(s)
}

/// Reads a sorted table file for point lookups and full scans.
///
/// [`open`](SSTableReader::open) loads the trailing block index into memory
/// and, if a `.bloom` sidecar exists next to the file, the bloom filter too.
/// Point lookups binary-search the index on block-first-keys and read only
/// the matching block — never the whole file.
pub struct SSTableReader {
    path: PathBuf,
    index: Vec<IndexEntry>,
    bloom: Option<BloomFilter>,
    file: Mutex<BufReader<File>>,
    max_seq: u64,
    entry_count: usize,
    file_size: u64,
    data_end: u64,
    /// Decoded block bytes keyed by their file offset. `None` when the
    /// table was opened without a cache (`open`) — every `get` then always
    /// reads its block straight from disk, same as before the cache existed.
    block_cache: Option<Mutex<LruCache<u64, Arc<Vec<u8>>>>>,
}

impl SSTableReader {
    /// Opens a table file, loading its index (and bloom filter, if the
    /// sidecar is present). No block cache — every lookup reads its block
    /// from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_cache(path, 0)
    }

    /// As [`open`](Self::open), but with an LRU cache of up to
    /// `cache_capacity` decoded blocks. `0` disables the cache entirely.
    pub fn open_with_cache<P: AsRef<Path>>(path: P, cache_capacity: usize) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let mut f = File::open(&path_buf)?;
        let file_size = f.metadata()?.len();

        if file_size < TRAILER_BYTES {
            bail!("sorted table file too small");
        }

        f.seek(SeekFrom::End(-(TRAILER_BYTES as i64)))?;
        let index_size = f.read_u32::<LittleEndian>()? as u64;
        let trailer_pos = file_size - TRAILER_BYTES;
        if index_size > trailer_pos {
            bail!("corrupt sorted table: index_size exceeds file size");
        }
        let index_offset = trailer_pos - index_size;

        f.seek(SeekFrom::Start(index_offset))?;
        let mut index = Vec::new();
        while f.stream_position()? < trailer_pos {
            index.push(format::read_index_entry(&mut f)?);
        }
        let data_end = index
            .iter()
            .map(|e| e.block_offset + e.block_size as u64)
            .max()
            .unwrap_or(0);

        let bloom = match File::open(bloom_sidecar_path(&path_buf)) {
            Ok(bloom_file) => Some(BloomFilter::read_from(&mut BufReader::new(bloom_file))?),
            Err(_) => None,
        };

        // The bit-exact layout carries no footer field for max_seq/entry
        // count; recover both with one sequential scan over the data
        // section, mirroring the teacher's legacy no-footer-metadata
        // recovery path.
        f.seek(SeekFrom::Start(0))?;
        let mut max_seq = 0u64;
        let mut entry_count = 0usize;
        {
            let mut scan = BufReader::new(&f);
            loop {
                if scan.stream_position()? >= data_end {
                    break;
                }
                match format::read_record(&mut scan)? {
                    Some(rec) => {
                        max_seq = max_seq.max(rec.seq);
                        entry_count += 1;
                    }
                    None => break,
                }
            }
        }

        f.seek(SeekFrom::Start(0))?;

        let block_cache = NonZeroUsize::new(cache_capacity).map(|cap| Mutex::new(LruCache::new(cap)));

        Ok(Self {
            path: path_buf,
            index,
            bloom,
            file: Mutex::new(BufReader::new(f)),
            max_seq,
            entry_count,
            file_size,
            data_end,
            block_cache,
        })
    }

    /// Bloom filter probe: conservative, false positives allowed, false
    /// negatives forbidden. Tables without a sidecar bloom always answer
    /// `true` (never short-circuits).
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.bloom.as_ref().map_or(true, |b| b.may_contain(key))
    }

    fn block_for_key(&self, key: &[u8]) -> Option<&IndexEntry> {
        // Index is sorted ascending by first_key (blocks were written in key
        // order). Find the last block whose first_key <= key.
        match self
            .index
            .binary_search_by(|entry| entry.first_key.as_slice().cmp(key))
        {
            Ok(i) => Some(&self.index[i]),
            Err(0) => None,
            Err(i) => Some(&self.index[i - 1]),
        }
    }

    /// Point lookup. The bloom filter is checked first; on a possible hit the
    /// candidate block (found via binary search on the index) is read and
    /// scanned until the key matches or the block is exhausted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        if !self.may_contain(key) {
            return Ok(None);
        }
        let entry = match self.block_for_key(key) {
            Some(e) => e,
            None => return Ok(None),
        };
        let block_offset = entry.block_offset;

        let block = self.read_block(block_offset, entry.block_size as usize)?;

        let mut cursor = Cursor::new(block.as_slice());
        while let Some(rec) = format::read_record(&mut cursor)? {
            match rec.key.as_slice().cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(rec)),
                std::cmp::Ordering::Greater => return Ok(None),
                std::cmp::Ordering::Less => continue,
            }
        }
        Ok(None)
    }

    /// Returns the raw bytes of the block at `offset`, consulting (and
    /// populating) the block cache when one is configured.
    fn read_block(&self, offset: u64, size: usize) -> Result<Arc<Vec<u8>>> {
        if let Some(cache) = &self.block_cache {
            let mut cache = cache.lock().map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
            if let Some(block) = cache.get(&offset) {
                return Ok(Arc::clone(block));
            }
        }

        let mut buf = vec![0u8; size];
        {
            let mut f = self
                .file
                .lock()
                .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
            f.seek(SeekFrom::Start(offset))?;
            f.read_exact(&mut buf)?;
        }
        let block = Arc::new(buf);

        if let Some(cache) = &self.block_cache {
            let mut cache = cache.lock().map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
            cache.put(offset, Arc::clone(&block));
        }

        Ok(block)
    }

    /// Sequential iterator over every record in ascending key order, for
    /// compaction's merge pass.
    pub fn iter_records(&self) -> Result<Vec<Record>> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
        f.seek(SeekFrom::Start(0))?;
        let mut out = Vec::with_capacity(self.entry_count);
        loop {
            if f.stream_position()? >= self.data_end {
                break;
            }
            match format::read_record(&mut *f)? {
                Some(rec) => out.push(rec),
                None => break,
            }
        }
        Ok(out)
    }

    pub fn approximate_size(&self) -> u64 {
        self.file_size
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn has_bloom(&self) -> bool {
        self.bloom.is_some()
    }

    pub fn max_seq(&self) -> u64 {
        self.max_seq
    }

    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// All keys in ascending order (debug/scan use only).
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.iter_records()?.into_iter().map(|r| r.key).collect())
    }
}

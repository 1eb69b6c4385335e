//! Cache Journal Module
//!
//! Append-only JSON-lines backing store for a result cache.
//!
//! Every store appends an `upsert` record and every eviction an `evict`
//! record. Opening replays the file; closing rewrites it as a compact
//! snapshot of the live entries.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::CacheEntry;
use crate::error::Result;
use crate::models::{GeocodeMode, Key};

// == Journal Records ==
/// One replayable line of the journal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum JournalRecord {
    Upsert(CacheEntry),
    Evict { key: Key },
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum RecordRef<'a> {
    Upsert(&'a CacheEntry),
    Evict { key: &'a Key },
}

// == Cache Journal ==
#[derive(Debug)]
pub struct CacheJournal {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Lines in the file since it was last compacted
    records: usize,
}

/// Journals shorter than this are never compacted early.
pub const COMPACTION_FLOOR: usize = 1024;

impl CacheJournal {
    /// Journal file used for `mode` under the cache directory.
    pub fn path_for(dir: &Path, mode: GeocodeMode) -> PathBuf {
        dir.join(format!("{}.jsonl", mode))
    }

    // == Open ==
    /// Opens (creating if needed) the journal for `mode` and returns the
    /// records it already holds, in file order.
    pub fn open(dir: &Path, mode: GeocodeMode) -> Result<(Self, Vec<JournalRecord>)> {
        fs::create_dir_all(dir)?;
        let path = Self::path_for(dir, mode);

        let records = if path.exists() {
            read_records(&path)?
        } else {
            Vec::new()
        };

        let writer = open_append(&path)?;
        let journal = Self {
            path,
            writer,
            records: records.len(),
        };
        Ok((journal, records))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Append ==
    pub fn append_upsert(&mut self, entry: &CacheEntry) -> Result<()> {
        self.append(&RecordRef::Upsert(entry))
    }

    pub fn append_evict(&mut self, key: &Key) -> Result<()> {
        self.append(&RecordRef::Evict { key })
    }

    fn append(&mut self, record: &RecordRef<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    /// Lines written since the last compaction, counting those replayed at
    /// open.
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// True once the file holds more than twice as many lines as there are
    /// `live` entries, past [`COMPACTION_FLOOR`].
    pub fn needs_compaction(&self, live: usize) -> bool {
        self.records > COMPACTION_FLOOR.max(live.saturating_mul(2))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    // == Compact ==
    /// Replaces the journal with one `upsert` line per live entry.
    ///
    /// The snapshot is written beside the journal and renamed over it, so a
    /// crash mid-write leaves the previous journal intact.
    pub fn compact<'a, I>(&mut self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a CacheEntry>,
    {
        self.writer.flush()?;

        let tmp_path = self.path.with_extension("jsonl.tmp");
        let mut written = 0;
        {
            let mut out = BufWriter::new(File::create(&tmp_path)?);
            for entry in entries {
                serde_json::to_writer(&mut out, &RecordRef::Upsert(entry))?;
                out.write_all(b"\n")?;
                written += 1;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        self.writer = open_append(&self.path)?;
        self.records = written;
        Ok(written)
    }
}

fn open_append(path: &Path) -> Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

fn read_records(path: &Path) -> Result<Vec<JournalRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                "Skipping unreadable line {} of cache journal {}: {}",
                index + 1,
                path.display(),
                e
            ),
        }
    }

    Ok(records)
}

//! A single archive volume: a fixed range of records laid out as
//! line-delimited JSON files of fixed capacity.

use crate::constants::{defaults, layout};
use crate::error::{Error, Result};
use crate::types::MemoryRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::warn;

/// Per-volume index persisted alongside the record files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeIndex {
    pub volume_no: u64,
    pub start_ordinal: u64,
    pub record_count: u64,
}

struct VolumeState {
    record_count: u64,
    /// Ordinal → record for cached (recent or preloaded) entries
    cache: HashMap<u64, MemoryRecord>,
    fully_cached: bool,
}

/// A contiguous range of archive records.
///
/// Appends are serialized by the volume mutex; the ordinal → file → line
/// location is pure arithmetic, so random access never scans other files.
pub struct Volume {
    dir: PathBuf,
    volume_no: u64,
    start_ordinal: u64,
    state: Mutex<VolumeState>,
}

impl Volume {
    /// Open (or create) the volume directory and recover the record count
    /// from the files on disk. A malformed trailing line — a crash mid-append
    /// — is dropped with a warning so the next append starts clean.
    pub fn open(parent: &PathBuf, volume_no: u64) -> Result<Self> {
        let dir = parent.join(format!("vol_{volume_no:05}"));
        fs::create_dir_all(&dir)?;

        let mut record_count = 0u64;
        for file_no in 0..defaults::FILES_PER_VOLUME {
            let path = Self::file_path_in(&dir, file_no);
            if !path.exists() {
                break;
            }
            record_count += repair_trailing_line(&path)?;
        }

        Ok(Self {
            dir,
            volume_no,
            start_ordinal: volume_no * defaults::VOLUME_CAPACITY,
            state: Mutex::new(VolumeState {
                record_count,
                cache: HashMap::new(),
                fully_cached: false,
            }),
        })
    }

    pub fn volume_no(&self) -> u64 {
        self.volume_no
    }

    pub fn record_count(&self) -> u64 {
        self.state.lock().record_count
    }

    pub fn is_full(&self) -> bool {
        self.record_count() >= defaults::VOLUME_CAPACITY
    }

    fn file_path_in(dir: &PathBuf, file_no: u64) -> PathBuf {
        dir.join(format!("records_{file_no:03}.jsonl"))
    }

    fn locate(&self, ordinal: u64) -> (PathBuf, u64) {
        let offset = ordinal - self.start_ordinal;
        let file_no = offset / defaults::RECORDS_PER_FILE;
        let line_no = offset % defaults::RECORDS_PER_FILE;
        (Self::file_path_in(&self.dir, file_no), line_no)
    }

    /// Append a record at `ordinal`. The ordinal must be the next free slot.
    pub fn append(&self, ordinal: u64, record: &MemoryRecord) -> Result<()> {
        let mut state = self.state.lock();
        let expected = self.start_ordinal + state.record_count;
        if ordinal != expected {
            return Err(Error::InvalidArgument(format!(
                "volume {} expected ordinal {expected}, got {ordinal}",
                self.volume_no
            )));
        }
        let (path, _) = self.locate(ordinal);
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;

        state.record_count += 1;
        state.cache.insert(ordinal, record.clone());
        Ok(())
    }

    /// Fetch a record by ordinal, from cache or disk.
    pub fn get(&self, ordinal: u64) -> Result<Option<MemoryRecord>> {
        {
            let state = self.state.lock();
            if ordinal >= self.start_ordinal + state.record_count {
                return Ok(None);
            }
            if let Some(record) = state.cache.get(&ordinal) {
                return Ok(Some(record.clone()));
            }
            if state.fully_cached {
                return Ok(None);
            }
        }
        let (path, line_no) = self.locate(ordinal);
        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if i as u64 == line_no {
                let record: MemoryRecord = serde_json::from_str(&line).map_err(|e| {
                    Error::Corruption(format!(
                        "volume {} ordinal {ordinal}: {e}",
                        self.volume_no
                    ))
                })?;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Load every record into the in-memory cache (recent-volume preload).
    pub fn load_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fully_cached {
            return Ok(());
        }
        let mut ordinal = self.start_ordinal;
        for file_no in 0..defaults::FILES_PER_VOLUME {
            let path = Self::file_path_in(&self.dir, file_no);
            if !path.exists() {
                break;
            }
            let file = File::open(&path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<MemoryRecord>(&line) {
                    Ok(record) => {
                        state.cache.insert(ordinal, record);
                        ordinal += 1;
                    }
                    Err(e) => {
                        warn!(volume = self.volume_no, file_no, error = %e,
                              "skipping unparseable record line");
                    }
                }
            }
        }
        state.fully_cached = true;
        Ok(())
    }

    /// Write the per-volume index file.
    pub fn write_index(&self) -> Result<()> {
        let index = VolumeIndex {
            volume_no: self.volume_no,
            start_ordinal: self.start_ordinal,
            record_count: self.record_count(),
        };
        let path = self.dir.join(layout::VOLUME_INDEX_FILE);
        crate::archive::write_json_atomic(&path, &index)
    }
}

/// Count well-formed lines; if the final line is torn, rewrite the file
/// without it. Returns the number of intact records.
fn repair_trailing_line(path: &PathBuf) -> Result<u64> {
    let content = fs::read_to_string(path)?;
    let mut good: Vec<&str> = Vec::new();
    let mut torn = false;
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if serde_json::from_str::<MemoryRecord>(line).is_ok() {
            good.push(line);
        } else {
            torn = true;
        }
    }
    if torn {
        warn!(path = %path.display(), "dropping torn trailing record line");
        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        for line in &good {
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        fs::rename(&tmp, path)?;
    }
    Ok(good.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeId;
    use crate::types::RecordMetadata;

    fn record(content: &str) -> MemoryRecord {
        MemoryRecord::new(
            content.to_string(),
            ScopeId::new("u", "default", "s"),
            RecordMetadata::default(),
        )
    }

    #[test]
    fn append_then_get_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let parent = dir.path().to_path_buf();
        let volume = Volume::open(&parent, 0).expect("open");

        let a = record("first");
        let b = record("second");
        volume.append(0, &a).expect("append a");
        volume.append(1, &b).expect("append b");

        assert_eq!(volume.get(0).expect("get").expect("some").content, "first");
        assert_eq!(volume.get(1).expect("get").expect("some").content, "second");
        assert_eq!(volume.get(2).expect("get"), None);
    }

    #[test]
    fn out_of_order_append_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let parent = dir.path().to_path_buf();
        let volume = Volume::open(&parent, 0).expect("open");
        assert!(volume.append(5, &record("x")).is_err());
    }

    #[test]
    fn reopen_recovers_count_and_drops_torn_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let parent = dir.path().to_path_buf();
        {
            let volume = Volume::open(&parent, 0).expect("open");
            volume.append(0, &record("kept")).expect("append");
        }
        // Simulate a crash mid-append
        let file = parent.join("vol_00000").join("records_000.jsonl");
        let mut handle = OpenOptions::new().append(true).open(&file).expect("open file");
        handle.write_all(b"{\"id\": \"trunc").expect("write");
        drop(handle);

        let volume = Volume::open(&parent, 0).expect("reopen");
        assert_eq!(volume.record_count(), 1);
        volume.append(1, &record("next")).expect("append after repair");
        assert_eq!(volume.get(1).expect("get").expect("some").content, "next");
    }

    #[test]
    fn uncached_reads_hit_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let parent = dir.path().to_path_buf();
        {
            let volume = Volume::open(&parent, 0).expect("open");
            for i in 0..5 {
                volume.append(i, &record(&format!("r{i}"))).expect("append");
            }
        }
        let volume = Volume::open(&parent, 0).expect("reopen");
        assert_eq!(volume.get(3).expect("get").expect("some").content, "r3");
        volume.load_all().expect("preload");
        assert_eq!(volume.get(4).expect("get").expect("some").content, "r4");
    }
}

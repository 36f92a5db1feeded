//! Volume-sharded append-only log.
//!
//! The archive is the source of truth: every ingested record is preserved
//! verbatim, addressed by a monotonically increasing ordinal. Volumes group
//! fixed-capacity line-delimited JSON files; a top-level manifest tracks the
//! total count and latest volume. A secondary `id → ordinal` map makes
//! `get_by_id` O(1); deletes are tombstones, the log itself never rewrites.

mod volume;

pub use volume::{Volume, VolumeIndex};

use crate::constants::{defaults, layout};
use crate::error::{Error, Result};
use crate::types::MemoryRecord;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Top-level archive manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub total_records: u64,
    pub latest_volume: u64,
    pub created_at: DateTime<Utc>,
}

impl Default for ArchiveManifest {
    fn default() -> Self {
        Self {
            total_records: 0,
            latest_volume: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IdMapFile {
    ids: HashMap<String, u64>,
    tombstones: HashSet<u64>,
}

/// Serialize a value to `path` via temp-file-then-rename so readers never
/// observe a torn file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_string(value)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a JSON file if present, mapping parse failures to `Corruption`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::Corruption(format!("{}: {e}", path.display())))
}

/// The append-only archive for one scope.
pub struct ArchiveLog {
    dir: PathBuf,
    manifest: Mutex<ArchiveManifest>,
    volumes: RwLock<HashMap<u64, Arc<Volume>>>,
    id_map: Mutex<IdMapState>,
    /// Serializes ordinal allocation across volumes
    append_lock: Mutex<()>,
}

struct IdMapState {
    ids: HashMap<String, u64>,
    tombstones: HashSet<u64>,
    appends_since_persist: u64,
}

impl ArchiveLog {
    /// Open or create an archive rooted at `dir`.
    ///
    /// Recovery: the latest volume's record count is re-derived from disk,
    /// and if the persisted id map disagrees with the manifest the map is
    /// rebuilt by scanning every volume. The archive must always be able to
    /// regenerate its derived files.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join("volumes"))?;

        let mut manifest: ArchiveManifest =
            read_json(&dir.join(layout::MANIFEST_FILE))?.unwrap_or_default();

        // Trust the files over the manifest for the open volume.
        let latest = Volume::open(&dir.join("volumes"), manifest.latest_volume)?;
        let recovered_total =
            manifest.latest_volume * defaults::VOLUME_CAPACITY + latest.record_count();
        if recovered_total != manifest.total_records {
            info!(
                manifest = manifest.total_records,
                recovered = recovered_total,
                "archive manifest out of date, using recovered count"
            );
            manifest.total_records = recovered_total;
        }

        let id_file: IdMapFile =
            read_json(&dir.join(layout::ID_MAP_FILE))?.unwrap_or_default();

        let mut volumes = HashMap::new();
        volumes.insert(latest.volume_no(), Arc::new(latest));

        let archive = Self {
            dir,
            manifest: Mutex::new(manifest),
            volumes: RwLock::new(volumes),
            id_map: Mutex::new(IdMapState {
                ids: id_file.ids,
                tombstones: id_file.tombstones,
                appends_since_persist: 0,
            }),
            append_lock: Mutex::new(()),
        };

        archive.rebuild_id_map_if_stale()?;
        Ok(archive)
    }

    fn rebuild_id_map_if_stale(&self) -> Result<()> {
        let total = self.manifest.lock().total_records;
        let stale = {
            let map = self.id_map.lock();
            (map.ids.len() + map.tombstones.len()) as u64 != total
        };
        if !stale {
            return Ok(());
        }
        warn!("id map stale, rebuilding from archive scan");
        let mut rebuilt = HashMap::new();
        self.scan(|ordinal, record| {
            rebuilt.insert(record.id.clone(), ordinal);
        })?;
        let mut map = self.id_map.lock();
        // Tombstoned ordinals stay hidden even after a rebuild.
        for ordinal in &map.tombstones {
            rebuilt.retain(|_, o| o != ordinal);
        }
        map.ids = rebuilt;
        drop(map);
        self.persist_id_map()
    }

    fn volume(&self, volume_no: u64) -> Result<Arc<Volume>> {
        if let Some(volume) = self.volumes.read().get(&volume_no) {
            return Ok(Arc::clone(volume));
        }
        let mut volumes = self.volumes.write();
        if let Some(volume) = volumes.get(&volume_no) {
            return Ok(Arc::clone(volume));
        }
        let volume = Arc::new(Volume::open(&self.dir.join("volumes"), volume_no)?);
        volumes.insert(volume_no, Arc::clone(&volume));
        Ok(volume)
    }

    /// Append a record, returning its ordinal. The record is durable on
    /// disk before this returns; derived files lag and are recoverable.
    pub fn append(&self, record: &MemoryRecord) -> Result<u64> {
        let _guard = self.append_lock.lock();
        let ordinal = self.manifest.lock().total_records;
        let volume_no = ordinal / defaults::VOLUME_CAPACITY;
        let volume = self.volume(volume_no)?;
        volume.append(ordinal, record)?;

        {
            let mut manifest = self.manifest.lock();
            manifest.total_records = ordinal + 1;
            manifest.latest_volume = volume_no;
        }
        let persist_due = {
            let mut map = self.id_map.lock();
            map.ids.insert(record.id.clone(), ordinal);
            map.appends_since_persist += 1;
            map.appends_since_persist >= defaults::ID_MAP_PERSIST_INTERVAL
        };
        if persist_due {
            self.flush()?;
        }
        debug!(ordinal, id = %record.id, "archived record");
        Ok(ordinal)
    }

    /// Fetch by ordinal. Tombstoned records return `None`.
    pub fn get(&self, ordinal: u64) -> Result<Option<MemoryRecord>> {
        if self.id_map.lock().tombstones.contains(&ordinal) {
            return Ok(None);
        }
        if ordinal >= self.manifest.lock().total_records {
            return Ok(None);
        }
        let volume = self.volume(ordinal / defaults::VOLUME_CAPACITY)?;
        volume.get(ordinal)
    }

    /// O(1) lookup through the id map.
    pub fn get_by_id(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let ordinal = match self.id_map.lock().ids.get(id) {
            Some(&ordinal) => ordinal,
            None => return Ok(None),
        };
        self.get(ordinal)
    }

    /// Ordinal for an id, if live.
    pub fn ordinal_of(&self, id: &str) -> Option<u64> {
        self.id_map.lock().ids.get(id).copied()
    }

    /// Records in `[start, end)` ordinal order, skipping tombstones.
    pub fn range(&self, start: u64, end: u64) -> Result<Vec<MemoryRecord>> {
        let end = end.min(self.manifest.lock().total_records);
        let mut records = Vec::new();
        for ordinal in start..end {
            if let Some(record) = self.get(ordinal)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Visit every live record in ordinal order. This is the recovery route
    /// every index rebuild runs on.
    pub fn scan(&self, mut visit: impl FnMut(u64, &MemoryRecord)) -> Result<()> {
        let total = self.manifest.lock().total_records;
        let tombstones = self.id_map.lock().tombstones.clone();
        for ordinal in 0..total {
            if tombstones.contains(&ordinal) {
                continue;
            }
            let volume = self.volume(ordinal / defaults::VOLUME_CAPACITY)?;
            if let Some(record) = volume.get(ordinal)? {
                visit(ordinal, &record);
            }
        }
        Ok(())
    }

    /// Tombstone a record. The line stays in the log; the id and ordinal
    /// stop resolving. Returns the removed record.
    pub fn delete_by_id(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let ordinal = {
            let map = self.id_map.lock();
            match map.ids.get(id) {
                Some(&ordinal) => ordinal,
                None => return Ok(None),
            }
        };
        let record = self.get(ordinal)?;
        {
            let mut map = self.id_map.lock();
            map.ids.remove(id);
            map.tombstones.insert(ordinal);
        }
        self.flush()?;
        Ok(record)
    }

    /// Keep the newest `n` volumes fully in memory.
    pub fn preload_recent(&self, n: usize) -> Result<()> {
        let latest = self.manifest.lock().latest_volume;
        let first = latest.saturating_sub(n.saturating_sub(1) as u64);
        for volume_no in first..=latest {
            self.volume(volume_no)?.load_all()?;
        }
        Ok(())
    }

    /// Total records ever appended (tombstones included).
    pub fn total_records(&self) -> u64 {
        self.manifest.lock().total_records
    }

    /// Live (non-tombstoned) record count.
    pub fn live_records(&self) -> u64 {
        self.id_map.lock().ids.len() as u64
    }

    /// Persist the manifest, id map, and per-volume indices.
    pub fn flush(&self) -> Result<()> {
        let manifest = self.manifest.lock().clone();
        write_json_atomic(&self.dir.join(layout::MANIFEST_FILE), &manifest)?;
        self.persist_id_map()?;
        for volume in self.volumes.read().values() {
            volume.write_index()?;
        }
        Ok(())
    }

    fn persist_id_map(&self) -> Result<()> {
        let mut map = self.id_map.lock();
        let file = IdMapFile {
            ids: map.ids.clone(),
            tombstones: map.tombstones.clone(),
        };
        map.appends_since_persist = 0;
        drop(map);
        write_json_atomic(&self.dir.join(layout::ID_MAP_FILE), &file)
    }
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
    fn ordinals_are_strictly_increasing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = ArchiveLog::open(dir.path()).expect("open");
        let a = archive.append(&record("a")).expect("append");
        let b = archive.append(&record("b")).expect("append");
        let c = archive.append(&record("c")).expect("append");
        assert_eq!((a, b, c), (0, 1, 2));
    }

    #[test]
    fn get_by_id_resolves_without_scan() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = ArchiveLog::open(dir.path()).expect("open");
        let r = record("needle");
        archive.append(&r).expect("append");
        archive.append(&record("other")).expect("append");
        let found = archive.get_by_id(&r.id).expect("get").expect("some");
        assert_eq!(found.content, "needle");
    }

    #[test]
    fn delete_tombstones_and_survives_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doomed = record("doomed");
        {
            let archive = ArchiveLog::open(dir.path()).expect("open");
            archive.append(&doomed).expect("append");
            archive.append(&record("kept")).expect("append");
            archive.delete_by_id(&doomed.id).expect("delete");
            archive.flush().expect("flush");
        }
        let archive = ArchiveLog::open(dir.path()).expect("reopen");
        assert_eq!(archive.get_by_id(&doomed.id).expect("get"), None);
        assert_eq!(archive.get(0).expect("get"), None);
        assert!(archive.get(1).expect("get").is_some());
        assert_eq!(archive.live_records(), 1);
        assert_eq!(archive.total_records(), 2);
    }

    #[test]
    fn reopen_without_flush_recovers_id_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        let r = record("unflushed");
        {
            let archive = ArchiveLog::open(dir.path()).expect("open");
            archive.append(&r).expect("append");
            // No flush: manifest and id map on disk are stale.
        }
        let archive = ArchiveLog::open(dir.path()).expect("reopen");
        assert_eq!(archive.total_records(), 1);
        let found = archive.get_by_id(&r.id).expect("get").expect("some");
        assert_eq!(found.content, "unflushed");
    }

    #[test]
    fn range_respects_bounds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = ArchiveLog::open(dir.path()).expect("open");
        for i in 0..5 {
            archive.append(&record(&format!("r{i}"))).expect("append");
        }
        let slice = archive.range(1, 4).expect("range");
        let contents: Vec<&str> = slice.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["r1", "r2", "r3"]);
    }
}

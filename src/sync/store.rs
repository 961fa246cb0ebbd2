//! Durable storage for the pending-sync queue.
//!
//! `FileSyncStore` keeps two files in its directory:
//! - `azuria-pending-sync.json`: checkpoint snapshot (JSON array)
//! - `azuria-pending-sync.log`: journal records appended since then, one
//!   JSON object per line
//!
//! Loading replays the log on top of the snapshot. A checkpoint writes the
//! snapshot to a temp file, renames it into place and truncates the log.

use super::types::{replay, JournalRecord, SyncData};
use crate::constants::{COMPACTION_THRESHOLD, PENDING_SYNC_KEY};
use crate::error::SyncError;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub trait SyncStore: Send {
    /// Pending items as of the last persisted record.
    fn load(&mut self) -> Result<Vec<SyncData>, SyncError>;

    fn append(&mut self, record: &JournalRecord) -> Result<(), SyncError>;

    /// Replace everything persisted with `pending`.
    fn checkpoint(&mut self, pending: &[SyncData]) -> Result<(), SyncError>;

    fn needs_checkpoint(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
pub struct MemorySyncStore {
    snapshot: Vec<SyncData>,
    records: Vec<JournalRecord>,
}

impl MemorySyncStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncStore for MemorySyncStore {
    fn load(&mut self) -> Result<Vec<SyncData>, SyncError> {
        Ok(replay(self.snapshot.clone(), self.records.clone()))
    }

    fn append(&mut self, record: &JournalRecord) -> Result<(), SyncError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn checkpoint(&mut self, pending: &[SyncData]) -> Result<(), SyncError> {
        self.snapshot = pending.to_vec();
        self.records.clear();
        Ok(())
    }
}

pub struct FileSyncStore {
    snapshot_path: PathBuf,
    log_path: PathBuf,
    log: Option<File>,
    records_since_checkpoint: usize,
}

impl FileSyncStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SyncError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            snapshot_path: dir.join(format!("{}.json", PENDING_SYNC_KEY)),
            log_path: dir.join(format!("{}.log", PENDING_SYNC_KEY)),
            log: None,
            records_since_checkpoint: 0,
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn read_snapshot(&self) -> Vec<SyncData> {
        if !self.snapshot_path.exists() {
            return Vec::new();
        }
        let parsed = fs::read_to_string(&self.snapshot_path)
            .map_err(SyncError::from)
            .and_then(|content| serde_json::from_str(&content).map_err(SyncError::from));
        match parsed {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    "Unreadable sync snapshot at {}: {}. Starting from an empty queue.",
                    self.snapshot_path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Returns the parsed records and whether any line had to be skipped.
    fn read_log(&self) -> Result<(Vec<JournalRecord>, bool), SyncError> {
        if !self.log_path.exists() {
            return Ok((Vec::new(), false));
        }
        let content = fs::read_to_string(&self.log_path)?;
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

        let mut records = Vec::with_capacity(lines.len());
        let mut damaged = false;
        for (idx, line) in lines.iter().enumerate() {
            match serde_json::from_str::<JournalRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    damaged = true;
                    if idx + 1 == lines.len() {
                        warn!("Skipping torn trailing sync journal line: {}", e);
                    } else {
                        warn!("Skipping corrupt sync journal line {}: {}", idx + 1, e);
                    }
                }
            }
        }
        Ok((records, damaged))
    }

    fn log_file(&mut self) -> Result<&mut File, SyncError> {
        let file = match self.log.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)?,
        };
        Ok(self.log.insert(file))
    }
}

impl SyncStore for FileSyncStore {
    fn load(&mut self) -> Result<Vec<SyncData>, SyncError> {
        let snapshot = self.read_snapshot();
        let (records, damaged) = self.read_log()?;
        self.records_since_checkpoint = records.len();

        let pending = replay(snapshot, records);
        if damaged {
            // Rewrite so later appends never land after a partial line
            self.checkpoint(&pending)?;
        }
        debug!(
            "Loaded {} pending sync items from {}",
            pending.len(),
            self.snapshot_path.display()
        );
        Ok(pending)
    }

    fn append(&mut self, record: &JournalRecord) -> Result<(), SyncError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let file = self.log_file()?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        self.records_since_checkpoint += 1;
        Ok(())
    }

    fn checkpoint(&mut self, pending: &[SyncData]) -> Result<(), SyncError> {
        let tmp_path = self.snapshot_path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(serde_json::to_string(pending)?.as_bytes())?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.snapshot_path)?;

        self.log = None;
        File::create(&self.log_path)?;
        self.records_since_checkpoint = 0;
        debug!("Checkpointed {} pending sync items", pending.len());
        Ok(())
    }

    fn needs_checkpoint(&self) -> bool {
        self.records_since_checkpoint >= COMPACTION_THRESHOLD
    }
}

//! Append-only JSONL result files, one per task run.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tabrelay_core::{EntryKind, StorageEntry};
use tabrelay_logging::{relay_debug, relay_warn};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Timestamp source for records; swapped out in tests.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

pub fn utc_clock() -> Clock {
    Arc::new(|| Utc::now().to_rfc3339())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("output directory missing or not writable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("encoding record failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Ensure output directory exists; create if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| StoreError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(StoreError::OutputDir("path is not a directory".into()));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| StoreError::OutputDir(e.to_string()))?;
    }
    NamedTempFile::new_in(dir).map_err(|e| StoreError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Durable, line-at-a-time log of one task run.
///
/// Every append is a single newline-terminated JSON object written with one
/// `write_all` under the file lock, so concurrent runs writing their own files
/// never interleave and a crash loses at most the line being written.
pub struct IncrementalStore {
    path: PathBuf,
    platform: String,
    file: Mutex<File>,
    clock: Clock,
}

impl IncrementalStore {
    /// Create a fresh `{platform}_{YYYYmmdd_HHMMSS}.jsonl` file in `dir`.
    /// Collisions within the same second get a `_N` suffix.
    pub fn create(dir: &Path, platform: &str) -> Result<Self, StoreError> {
        ensure_output_dir(dir)?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let mut suffix = 0u32;
        loop {
            let name = match suffix {
                0 => format!("{platform}_{stamp}.jsonl"),
                n => format!("{platform}_{stamp}_{n}.jsonl"),
            };
            let path = dir.join(name);
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => {
                    relay_debug!("Writing results to {}", path.display());
                    return Ok(Self::from_file(path, platform, file));
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Append to an existing (or new) file at `path`.
    pub fn open(path: impl Into<PathBuf>, platform: &str) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_output_dir(parent)?;
        }
        let file = OpenOptions::new().append(true).create(true).open(&path)?;
        Ok(Self::from_file(path, platform, file))
    }

    fn from_file(path: PathBuf, platform: &str, file: File) -> Self {
        Self {
            path,
            platform: platform.to_string(),
            file: Mutex::new(file),
            clock: utc_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn append_item(&self, data: Value) -> Result<(), StoreError> {
        self.append(StorageEntry::Item {
            platform: self.platform.clone(),
            timestamp: (self.clock)(),
            data,
        })
    }

    pub fn append_items(&self, items: &[Value]) -> Result<(), StoreError> {
        items.iter().try_for_each(|item| self.append_item(item.clone()))
    }

    pub fn append_summary(&self, data: Value) -> Result<(), StoreError> {
        self.append(StorageEntry::Summary {
            platform: self.platform.clone(),
            timestamp: (self.clock)(),
            data,
        })
    }

    pub fn append_error(&self, error: Value) -> Result<(), StoreError> {
        self.append(StorageEntry::Error {
            platform: self.platform.clone(),
            timestamp: (self.clock)(),
            error,
        })
    }

    pub fn append_progress(&self, data: Value) -> Result<(), StoreError> {
        self.append(StorageEntry::Progress {
            platform: self.platform.clone(),
            timestamp: (self.clock)(),
            data,
        })
    }

    pub fn append(&self, entry: StorageEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// Per-kind record counts of a run file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryCounts {
    pub items: usize,
    pub summaries: usize,
    pub errors: usize,
    pub progress: usize,
}

impl EntryCounts {
    pub fn total(&self) -> usize {
        self.items + self.summaries + self.errors + self.progress
    }

    fn record(&mut self, kind: EntryKind) {
        match kind {
            EntryKind::Item => self.items += 1,
            EntryKind::Summary => self.summaries += 1,
            EntryKind::Error => self.errors += 1,
            EntryKind::Progress => self.progress += 1,
        }
    }
}

/// The decoded contents of one run file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunLog {
    pub entries: Vec<StorageEntry>,
    /// Lines that did not decode (typically a torn final line after a crash).
    pub skipped_lines: usize,
}

impl RunLog {
    pub fn counts(&self) -> EntryCounts {
        let mut counts = EntryCounts::default();
        for entry in &self.entries {
            counts.record(entry.kind());
        }
        counts
    }

    pub fn items(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().filter_map(|entry| match entry {
            StorageEntry::Item { data, .. } => Some(data),
            _ => None,
        })
    }

    pub fn summary(&self) -> Option<&Value> {
        self.entries.iter().rev().find_map(|entry| match entry {
            StorageEntry::Summary { data, .. } => Some(data),
            _ => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().filter_map(|entry| match entry {
            StorageEntry::Error { error, .. } => Some(error),
            _ => None,
        })
    }
}

/// Read every decodable record of a run file, skipping blank and broken lines.
pub fn read_entries(path: &Path) -> Result<RunLog, StoreError> {
    let text = fs::read_to_string(path)?;
    let mut log = RunLog::default();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StorageEntry>(line) {
            Ok(entry) => log.entries.push(entry),
            Err(err) => {
                relay_warn!("{}:{}: skipping unreadable record: {err}", path.display(), index + 1);
                log.skipped_lines += 1;
            }
        }
    }
    Ok(log)
}

/// The most recently modified `.jsonl` run file in `dir`, optionally limited
/// to one platform's files.
pub fn latest_run_file(dir: &Path, platform: Option<&str>) -> Result<Option<PathBuf>, StoreError> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let prefix = platform.map(|p| format!("{p}_"));
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".jsonl") {
            continue;
        }
        if let Some(prefix) = &prefix {
            if !name.starts_with(prefix.as_str()) {
                continue;
            }
        }
        let modified = entry.metadata()?.modified()?;
        if newest.as_ref().map_or(true, |(best, _)| modified > *best) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

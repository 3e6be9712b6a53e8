//! Checkpoint store persistence
//!
//! Atomic rewrites go through `tempfile::NamedTempFile` in the target
//! directory followed by a rename, so a crash mid-write leaves either the old
//! file or the new one, never a torn file that `load` cannot parse.

use super::key::SeriesKey;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Maximum accepted checkpoint file size (10 MB)
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Checkpoint key → exclusive end timestamp (ms) of the last durable chunk
pub type CheckpointMap = BTreeMap<String, i64>;

/// Read the checkpoint file.
///
/// A missing file is a first run and yields an empty mapping. A file that
/// exists but cannot be parsed is fatal: resuming on bad state would silently
/// duplicate or lose data.
pub fn load_checkpoints(path: &Path) -> Result<CheckpointMap, ResumeError> {
    if !path.exists() {
        debug!(path = %path.display(), "No checkpoint file, starting fresh");
        return Ok(CheckpointMap::new());
    }

    let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
    if metadata.len() > MAX_STATE_FILE_SIZE {
        return Err(ResumeError::StateTooLarge {
            size: metadata.len(),
            max: MAX_STATE_FILE_SIZE,
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ResumeError::CorruptCheckpoint {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let raw: BTreeMap<String, i64> =
        serde_json::from_str(&contents).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Checkpoint file is corrupt");
            ResumeError::CorruptCheckpoint {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

    // Normalise "BTC-1m" spellings to the canonical "BTC_1m" form.
    let mut map = CheckpointMap::new();
    for (key, value) in raw {
        let canonical = SeriesKey::from_str(&key)
            .map(|k| k.checkpoint_key())
            .unwrap_or(key);
        let slot = map.entry(canonical).or_insert(value);
        *slot = (*slot).max(value);
    }

    info!(
        path = %path.display(),
        entries = map.len(),
        "Checkpoints loaded"
    );
    Ok(map)
}

/// Atomically overwrite the checkpoint file with the full mapping
pub fn save_checkpoints(path: &Path, checkpoints: &CheckpointMap) -> Result<(), ResumeError> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

    let json = serde_json::to_string_pretty(checkpoints)
        .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;

    temp_file
        .write_all(json.as_bytes())
        .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;

    temp_file
        .flush()
        .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

    temp_file
        .persist(path)
        .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

    // Make the rename itself durable
    if let Ok(dir) = std::fs::File::open(parent_dir) {
        let _ = dir.sync_all();
    }

    debug!(
        path = %path.display(),
        entries = checkpoints.len(),
        "Checkpoints saved"
    );
    Ok(())
}

/// In-memory checkpoint mapping bound to its file
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    entries: CheckpointMap,
}

impl CheckpointStore {
    /// Load the store from `path` (empty if the file does not exist)
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ResumeError> {
        let path = path.into();
        let entries = load_checkpoints(&path)?;
        Ok(Self { path, entries })
    }

    /// Last durable end timestamp for a series, if any
    pub fn get(&self, key: &SeriesKey) -> Option<i64> {
        self.entries.get(&key.checkpoint_key()).copied()
    }

    /// Record that everything before `end_ms` is durably written for `key`,
    /// then persist the whole mapping.
    ///
    /// Checkpoints never move backwards; an older value is ignored.
    pub fn advance(&mut self, key: &SeriesKey, end_ms: i64) -> Result<i64, ResumeError> {
        let checkpoint_key = key.checkpoint_key();
        if let Some(&current) = self.entries.get(&checkpoint_key) {
            if end_ms < current {
                warn!(
                    key = %key,
                    current,
                    requested = end_ms,
                    "Ignoring checkpoint regression"
                );
                return Ok(current);
            }
        }

        // Memory only moves once the file has
        let mut next = self.entries.clone();
        next.insert(checkpoint_key, end_ms);
        save_checkpoints(&self.path, &next)?;
        self.entries = next;
        Ok(end_ms)
    }

    /// Persist the current mapping
    pub fn save(&self) -> Result<(), ResumeError> {
        save_checkpoints(&self.path, &self.entries)
    }

    /// All entries, keyed by checkpoint key
    pub fn entries(&self) -> &CheckpointMap {
        &self.entries
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Errors related to checkpoint state
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Checkpoint file exists but cannot be parsed
    #[error("corrupt checkpoint file {}: {reason}", path.display())]
    CorruptCheckpoint {
        /// Offending file
        path: PathBuf,
        /// Parser or read error
        reason: String,
    },

    /// State file too large
    #[error("checkpoint file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}

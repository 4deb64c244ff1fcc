//! Persisted agent state.
//!
//! The last fingerprint and the last backup written are kept in
//! `<backup-dir>/backup_state.json` so a restarted agent does not copy an
//! unchanged file again. Writes go to a sibling temp file which is then
//! renamed over the canonical path, so readers only ever see a complete file.

use crate::fs::fingerprint::Fingerprint;
use crate::utils::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the state file inside the backup directory
pub const STATE_FILE_NAME: &str = "backup_state.json";

/// Metadata about the most recent backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub source: PathBuf,
    pub backup_dir: PathBuf,
    pub last_backup_file: PathBuf,
    /// Filename-safe UTC stamp, e.g. `2025-11-06T13-22-09Z`
    pub last_backup_utc: String,
}

/// Flat on-disk form of the last fingerprint and backup record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_mtime: Option<i64>,

    #[serde(default)]
    pub last_hash: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_utc: Option<String>,
}

impl PersistedState {
    pub fn from_backup(fingerprint: &Fingerprint, record: &BackupRecord) -> Self {
        Self {
            last_size: Some(fingerprint.size),
            last_mtime: Some(fingerprint.mtime),
            last_hash: fingerprint.hash.clone(),
            source: Some(record.source.clone()),
            backup_dir: Some(record.backup_dir.clone()),
            last_backup_file: Some(record.last_backup_file.clone()),
            last_backup_utc: Some(record.last_backup_utc.clone()),
        }
    }

    /// Last fingerprint, if a backup has ever been recorded
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        Some(Fingerprint {
            size: self.last_size?,
            mtime: self.last_mtime?,
            hash: self.last_hash.clone(),
        })
    }

    pub fn record(&self) -> Option<BackupRecord> {
        Some(BackupRecord {
            source: self.source.clone()?,
            backup_dir: self.backup_dir.clone()?,
            last_backup_file: self.last_backup_file.clone()?,
            last_backup_utc: self.last_backup_utc.clone()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Reads and writes [`PersistedState`] for one backup directory
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store for `<backup_dir>/backup_state.json`
    pub fn new(backup_dir: &Path) -> Self {
        Self {
            path: backup_dir.join(STATE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    /// Load state, falling back to an empty state on any failure.
    pub fn load(&self) -> PersistedState {
        match self.try_load() {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!("No state file at {}, starting fresh", self.path.display());
                PersistedState::default()
            }
            Err(e) => {
                warn!("{} (continuing with empty state)", e);
                PersistedState::default()
            }
        }
    }

    /// Load state; `Ok(None)` when no state file exists yet.
    pub fn try_load(&self) -> Result<Option<PersistedState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AgentError::StateIo {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| AgentError::StateFormat {
                path: self.path.clone(),
                source,
            })
    }

    /// Save state atomically. Failures are logged and reported as `false`.
    pub fn save(&self, state: &PersistedState) -> bool {
        match self.try_save(state) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to save state: {}", e);
                false
            }
        }
    }

    /// Write to a temp file in the same directory, fsync, then rename over
    /// the state file.
    pub fn try_save(&self, state: &PersistedState) -> Result<()> {
        let temp_path = self.temp_path();

        let file = File::create(&temp_path).map_err(io_err(&temp_path))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state).map_err(|source| {
            AgentError::StateFormat {
                path: temp_path.clone(),
                source,
            }
        })?;
        writer.flush().map_err(io_err(&temp_path))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(io_err(&temp_path))?;

        fs::rename(&temp_path, &self.path).map_err(io_err(&self.path))?;
        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> AgentError {
    let path = path.to_path_buf();
    move |source| AgentError::StateIo { path, source }
}

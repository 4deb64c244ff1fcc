//! Backup poll loop - decides when the source changed and writes backups.
//!
//! Each iteration stats the source, runs the two-tier change check and, on a
//! real content change, writes a timestamped copy and persists the new state.
//! No failure inside an iteration stops the loop; only cancellation does.

pub mod writer;

use crate::config::WatchConfig;
use crate::fs::fingerprint::{self, Change, CheapFingerprint, Fingerprint};
use crate::state::{BackupRecord, PersistedState, StateStore};
use crate::utils::errors::AgentError;
use crate::utils::format::{format_bytes, short_hash};
use chrono::Utc;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Constructed, loop not entered yet
    Idle,
    Running,
    /// Cancellation observed, finishing up
    Stopping,
    Stopped,
}

/// What a single poll iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    SourceMissing,
    StatFailed,
    Unchanged,
    MetadataOnly,
    BackedUp(BackupRecord),
    BackupFailed,
}

/// Main backup executor
pub struct BackupExecutor {
    source: PathBuf,
    backup_dir: PathBuf,
    interval: Duration,
    store: StateStore,
    state: PersistedState,
    phase: LoopPhase,
}

impl BackupExecutor {
    /// Resolve paths, make sure the backup directory exists and load state.
    pub fn new(config: &WatchConfig) -> Self {
        let source = absolutize(&config.source_file);
        let backup_dir = absolutize(&config.backup_dir);

        if let Err(e) = std::fs::create_dir_all(&backup_dir) {
            error!("Cannot create backup directory {}: {}", backup_dir.display(), e);
        }

        let store = StateStore::new(&backup_dir);
        let state = store.load();

        if let Some(previous) = state.source.as_deref() {
            if previous != source.as_path() {
                warn!(
                    "State file {} was recorded for {}, now watching {}",
                    store.path().display(),
                    previous.display(),
                    source.display()
                );
            }
        }

        Self {
            source,
            backup_dir,
            interval: config.interval(),
            store,
            state,
            phase: LoopPhase::Idle,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// In-memory state; equal to the state file after every successful save
    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    /// Poll until `cancel` fires.
    ///
    /// Cancellation is checked at the top of every iteration and cuts the
    /// sleep short, but never interrupts an iteration already running.
    pub async fn run(&mut self, cancel: CancellationToken) {
        self.phase = LoopPhase::Running;
        info!(
            "Starting backup loop (interval={}s, source={}, dest={})",
            self.interval.as_secs(),
            self.source.display(),
            self.backup_dir.display()
        );

        while !cancel.is_cancelled() {
            self.guarded_poll();

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.phase = LoopPhase::Stopping;
        info!(
            "Backup stopped. Last state: size={} mtime={} hash={}",
            display_opt(self.state.last_size),
            display_opt(self.state.last_mtime),
            self.state.last_hash
        );
        self.phase = LoopPhase::Stopped;
    }

    fn guarded_poll(&mut self) -> Option<PollOutcome> {
        self.guarded(Self::poll_once)
    }

    /// Run one iteration, turning a panic into a logged error.
    fn guarded<F>(&mut self, iteration: F) -> Option<PollOutcome>
    where
        F: FnOnce(&mut Self) -> PollOutcome,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| iteration(self))) {
            Ok(outcome) => Some(outcome),
            Err(payload) => {
                error!("Unexpected error in backup loop: {}", panic_message(&*payload));
                None
            }
        }
    }

    /// One poll iteration: stat, compare, back up if needed.
    pub fn poll_once(&mut self) -> PollOutcome {
        let current = match fingerprint::cheap_fingerprint(&self.source) {
            Ok(current) => current,
            Err(AgentError::NotFound(path)) => {
                warn!(
                    "Source file does not exist yet: {} (checking again in {}s)",
                    path.display(),
                    self.interval.as_secs()
                );
                return PollOutcome::SourceMissing;
            }
            Err(e) if e.is_transient() => {
                warn!("{} (checking again in {}s)", e, self.interval.as_secs());
                return PollOutcome::StatFailed;
            }
            Err(e) => {
                error!("{}", e);
                return PollOutcome::StatFailed;
            }
        };

        let last = self.state.fingerprint();
        match fingerprint::has_changed(&self.source, &current, last.as_ref()) {
            Change::Unchanged => {
                debug!("No change in source, skipping backup");
                PollOutcome::Unchanged
            }
            Change::MetadataOnly => {
                debug!("Source metadata changed but content is identical, skipping backup");
                PollOutcome::MetadataOnly
            }
            Change::Changed { hash } => self.back_up(current, hash),
        }
    }

    fn back_up(&mut self, current: CheapFingerprint, detected_hash: String) -> PollOutcome {
        let outcome = writer::write_backup(&self.source, &self.backup_dir, Utc::now());
        let written = match outcome {
            Ok(written) => written,
            Err(e) if e.is_transient() => {
                error!("Backup failed, will retry next interval: {}", e);
                return PollOutcome::BackupFailed;
            }
            Err(e) => {
                error!("Backup failed: {}", e);
                return PollOutcome::BackupFailed;
            }
        };

        info!(
            "Backup written: {} ({})",
            written.dest_path.display(),
            format_bytes(written.size_bytes)
        );

        let hash = if detected_hash.is_empty() {
            fingerprint::hash_file_or_empty(&self.source)
        } else {
            detected_hash
        };
        let latest = Fingerprint {
            size: written.size_bytes,
            mtime: current.mtime,
            hash,
        };
        let record = BackupRecord {
            source: self.source.clone(),
            backup_dir: self.backup_dir.clone(),
            last_backup_file: written.dest_path,
            last_backup_utc: written.stamp,
        };

        debug!(
            "Recording fingerprint size={} mtime={} hash={}",
            latest.size,
            latest.mtime,
            short_hash(&latest.hash)
        );
        self.state = PersistedState::from_backup(&latest, &record);
        self.store.save(&self.state);

        PollOutcome::BackedUp(record)
    }
}

/// Make `path` absolute against the current directory without touching disk.
fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn display_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

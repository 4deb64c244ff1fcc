//! Source file metadata handling.
//!
//! Backups are stamped with the permissions and timestamps of the source so a
//! restored copy looks exactly like the file it was taken from.

use std::fs::{self, File, FileTimes};
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata captured from a source file
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Last modified time
    pub modified: SystemTime,

    /// Last access time, when the platform reports one
    pub accessed: Option<SystemTime>,

    /// File permissions (Unix mode bits)
    pub permissions: Option<u32>,
}

impl FileMetadata {
    /// Extract metadata from a file path
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;

        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = None;

        Ok(Self {
            modified: metadata.modified()?,
            accessed: metadata.accessed().ok(),
            permissions,
        })
    }

    /// Apply permissions and timestamps to another file
    pub fn apply_to_path(&self, path: &Path) -> io::Result<()> {
        // Owner-only operation; a read-only handle is enough.
        let mut times = FileTimes::new().set_modified(self.modified);
        if let Some(accessed) = self.accessed {
            times = times.set_accessed(accessed);
        }
        File::open(path)?.set_times(times)?;

        #[cfg(unix)]
        if let Some(mode) = self.permissions {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }

        Ok(())
    }
}

/// Whole seconds since the Unix epoch, negative for earlier times.
pub fn epoch_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

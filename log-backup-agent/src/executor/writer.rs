//! Writes timestamped backup copies of the source file.

use crate::fs::metadata::FileMetadata;
use crate::utils::errors::{AgentError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Filename-safe UTC timestamp format (no colons, one-second resolution)
pub const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Separator between the source basename and the stamp
const NAME_SEPARATOR: &str = "__";

/// A backup that has been written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenBackup {
    pub dest_path: PathBuf,
    pub size_bytes: u64,
    /// Stamp used in the file name, including any collision suffix
    pub stamp: String,
}

/// Format a timestamp for use in a backup file name, e.g. `2025-11-06T13-22-09Z`.
pub fn utc_stamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(STAMP_FORMAT).to_string()
}

/// Backup file name: `<basename>__<stamp>`
pub fn backup_file_name(source: &Path, stamp: &str) -> String {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_string());
    format!("{}{}{}", base, NAME_SEPARATOR, stamp)
}

/// Pick a destination that does not exist yet.
///
/// Two changes within the same second share a stamp; later ones get a
/// `-1`, `-2`, ... suffix instead of overwriting the earlier copy.
fn unique_destination(source: &Path, backup_dir: &Path, stamp: &str) -> (PathBuf, String) {
    let mut candidate_stamp = stamp.to_string();
    let mut attempt = 0u32;

    loop {
        let dest = backup_dir.join(backup_file_name(source, &candidate_stamp));
        if !dest.exists() {
            return (dest, candidate_stamp);
        }
        attempt += 1;
        candidate_stamp = format!("{}-{}", stamp, attempt);
    }
}

/// Copy `source` into `backup_dir` under a timestamped name.
///
/// Mode and timestamps of the source are carried over to the copy.
pub fn write_backup(
    source: &Path,
    backup_dir: &Path,
    timestamp: DateTime<Utc>,
) -> Result<WrittenBackup> {
    fs::create_dir_all(backup_dir).map_err(copy_err(backup_dir))?;

    let (dest_path, stamp) = unique_destination(source, backup_dir, &utc_stamp(timestamp));
    debug!("Copying {} -> {}", source.display(), dest_path.display());

    fs::copy(source, &dest_path).map_err(copy_err(&dest_path))?;

    match FileMetadata::from_path(source) {
        Ok(metadata) => {
            if let Err(e) = metadata.apply_to_path(&dest_path) {
                warn!(
                    "Could not preserve metadata on {}: {}",
                    dest_path.display(),
                    e
                );
            }
        }
        Err(e) => warn!(
            "Could not read source metadata for {}: {}",
            source.display(),
            e
        ),
    }

    let size_bytes = fs::metadata(&dest_path)
        .map_err(copy_err(&dest_path))?
        .len();

    Ok(WrittenBackup {
        dest_path,
        size_bytes,
        stamp,
    })
}

fn copy_err(dest: &Path) -> impl FnOnce(io::Error) -> AgentError {
    let dest = dest.to_path_buf();
    move |source| AgentError::Copy { dest, source }
}

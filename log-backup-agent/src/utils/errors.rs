//! Custom error types for the log backup agent.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot read metadata for {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot hash {}: {source}", .path.display())]
    Hash {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot copy backup to {}: {source}", .dest.display())]
    Copy {
        dest: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("State file I/O error on {}: {source}", .path.display())]
    StateIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("State file {} is not valid JSON: {source}", .path.display())]
    StateFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AgentError {
    /// Classify a failed `stat` call on the source file.
    pub fn from_stat(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            AgentError::NotFound(path)
        } else {
            AgentError::Stat { path, source }
        }
    }

    /// Whether the poll loop should simply try again on the next interval.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::NotFound(_)
                | AgentError::Stat { .. }
                | AgentError::Hash { .. }
                | AgentError::Copy { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

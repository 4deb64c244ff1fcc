//! Log Backup Agent Library
//!
//! Polls a single log file and keeps a timestamped copy of every distinct
//! version, with enough persisted state to survive restarts.

pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupExecutor, LoopPhase, PollOutcome};
pub use state::{BackupRecord, PersistedState, StateStore};
pub use utils::errors::{AgentError, Result};

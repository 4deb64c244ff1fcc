//! Process lifecycle: signal handling and shutdown.

pub mod shutdown;

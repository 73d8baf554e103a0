//! parsync library
//!
//! Runs one rsync synchronization as several rsync processes working on
//! disjoint parts of the file list, and shows their progress as one.

pub mod cli;
pub mod config;
pub mod display;
pub mod executor;
pub mod rsync;
pub mod shutdown;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use crate::config::Config;
pub use display::IndicatifSink;
pub use executor::Syncer;
pub use rsync::RsyncCommand;
pub use utils::errors::SyncError;
pub type Result<T> = std::result::Result<T, SyncError>;

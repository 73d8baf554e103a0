//! Utility modules for parsync.

pub mod errors;
pub mod logger;

pub use errors::{Result, SyncError};

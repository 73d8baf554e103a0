//! Parallel rsync execution.
//!
//! - [`manifest`]: the dry-run listing and how it is split into batches
//! - [`job`]: one rsync process per batch and its progress estimate
//! - [`syncer`]: listing, fan-out of jobs and aggregation of their progress

pub mod job;
pub mod manifest;
pub mod syncer;

#[cfg(test)]
pub(crate) mod testing;

pub use job::{EstimateTuning, Job, JobEvent, JobState, JobStatus};
pub use manifest::{partition, ManifestEntry};
pub use syncer::{Aggregate, SyncMonitor, Syncer, TransferSummary};

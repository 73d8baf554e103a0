//! Error types for parsync.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error collecting list of files for synchronization: rc={exit_code}")]
    ListingFailed { exit_code: i32 },

    #[error("Nothing to do - no files to sync")]
    EmptyManifest,

    #[error("Error running rsync: rc={exit_code}")]
    TransferFailed { exit_code: i32 },

    #[error("{failed} of {total} jobs failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("Wrong rate format {0}")]
    MalformedRate(String),

    #[error("Job #{job} has already finished")]
    JobFinished { job: usize },

    #[error("Interrupted")]
    Interrupted,
}

impl From<::config::ConfigError> for SyncError {
    fn from(err: ::config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

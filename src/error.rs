use thiserror::Error;

/// Failures surfaced by [`crate::sync::ProgressSync`].
///
/// Validation failures are raised before anything is written. Storage failures
/// are passed through unchanged; nothing is retried.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("invalid progress {value}: must be between 0 and 100")]
    Validation { value: i64 },

    #[error("task '{0}' not found")]
    NotFound(String),

    #[error("storage error: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

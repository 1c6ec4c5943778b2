//! Upload error types.

use avatar_batch_progress::StoreError;

/// Errors produced while running a batch upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("an upload is already in progress")]
    AlreadyInProgress,

    #[error("upload pipeline is busy")]
    UploadInProgress,

    #[error("login failed: {0}")]
    Login(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("platform switch failed: {0}")]
    PlatformSwitch(String),

    #[error("tag failed: {0}")]
    Tag(String),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("cancelled")]
    Cancelled,

    #[error("progress store error: {0}")]
    Store(#[from] StoreError),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

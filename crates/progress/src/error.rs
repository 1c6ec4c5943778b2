//! Progress persistence errors.

/// Errors produced while loading or persisting a [`ProgressStore`](crate::ProgressStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported progress format version {found} (max supported {supported})")]
    UnsupportedFormat { found: u32, supported: u32 },
}

//! Host environment hooks: open-document snapshot and user prompts.

use avatar_batch_progress::EnvironmentSnapshot;

use crate::error::UploadError;

/// Captures and restores the host's open documents around a run.
pub trait Environment: Send + Sync {
    fn capture_open_documents(&self) -> EnvironmentSnapshot;

    fn restore(&self, snapshot: &EnvironmentSnapshot) -> Result<(), UploadError>;
}

/// Modal user interaction.
pub trait Prompt: Send + Sync {
    /// Asks a yes/no question. Only used when resuming after a suspected crash.
    fn confirm(&self, title: &str, message: &str) -> bool;

    /// Shows a blocking notice (login failure).
    fn notify(&self, title: &str, message: &str);
}

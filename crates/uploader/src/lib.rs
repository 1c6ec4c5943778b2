//! Batch avatar upload orchestration.
//!
//! This crate implements the **sequencer** that walks an
//! avatars × platforms matrix one upload at a time. It is a library crate
//! with no UI or vendor dependencies: the host provides implementations of
//! [`AvatarUploadClient`], [`PlatformSwitcher`], [`Environment`] and
//! [`Prompt`] that bridge to the real build/upload tooling.
//!
//! # Step
//!
//! 1. **Advance** — pick the next unfinished platform when a pass is done
//! 2. **Switch** — request a platform switch and suspend until reload
//! 3. **Throttle** — wait the configured sleep interval
//! 4. **Ready** — poll the client until the builder is ready, then log in
//! 5. **Upload** — upload the avatar under the cursor, with retries
//! 6. **Persist** — advance the cursor and save progress
//!
//! Every step persists before its externally visible side effect, so the
//! loop can be re-entered from cold start via
//! [`UploadOrchestrator::resume_if_pending`].

pub mod client;
pub mod error;
pub mod events;
pub mod host;
pub mod orchestrator;
pub mod tagger;
pub mod versioning;

#[cfg(test)]
mod test_support;

// Re-export primary types for convenience.
pub use client::{AvatarUploadClient, BoxFuture, PlatformSwitcher, UploadReceipt, UploadRequest};
pub use error::UploadError;
pub use events::{EventBus, EventCallback, UploadEvent};
pub use host::{Environment, Prompt};
pub use orchestrator::{
    CancelHandle, Collaborators, IN_PROGRESS_FLAG, RunOutcome, UploadOrchestrator,
};
pub use tagger::{GitTagger, Tagger};
pub use versioning::{bump_description_version, description_version, tag_name};

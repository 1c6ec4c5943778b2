//! Durable progress state for batch avatar uploads.
//!
//! This crate owns everything that must survive a crash or an environment
//! reload while a batch run is in flight:
//!
//! - [`ProgressStore`] — the job queue, the `(platform, avatar)` cursor and
//!   the append-only error log.
//! - [`ProgressRepository`] — the single slot the store lives in. Its mere
//!   existence is the "run in progress or interrupted" signal.
//! - [`SessionFlags`] — volatile, process-lifetime flags used as the crash
//!   detector.
//!
//! It has no async or transport dependencies; the orchestrator in
//! `avatar-batch-uploader` drives it.

pub mod error;
pub mod repository;
pub mod session;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use repository::{
    FileProgressRepository, MemoryProgressRepository, ProgressRepository, default_progress_path,
};
pub use session::{MemorySessionFlags, SessionFlags};
pub use store::{FORMAT_VERSION, ProgressStore};
pub use types::{
    AvatarRef, EnvironmentSnapshot, ErrorRecord, ImageMode, PlatformId, PlatformSettings,
    TagRequest, UploadJob,
};

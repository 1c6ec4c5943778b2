//! Upload client and platform switcher traits.
//!
//! Implemented by the host to bridge the orchestrator to the real avatar
//! build/upload tooling. Using traits keeps the sequencing logic decoupled
//! from any vendor SDK and testable with mocks.

use std::future::Future;
use std::pin::Pin;

use avatar_batch_progress::{PlatformId, PlatformSettings, UploadJob};
use tokio_util::sync::CancellationToken;

use crate::error::UploadError;

/// Boxed, sendable future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One avatar upload on one platform.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub job: UploadJob,
    pub platform: PlatformId,
    pub settings: PlatformSettings,
    /// Description to publish; already carries the bumped version marker
    /// when `settings.bump_version` is set.
    pub description: String,
    /// Version number parsed or bumped from the description marker.
    pub version: Option<u32>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Identifier assigned by the remote service, if reported.
    pub remote_id: Option<String>,
}

/// Performs the opaque build-and-upload operation.
pub trait AvatarUploadClient: Send + Sync {
    /// Returns true once the builder can accept an upload.
    fn is_ready(&self) -> BoxFuture<'_, bool>;

    /// Ensures a user session exists. Fails with [`UploadError::Login`].
    fn login(&self) -> BoxFuture<'_, Result<(), UploadError>>;

    /// Builds and uploads a single avatar on the currently active platform.
    fn upload_single<'a>(
        &'a self,
        request: &'a UploadRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<UploadReceipt, UploadError>>;
}

/// Reads and changes the active build platform.
pub trait PlatformSwitcher: Send + Sync {
    /// Returns the platform the environment is currently building for.
    fn current_platform(&self) -> PlatformId;

    /// Requests a switch to `target`. Fire-and-forget: the current process
    /// context is expected to be torn down by an environment reload shortly
    /// after, so callers must not rely on anything running afterwards.
    fn request_switch(&self, target: PlatformId) -> Result<(), UploadError>;
}

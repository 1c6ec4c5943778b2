//! Observer notifications emitted by the orchestrator.
//!
//! Delivery is best-effort: a panicking subscriber is logged and skipped,
//! never propagated to the publisher.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::RwLock;

use avatar_batch_progress::{AvatarRef, ErrorRecord, PlatformId};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Progress event emitted during a batch run.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// An avatar upload is about to start.
    UploadStarted {
        avatar: AvatarRef,
        platform: PlatformId,
    },
    /// An avatar was uploaded successfully.
    UploadFinished {
        avatar: AvatarRef,
        platform: PlatformId,
    },
    /// An avatar upload failed after all retries.
    UploadFailed {
        avatar: AvatarRef,
        platform: PlatformId,
        error: String,
    },
    /// A platform switch was requested; the host is expected to reload.
    PlatformSwitchRequested { from: PlatformId, to: PlatformId },
    /// The run ended. `errors` is the full error log of the run.
    RunFinished {
        success: bool,
        errors: Vec<ErrorRecord>,
    },
    /// Login failed; the run is aborted.
    LoginFailed { error: String },
    /// An unexpected error aborted the run.
    UnexpectedError { error: String },
}

/// Subscriber callback.
pub type EventCallback = Box<dyn Fn(&UploadEvent) + Send + Sync>;

/// Registry of event subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<EventCallback>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback.
    ///
    /// Callbacks run synchronously on the orchestrator task and must not
    /// subscribe from inside a callback.
    pub fn subscribe(&self, callback: EventCallback) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }

    /// Registers a channel subscriber and returns its receiver.
    ///
    /// Events that do not fit in the channel are dropped with a warning.
    pub fn subscribe_channel(&self, capacity: usize) -> mpsc::Receiver<UploadEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribe(Box::new(move |event| {
            if let Err(e) = tx.try_send(event.clone()) {
                warn!("failed to forward upload event: {e}");
            }
        }));
        rx
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `event` to every subscriber.
    pub fn emit(&self, event: &UploadEvent) {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        for (index, callback) in subscribers.iter().enumerate() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                error!(subscriber = index, event = ?event, "event subscriber panicked: {reason}");
            }
        }
    }
}

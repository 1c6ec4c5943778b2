//! Resumable sequencer over the avatars × platforms matrix.
//!
//! The loop runs one `(platform, avatar)` upload at a time. Every step is a
//! pure function of the persisted [`ProgressStore`], so it can be re-entered
//! from a cold start after a crash or an environment reload.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use avatar_batch_progress::{
    ErrorRecord, PlatformId, ProgressRepository, ProgressStore, SessionFlags, UploadJob,
};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{AvatarUploadClient, PlatformSwitcher, UploadReceipt, UploadRequest};
use crate::error::UploadError;
use crate::events::{EventBus, EventCallback, UploadEvent};
use crate::host::{Environment, Prompt};
use crate::tagger::Tagger;
use crate::versioning::{bump_description_version, description_version, tag_name};

/// Session flag set while this process owns a run. A persisted store
/// without it means the previous process died mid-run.
pub const IN_PROGRESS_FLAG: &str = "avatar-batch.upload-in-progress";

/// Default builder readiness poll interval.
const DEFAULT_READY_POLL: Duration = Duration::from_millis(100);

/// How a call to [`UploadOrchestrator::start`] or
/// [`UploadOrchestrator::resume_if_pending`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Nothing was pending, or the user abandoned an interrupted run.
    Idle,
    /// A platform switch was requested. The host must reload and call
    /// `resume_if_pending` again.
    Suspended { target: PlatformId },
    /// The run is over and its progress record deleted.
    Finished {
        success: bool,
        errors: Vec<ErrorRecord>,
    },
}

enum Step {
    Continue,
    Suspend(PlatformId),
    Finish(bool),
}

/// Cloneable handle that requests cooperative cancellation of the current run.
#[derive(Clone, Default)]
pub struct CancelHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    /// Requests cancellation. Takes effect at the next suspension point.
    pub fn cancel(&self) {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_cancelled()
    }

    fn token(&self) -> CancellationToken {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn reset(&self) {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = CancellationToken::new();
    }
}

/// Host-provided collaborators.
pub struct Collaborators {
    pub repository: Arc<dyn ProgressRepository>,
    pub flags: Arc<dyn SessionFlags>,
    pub client: Arc<dyn AvatarUploadClient>,
    pub switcher: Arc<dyn PlatformSwitcher>,
    pub environment: Arc<dyn Environment>,
    pub prompt: Arc<dyn Prompt>,
}

/// Drives batch uploads across platforms.
pub struct UploadOrchestrator {
    repo: Arc<dyn ProgressRepository>,
    flags: Arc<dyn SessionFlags>,
    client: Arc<dyn AvatarUploadClient>,
    switcher: Arc<dyn PlatformSwitcher>,
    environment: Arc<dyn Environment>,
    prompt: Arc<dyn Prompt>,
    tagger: Option<Arc<dyn Tagger>>,
    events: EventBus,
    cancel: CancelHandle,
    pipeline: Semaphore,
    ready_poll: Duration,
}

impl UploadOrchestrator {
    /// Creates a new orchestrator.
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            repo: collaborators.repository,
            flags: collaborators.flags,
            client: collaborators.client,
            switcher: collaborators.switcher,
            environment: collaborators.environment,
            prompt: collaborators.prompt,
            tagger: None,
            events: EventBus::new(),
            cancel: CancelHandle::default(),
            pipeline: Semaphore::new(1),
            ready_poll: DEFAULT_READY_POLL,
        }
    }

    /// Enables tag-on-success for jobs that request it.
    pub fn with_tagger(mut self, tagger: Arc<dyn Tagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// Sets how often the client is polled while waiting for readiness.
    pub fn with_ready_poll_interval(mut self, interval: Duration) -> Self {
        self.ready_poll = interval;
        self
    }

    /// Registers an event callback.
    pub fn subscribe(&self, callback: EventCallback) {
        self.events.subscribe(callback);
    }

    /// Registers a channel subscriber and returns its receiver.
    pub fn subscribe_channel(&self, capacity: usize) -> mpsc::Receiver<UploadEvent> {
        self.events.subscribe_channel(capacity)
    }

    /// Returns a handle that can cancel the current run.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Requests cooperative cancellation of the current run.
    pub fn cancel(&self) {
        info!("upload cancellation requested");
        self.cancel.cancel();
    }

    /// Returns true while a progress record exists, whether or not this
    /// process is the one running it.
    pub fn is_in_progress(&self) -> bool {
        self.repo.exists()
    }

    /// Starts a new run.
    ///
    /// Fails with [`UploadError::AlreadyInProgress`] if a progress record
    /// already exists; the existing record is left untouched.
    pub async fn start(&self, mut store: ProgressStore) -> Result<RunOutcome, UploadError> {
        let _permit = self
            .pipeline
            .try_acquire()
            .map_err(|_| UploadError::UploadInProgress)?;

        if self.repo.exists() {
            return Err(UploadError::AlreadyInProgress);
        }

        if store.saved_environment.is_none() {
            store.saved_environment = Some(self.environment.capture_open_documents());
        }
        if self.cancel.is_cancelled() {
            // Stale request from a previous run.
            self.cancel.reset();
        }

        self.repo.save(&store)?;
        self.flags.set_flag(IN_PROGRESS_FLAG);
        info!(
            avatars = store.avatar_queue.len(),
            platforms = ?store.platform_queue,
            strict = store.strict_mode,
            retries = store.retry_count,
            "batch upload started"
        );

        Ok(self.run(store).await)
    }

    /// Continues a persisted run, if any.
    ///
    /// Call once at process start and after every environment reload. When
    /// the session flag is missing the previous process crashed, and the
    /// user is asked whether to resume or abandon.
    pub async fn resume_if_pending(&self) -> Result<RunOutcome, UploadError> {
        let _permit = self
            .pipeline
            .try_acquire()
            .map_err(|_| UploadError::UploadInProgress)?;

        let Some(mut store) = self.repo.load()? else {
            return Ok(RunOutcome::Idle);
        };

        if !self.flags.get_flag(IN_PROGRESS_FLAG) {
            let platform = store
                .cursor_platform
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".into());
            warn!(
                platform = %platform,
                index = store.cursor_avatar_index,
                "found interrupted batch upload"
            );
            let message = format!(
                "A batch upload was interrupted ({} of {} uploads done, platform {platform}). Resume it?",
                store.completed_uploads(),
                store.total_uploads(),
            );
            if !self.prompt.confirm("Resume batch upload", &message) {
                info!("interrupted batch upload abandoned");
                self.repo.delete()?;
                return Ok(RunOutcome::Idle);
            }
            // The previous process may have died before its switch request
            // landed, so the request is issued again.
            if store.pending_switch.take().is_some() {
                self.repo.save(&store)?;
            }
            self.flags.set_flag(IN_PROGRESS_FLAG);
        }

        info!(
            platform = ?store.cursor_platform,
            index = store.cursor_avatar_index,
            "resuming batch upload"
        );
        Ok(self.run(store).await)
    }

    /// Deletes the persisted record without running it.
    pub fn abandon(&self) -> Result<(), UploadError> {
        let _permit = self
            .pipeline
            .try_acquire()
            .map_err(|_| UploadError::UploadInProgress)?;
        self.repo.delete()?;
        self.flags.erase_flag(IN_PROGRESS_FLAG);
        info!("batch upload abandoned");
        Ok(())
    }

    async fn run(&self, mut store: ProgressStore) -> RunOutcome {
        let cancel = self.cancel.token();
        loop {
            match self.step(&mut store, &cancel).await {
                Ok(Step::Continue) => {}
                Ok(Step::Suspend(target)) => {
                    info!(target = %target, "suspended for platform switch");
                    return RunOutcome::Suspended { target };
                }
                Ok(Step::Finish(success)) => return self.finish(store, success),
                Err(e) => {
                    self.record_fatal(&mut store, e);
                    return self.finish(store, false);
                }
            }
        }
    }

    async fn step(
        &self,
        store: &mut ProgressStore,
        cancel: &CancellationToken,
    ) -> Result<Step, UploadError> {
        if store.avatar_queue.is_empty() {
            return Ok(Step::Finish(true));
        }

        if store.is_pass_complete() {
            loop {
                match store.advance_platform() {
                    None => {
                        self.repo.save(store)?;
                        return Ok(Step::Finish(true));
                    }
                    Some(p) if !store.has_enabled_jobs(p) => {
                        info!(platform = %p, "no avatars enabled, skipping platform");
                    }
                    Some(p) => {
                        info!(platform = %p, "starting platform pass");
                        break;
                    }
                }
            }
            self.repo.save(store)?;
        }

        let target = store
            .cursor_platform
            .ok_or_else(|| UploadError::Unexpected("cursor has no platform".into()))?;

        let active = self.switcher.current_platform();
        if active != target {
            check_cancelled(cancel)?;
            if store.pending_switch == Some(target) {
                return Err(UploadError::PlatformSwitch(format!(
                    "switch to {target} did not take effect (active platform is {active})"
                )));
            }
            store.pending_switch = Some(target);
            self.repo.save(store)?;
            info!(from = %active, to = %target, "requesting platform switch");
            self.events.emit(&UploadEvent::PlatformSwitchRequested {
                from: active,
                to: target,
            });
            self.switcher.request_switch(target)?;
            return Ok(Step::Suspend(target));
        }
        if store.pending_switch.take().is_some() {
            debug!(platform = %target, "platform switch confirmed");
            self.repo.save(store)?;
        }

        let job = store
            .current_job()
            .cloned()
            .ok_or_else(|| UploadError::Unexpected("cursor points past the queue".into()))?;

        if !job.is_enabled_for(target) {
            debug!(avatar = %job.avatar, platform = %target, "avatar disabled for platform, skipping");
            store.advance_avatar();
            self.repo.save(store)?;
            return Ok(Step::Continue);
        }

        self.sleep(store.sleep_interval, cancel).await?;
        self.wait_until_ready(cancel).await?;
        self.client.login().await.map_err(|e| match e {
            UploadError::Login(_) => e,
            other => UploadError::Login(other.to_string()),
        })?;

        let request = build_request(&job, target);
        self.events.emit(&UploadEvent::UploadStarted {
            avatar: job.avatar.clone(),
            platform: target,
        });

        match self.upload_with_retries(&request, store.retry_count, cancel).await {
            Ok(receipt) => {
                info!(
                    avatar = %job.avatar,
                    platform = %target,
                    remote_id = ?receipt.remote_id,
                    "avatar uploaded"
                );
                self.events.emit(&UploadEvent::UploadFinished {
                    avatar: job.avatar.clone(),
                    platform: target,
                });
                self.tag_upload(&request).await;
            }
            Err(UploadError::Cancelled) => return Err(UploadError::Cancelled),
            Err(e) => {
                let message = e.to_string();
                error!(avatar = %job.avatar, platform = %target, error = %message, "avatar upload failed");
                store.record_error(ErrorRecord::avatar(target, job.avatar.clone(), message.clone()));
                self.repo.save(store)?;
                self.events.emit(&UploadEvent::UploadFailed {
                    avatar: job.avatar.clone(),
                    platform: target,
                    error: message,
                });
                if store.strict_mode {
                    warn!(avatar = %job.avatar, "strict mode: aborting run");
                    return Ok(Step::Finish(false));
                }
            }
        }

        store.advance_avatar();
        self.repo.save(store)?;
        Ok(Step::Continue)
    }

    async fn upload_with_retries(
        &self,
        request: &UploadRequest,
        retries: u32,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, UploadError> {
        let mut attempt = 0;
        loop {
            match self.client.upload_single(request, cancel.clone()).await {
                Ok(receipt) => return Ok(receipt),
                Err(_) if cancel.is_cancelled() => return Err(UploadError::Cancelled),
                Err(e) if attempt < retries => {
                    attempt += 1;
                    warn!(
                        avatar = %request.job.avatar,
                        platform = %request.platform,
                        attempt,
                        retries,
                        "upload failed, retrying: {e}"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn tag_upload(&self, request: &UploadRequest) {
        let (Some(tag), Some(tagger)) = (&request.settings.tag, &self.tagger) else {
            return;
        };
        let name = tag_name(tag, &request.job.avatar, request.platform, request.version);
        let message = format!("Uploaded {} for {}", request.job.avatar, request.platform);
        if let Err(e) = tagger.tag(&name, &message).await {
            warn!(tag = %name, "failed to tag upload: {e}");
        }
    }

    async fn sleep(&self, interval: Duration, cancel: &CancellationToken) -> Result<(), UploadError> {
        check_cancelled(cancel)?;
        if interval.is_zero() {
            return Ok(());
        }
        debug!(ms = interval.as_millis() as u64, "throttling before next upload");
        tokio::select! {
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            _ = tokio::time::sleep(interval) => Ok(()),
        }
    }

    async fn wait_until_ready(&self, cancel: &CancellationToken) -> Result<(), UploadError> {
        loop {
            check_cancelled(cancel)?;
            if self.client.is_ready().await {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(self.ready_poll) => {}
            }
        }
    }

    /// Records a run-ending error and notifies observers.
    fn record_fatal(&self, store: &mut ProgressStore, err: UploadError) {
        let message = err.to_string();
        store.record_error(ErrorRecord::platform(store.cursor_platform, message.clone()));
        if let Err(e) = self.repo.save(store) {
            error!("failed to persist error record: {e}");
        }

        match err {
            UploadError::Cancelled => info!("batch upload cancelled"),
            UploadError::Login(_) => {
                error!(error = %message, "login failed, aborting batch upload");
                self.events.emit(&UploadEvent::LoginFailed {
                    error: message.clone(),
                });
                self.prompt.notify("Login failed", &message);
            }
            _ => {
                error!(error = %message, "batch upload aborted");
                self.events
                    .emit(&UploadEvent::UnexpectedError { error: message });
            }
        }
    }

    fn finish(&self, store: ProgressStore, success: bool) -> RunOutcome {
        info!(
            success,
            errors = store.errors.len(),
            finished = ?store.finished_platforms,
            "batch upload finished"
        );
        self.events.emit(&UploadEvent::RunFinished {
            success,
            errors: store.errors.clone(),
        });
        self.flags.erase_flag(IN_PROGRESS_FLAG);
        if let Err(e) = self.repo.delete() {
            error!("failed to delete upload progress: {e}");
        }
        if let Some(snapshot) = &store.saved_environment
            && let Err(e) = self.environment.restore(snapshot)
        {
            warn!("failed to restore environment: {e}");
        }
        self.cancel.reset();
        RunOutcome::Finished {
            success,
            errors: store.errors,
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), UploadError> {
    if cancel.is_cancelled() {
        Err(UploadError::Cancelled)
    } else {
        Ok(())
    }
}

fn build_request(job: &UploadJob, platform: PlatformId) -> UploadRequest {
    let settings = job.settings_for(platform).clone();
    let (description, version) = if settings.bump_version {
        let (description, version) = bump_description_version(&job.description);
        (description, Some(version))
    } else {
        (job.description.clone(), description_version(&job.description))
    };
    UploadRequest {
        job: job.clone(),
        platform,
        settings,
        description,
        version,
    }
}

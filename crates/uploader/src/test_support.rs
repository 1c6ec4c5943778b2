//! Mock collaborators shared by the orchestrator tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use avatar_batch_progress::{
    AvatarRef, EnvironmentSnapshot, MemoryProgressRepository, MemorySessionFlags, PlatformId,
    ProgressRepository, ProgressStore, StoreError, UploadJob,
};
use tokio_util::sync::CancellationToken;

use crate::client::{AvatarUploadClient, BoxFuture, PlatformSwitcher, UploadReceipt, UploadRequest};
use crate::error::UploadError;
use crate::events::UploadEvent;
use crate::host::{Environment, Prompt};
use crate::orchestrator::{Collaborators, UploadOrchestrator};
use crate::tagger::Tagger;

pub fn job(id: &str) -> UploadJob {
    UploadJob::new(AvatarRef::new(id, id.to_uppercase()))
}

pub fn started(id: &str, platform: PlatformId) -> UploadEvent {
    UploadEvent::UploadStarted {
        avatar: AvatarRef::new(id, id.to_uppercase()),
        platform,
    }
}

pub fn finished(id: &str, platform: PlatformId) -> UploadEvent {
    UploadEvent::UploadFinished {
        avatar: AvatarRef::new(id, id.to_uppercase()),
        platform,
    }
}

/// Memory repository that keeps a copy of every saved store.
#[derive(Default)]
pub struct RecordingRepository {
    inner: MemoryProgressRepository,
    saves: Mutex<Vec<ProgressStore>>,
}

impl RecordingRepository {
    pub fn all(&self) -> Vec<ProgressStore> {
        self.saves.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<ProgressStore> {
        self.saves.lock().unwrap().last().cloned()
    }
}

impl ProgressRepository for RecordingRepository {
    fn load(&self) -> Result<Option<ProgressStore>, StoreError> {
        self.inner.load()
    }

    fn save(&self, store: &ProgressStore) -> Result<(), StoreError> {
        self.saves.lock().unwrap().push(store.clone());
        self.inner.save(store)
    }

    fn delete(&self) -> Result<(), StoreError> {
        self.inner.delete()
    }

    fn exists(&self) -> bool {
        self.inner.exists()
    }
}

#[derive(Default)]
struct ClientState {
    uploads: Vec<(String, PlatformId)>,
    descriptions: Vec<String>,
    failures: HashMap<(String, PlatformId), u32>,
    login_fails: bool,
    not_ready_polls: u32,
    ready_polls: u32,
    honor_cancel: bool,
}

/// Upload client that records calls and fails on demand.
#[derive(Default)]
pub struct MockClient {
    state: Mutex<ClientState>,
}

impl MockClient {
    /// Fails the first `times` upload attempts of `id` on `platform`.
    pub fn fail(&self, id: &str, platform: PlatformId, times: u32) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((id.to_string(), platform), times);
    }

    /// Makes uploads fail once their cancellation token has fired.
    pub fn honor_cancel(&self) {
        self.state.lock().unwrap().honor_cancel = true;
    }

    pub fn login_ok(&self, ok: bool) {
        self.state.lock().unwrap().login_fails = !ok;
    }

    /// Reports not-ready for the first `polls` readiness checks.
    pub fn ready_after(&self, polls: u32) {
        self.state.lock().unwrap().not_ready_polls = polls;
    }

    pub fn ready_polls(&self) -> u32 {
        self.state.lock().unwrap().ready_polls
    }

    pub fn uploads(&self) -> Vec<(String, PlatformId)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn upload_ids(&self) -> Vec<String> {
        self.uploads().into_iter().map(|(id, _)| id).collect()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.state.lock().unwrap().descriptions.clone()
    }
}

impl AvatarUploadClient for MockClient {
    fn is_ready(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.ready_polls += 1;
            if state.not_ready_polls > 0 {
                state.not_ready_polls -= 1;
                false
            } else {
                true
            }
        })
    }

    fn login(&self) -> BoxFuture<'_, Result<(), UploadError>> {
        Box::pin(async move {
            if self.state.lock().unwrap().login_fails {
                Err(UploadError::Login("no user session".into()))
            } else {
                Ok(())
            }
        })
    }

    fn upload_single<'a>(
        &'a self,
        request: &'a UploadRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<UploadReceipt, UploadError>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let key = (request.job.avatar.id.clone(), request.platform);
            state.uploads.push(key.clone());
            state.descriptions.push(request.description.clone());
            if state.honor_cancel && cancel.is_cancelled() {
                return Err(UploadError::Upload("aborted".into()));
            }
            if let Some(remaining) = state.failures.get_mut(&key)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(UploadError::Upload(format!("{} rejected", key.0)));
            }
            Ok(UploadReceipt {
                remote_id: Some(format!("avtr_{}", key.0)),
            })
        })
    }
}

struct SwitcherState {
    current: PlatformId,
    apply: bool,
    fail: bool,
    requests: Vec<PlatformId>,
}

/// Platform switcher whose "reload" is applied immediately.
pub struct MockSwitcher {
    state: Mutex<SwitcherState>,
}

impl Default for MockSwitcher {
    fn default() -> Self {
        Self {
            state: Mutex::new(SwitcherState {
                current: PlatformId::Desktop,
                apply: true,
                fail: false,
                requests: Vec::new(),
            }),
        }
    }
}

impl MockSwitcher {
    pub fn apply_switches(&self, apply: bool) {
        self.state.lock().unwrap().apply = apply;
    }

    pub fn fail_requests(&self, fail: bool) {
        self.state.lock().unwrap().fail = fail;
    }

    pub fn requests(&self) -> Vec<PlatformId> {
        self.state.lock().unwrap().requests.clone()
    }
}

impl PlatformSwitcher for MockSwitcher {
    fn current_platform(&self) -> PlatformId {
        self.state.lock().unwrap().current
    }

    fn request_switch(&self, target: PlatformId) -> Result<(), UploadError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(target);
        if state.fail {
            return Err(UploadError::PlatformSwitch("build target unavailable".into()));
        }
        if state.apply {
            state.current = target;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockEnvironment {
    restored: Mutex<Vec<EnvironmentSnapshot>>,
}

impl MockEnvironment {
    pub fn snapshot() -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            open_documents: vec!["Scenes/Avatars.unity".into()],
            active_document: None,
        }
    }

    pub fn restored(&self) -> Vec<EnvironmentSnapshot> {
        self.restored.lock().unwrap().clone()
    }
}

impl Environment for MockEnvironment {
    fn capture_open_documents(&self) -> EnvironmentSnapshot {
        Self::snapshot()
    }

    fn restore(&self, snapshot: &EnvironmentSnapshot) -> Result<(), UploadError> {
        self.restored.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

pub struct MockPrompt {
    answer: Mutex<bool>,
    confirms: Mutex<u32>,
    notices: Mutex<Vec<String>>,
}

impl Default for MockPrompt {
    fn default() -> Self {
        Self {
            answer: Mutex::new(true),
            confirms: Mutex::new(0),
            notices: Mutex::new(Vec::new()),
        }
    }
}

impl MockPrompt {
    pub fn answer(&self, yes: bool) {
        *self.answer.lock().unwrap() = yes;
    }

    pub fn confirms(&self) -> u32 {
        *self.confirms.lock().unwrap()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

impl Prompt for MockPrompt {
    fn confirm(&self, _title: &str, _message: &str) -> bool {
        *self.confirms.lock().unwrap() += 1;
        *self.answer.lock().unwrap()
    }

    fn notify(&self, _title: &str, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
pub struct MockTagger {
    names: Mutex<Vec<String>>,
    fail: bool,
}

impl MockTagger {
    pub fn failing() -> Self {
        Self {
            names: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

impl Tagger for MockTagger {
    fn tag<'a>(&'a self, name: &'a str, _message: &'a str) -> BoxFuture<'a, Result<(), UploadError>> {
        Box::pin(async move {
            if self.fail {
                return Err(UploadError::Tag("tag already exists".into()));
            }
            self.names.lock().unwrap().push(name.to_string());
            Ok(())
        })
    }
}

/// Collected events from a subscriber.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<UploadEvent>>>,
}

impl EventLog {
    pub fn take(&self) -> Vec<UploadEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

/// Orchestrator wired to mocks.
pub struct Harness {
    pub orch: UploadOrchestrator,
    pub repo: Arc<RecordingRepository>,
    pub flags: Arc<MemorySessionFlags>,
    pub client: Arc<MockClient>,
    pub switcher: Arc<MockSwitcher>,
    pub environment: Arc<MockEnvironment>,
    pub prompt: Arc<MockPrompt>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            Arc::new(RecordingRepository::default()),
            Arc::new(MemorySessionFlags::new()),
            Arc::new(MockClient::default()),
            Arc::new(MockSwitcher::default()),
            Arc::new(MockEnvironment::default()),
            Arc::new(MockPrompt::default()),
        )
    }

    fn build(
        repo: Arc<RecordingRepository>,
        flags: Arc<MemorySessionFlags>,
        client: Arc<MockClient>,
        switcher: Arc<MockSwitcher>,
        environment: Arc<MockEnvironment>,
        prompt: Arc<MockPrompt>,
    ) -> Self {
        let orch = UploadOrchestrator::new(Collaborators {
            repository: repo.clone(),
            flags: flags.clone(),
            client: client.clone(),
            switcher: switcher.clone(),
            environment: environment.clone(),
            prompt: prompt.clone(),
        })
        .with_ready_poll_interval(Duration::from_millis(10));
        Self {
            orch,
            repo,
            flags,
            client,
            switcher,
            environment,
            prompt,
        }
    }

    /// Same collaborators and storage, new process-local flags: a restart.
    pub fn with_flags(&self, flags: Arc<MemorySessionFlags>) -> Self {
        Self::build(
            self.repo.clone(),
            flags,
            self.client.clone(),
            self.switcher.clone(),
            self.environment.clone(),
            self.prompt.clone(),
        )
    }

    pub fn with_tagger(self, tagger: Arc<dyn Tagger>) -> Self {
        Self {
            orch: self.orch.with_tagger(tagger),
            ..self
        }
    }

    pub fn event_log(&self) -> EventLog {
        let log = EventLog::default();
        let events = log.events.clone();
        self.orch.subscribe(Box::new(move |event| {
            events.lock().unwrap().push(event.clone());
        }));
        log
    }

    pub fn recorded_saves(&self) -> Arc<RecordingRepository> {
        self.repo.clone()
    }
}

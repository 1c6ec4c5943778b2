//! Subprocess-backed collaborators.
//!
//! Each external operation is an argv vector from the config. Arguments may
//! reference `{avatar_id}`, `{avatar_name}`, `{asset_path}`, `{platform}`,
//! `{description}`, `{version}` and `{image}`; the same values are exported
//! as `AVATAR_BATCH_*` environment variables.

use std::path::PathBuf;
use std::process::{Output, Stdio};

use avatar_batch_progress::{EnvironmentSnapshot, ImageMode, PlatformId};
use avatar_batch_uploader::{
    AvatarUploadClient, BoxFuture, Environment, PlatformSwitcher, UploadError, UploadReceipt,
    UploadRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Placeholder values for one invocation.
#[derive(Debug, Default, Clone)]
pub struct Vars(Vec<(&'static str, String)>);

impl Vars {
    pub fn set(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.0.push((key, value.into()));
        self
    }

    pub fn for_request(request: &UploadRequest) -> Self {
        let avatar = &request.job.avatar;
        let image = match &request.settings.image {
            ImageMode::Keep => "keep".to_string(),
            ImageMode::Capture => "capture".to_string(),
            ImageMode::File { path } => path.display().to_string(),
        };
        Vars::default()
            .set("avatar_id", avatar.id.clone())
            .set("avatar_name", avatar.name.clone())
            .set(
                "asset_path",
                avatar
                    .asset_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            )
            .set("platform", request.platform.as_str())
            .set("description", request.description.clone())
            .set(
                "version",
                request.version.map(|v| v.to_string()).unwrap_or_default(),
            )
            .set("image", image)
    }

    /// Replaces every `{key}` in `arg`.
    pub fn expand(&self, arg: &str) -> String {
        let mut out = arg.to_string();
        for (key, value) in &self.0 {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        out
    }

    fn env(&self) -> impl Iterator<Item = (String, &str)> {
        self.0
            .iter()
            .map(|(k, v)| (format!("AVATAR_BATCH_{}", k.to_ascii_uppercase()), v.as_str()))
    }
}

fn prepare(argv: &[String], vars: &Vars) -> Option<std::process::Command> {
    let (program, args) = argv.split_first()?;
    let mut cmd = std::process::Command::new(vars.expand(program));
    cmd.args(args.iter().map(|a| vars.expand(a)))
        .envs(vars.env())
        .stdin(Stdio::null());
    Some(cmd)
}

/// Runs `argv` to completion. `None` when `argv` is empty.
pub async fn run_command(argv: &[String], vars: &Vars) -> Option<std::io::Result<Output>> {
    let cmd = prepare(argv, vars)?;
    debug!(command = ?argv, "running command");
    Some(tokio::process::Command::from(cmd).output().await)
}

/// Runs blocking work without stalling the runtime: on a multi-thread
/// runtime the worker hands its other tasks off first.
pub fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(h) if h.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Runs `argv` to completion from a synchronous trait method.
fn run_command_blocking(argv: &[String], vars: &Vars) -> Option<std::io::Result<Output>> {
    let mut cmd = prepare(argv, vars)?;
    debug!(command = ?argv, "running command");
    Some(blocking(move || cmd.output()))
}

/// Last non-empty line of stderr, or the exit status.
fn failure_reason(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| format!("exited with {}", output.status))
}

/// Upload client that shells out to configured commands.
pub struct CommandUploadClient {
    upload: Vec<String>,
    login: Vec<String>,
    ready: Vec<String>,
}

impl CommandUploadClient {
    pub fn new(upload: Vec<String>, login: Vec<String>, ready: Vec<String>) -> Self {
        Self {
            upload,
            login,
            ready,
        }
    }
}

impl AvatarUploadClient for CommandUploadClient {
    fn is_ready(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match run_command(&self.ready, &Vars::default()).await {
                None => true,
                Some(Ok(output)) => output.status.success(),
                Some(Err(e)) => {
                    warn!("ready command failed to start: {e}");
                    false
                }
            }
        })
    }

    fn login(&self) -> BoxFuture<'_, Result<(), UploadError>> {
        Box::pin(async move {
            match run_command(&self.login, &Vars::default()).await {
                None => Ok(()),
                Some(Ok(output)) if output.status.success() => Ok(()),
                Some(Ok(output)) => Err(UploadError::Login(failure_reason(&output))),
                Some(Err(e)) => Err(UploadError::Login(format!("failed to run login command: {e}"))),
            }
        })
    }

    fn upload_single<'a>(
        &'a self,
        request: &'a UploadRequest,
        _cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<UploadReceipt, UploadError>> {
        Box::pin(async move {
            let vars = Vars::for_request(request);
            let output = run_command(&self.upload, &vars)
                .await
                .ok_or_else(|| UploadError::Upload("no upload_command configured".into()))?
                .map_err(|e| UploadError::Upload(format!("failed to run upload command: {e}")))?;
            if !output.status.success() {
                return Err(UploadError::Upload(failure_reason(&output)));
            }
            let remote_id = String::from_utf8_lossy(&output.stdout)
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string);
            Ok(UploadReceipt { remote_id })
        })
    }
}

/// Platform switcher that keeps the active platform in a state file and
/// runs an optional hook to perform the actual switch.
pub struct CommandPlatformSwitcher {
    state_file: PathBuf,
    hook: Vec<String>,
}

impl CommandPlatformSwitcher {
    pub fn new(state_file: PathBuf, hook: Vec<String>) -> Self {
        Self { state_file, hook }
    }
}

impl PlatformSwitcher for CommandPlatformSwitcher {
    fn current_platform(&self) -> PlatformId {
        std::fs::read_to_string(&self.state_file)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(PlatformId::Desktop)
    }

    fn request_switch(&self, target: PlatformId) -> Result<(), UploadError> {
        let vars = Vars::default().set("platform", target.as_str());
        if let Some(result) = run_command_blocking(&self.hook, &vars) {
            let output = result
                .map_err(|e| UploadError::PlatformSwitch(format!("failed to run switch command: {e}")))?;
            if !output.status.success() {
                return Err(UploadError::PlatformSwitch(failure_reason(&output)));
            }
        }
        if let Some(parent) = self.state_file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| UploadError::PlatformSwitch(e.to_string()))?;
        }
        std::fs::write(&self.state_file, target.as_str())
            .map_err(|e| UploadError::PlatformSwitch(e.to_string()))?;
        Ok(())
    }
}

/// Environment snapshot via external commands.
pub struct CommandEnvironment {
    snapshot: Vec<String>,
    restore: Vec<String>,
}

impl CommandEnvironment {
    pub fn new(snapshot: Vec<String>, restore: Vec<String>) -> Self {
        Self { snapshot, restore }
    }
}

impl Environment for CommandEnvironment {
    fn capture_open_documents(&self) -> EnvironmentSnapshot {
        match run_command_blocking(&self.snapshot, &Vars::default()) {
            Some(Ok(output)) if output.status.success() => {
                let open_documents: Vec<String> = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                EnvironmentSnapshot {
                    active_document: open_documents.first().cloned(),
                    open_documents,
                }
            }
            Some(Ok(output)) => {
                warn!("snapshot command failed: {}", failure_reason(&output));
                EnvironmentSnapshot::default()
            }
            Some(Err(e)) => {
                warn!("snapshot command failed to start: {e}");
                EnvironmentSnapshot::default()
            }
            None => EnvironmentSnapshot::default(),
        }
    }

    fn restore(&self, snapshot: &EnvironmentSnapshot) -> Result<(), UploadError> {
        if snapshot.is_empty() || self.restore.is_empty() {
            return Ok(());
        }
        let mut argv = self.restore.clone();
        argv.extend(snapshot.open_documents.iter().cloned());
        match run_command_blocking(&argv, &Vars::default()) {
            Some(Ok(output)) if output.status.success() => Ok(()),
            Some(Ok(output)) => Err(UploadError::Environment(failure_reason(&output))),
            Some(Err(e)) => Err(UploadError::Environment(e.to_string())),
            None => Ok(()),
        }
    }
}

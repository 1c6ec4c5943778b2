//! Command-line interface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use avatar_batch_progress::{
    FileProgressRepository, MemorySessionFlags, PlatformId, ProgressRepository, ProgressStore,
};
use avatar_batch_uploader::{Collaborators, GitTagger, RunOutcome, UploadEvent, UploadOrchestrator};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::command::{CommandEnvironment, CommandPlatformSwitcher, CommandUploadClient};
use crate::config::{CliConfig, default_config_path};
use crate::jobs::JobFile;
use crate::prompt::TerminalPrompt;

/// avatar-batch - resumable batch avatar uploads
#[derive(Parser, Debug)]
#[command(name = "avatar-batch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Upload a batch of avatars to every target platform, resuming after crashes", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(global = true, long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(global = true, long = "verbose", short = 'v')]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new batch upload from a job file
    Start {
        /// Job file (JSON)
        #[arg(value_name = "JOBS")]
        jobs: PathBuf,

        /// Override the platforms to upload to
        #[arg(long = "platform", value_delimiter = ',')]
        platforms: Option<Vec<PlatformId>>,

        /// Abort the whole run on the first failed avatar
        #[arg(long = "strict")]
        strict: bool,

        /// Re-attempts per avatar
        #[arg(long = "retries")]
        retries: Option<u32>,
    },

    /// Resume an interrupted batch upload
    Resume {
        /// Resume without asking
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },

    /// Show the state of the pending batch upload
    Status,

    /// Discard the pending batch upload
    Abandon,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long = "force")]
        force: bool,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        init_logging(self.verbose);

        let config_path = match self.config {
            Some(p) => p,
            None => default_config_path()?,
        };
        let cfg = CliConfig::load_from(&config_path)?;

        match self.command {
            Commands::Start {
                jobs,
                platforms,
                strict,
                retries,
            } => {
                let store = JobFile::load(&jobs)?.into_store(platforms, strict, retries);
                let orch = build_orchestrator(&cfg, false)?;
                let _interrupt = watch_interrupt(&orch);
                let outcome = orch.start(store).await?;
                drive(&orch, outcome).await
            }
            Commands::Resume { yes } => {
                let orch = build_orchestrator(&cfg, yes)?;
                let _interrupt = watch_interrupt(&orch);
                let outcome = orch.resume_if_pending().await?;
                if outcome == RunOutcome::Idle {
                    println!("No pending batch upload.");
                    return Ok(());
                }
                drive(&orch, outcome).await
            }
            Commands::Status => status(&cfg),
            Commands::Abandon => {
                let orch = build_orchestrator(&cfg, false)?;
                if !orch.is_in_progress() {
                    println!("No pending batch upload.");
                    return Ok(());
                }
                orch.abandon()?;
                println!("Pending batch upload discarded.");
                Ok(())
            }
            Commands::Init { force } => {
                if config_path.exists() && !force {
                    anyhow::bail!(
                        "{} already exists (use --force to overwrite)",
                        config_path.display()
                    );
                }
                CliConfig::default().save_to(&config_path)?;
                println!("Wrote {}", config_path.display());
                Ok(())
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "debug"
    } else {
        "info,avatar_batch=debug"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_orchestrator(cfg: &CliConfig, assume_yes: bool) -> anyhow::Result<UploadOrchestrator> {
    let repository = Arc::new(FileProgressRepository::new(cfg.progress_path()?));
    let orch = UploadOrchestrator::new(Collaborators {
        repository,
        flags: Arc::new(MemorySessionFlags::new()),
        client: Arc::new(CommandUploadClient::new(
            cfg.upload_command.clone(),
            cfg.login_command.clone(),
            cfg.ready_command.clone(),
        )),
        switcher: Arc::new(CommandPlatformSwitcher::new(
            cfg.platform_state_path()?,
            cfg.switch_command.clone(),
        )),
        environment: Arc::new(CommandEnvironment::new(
            cfg.snapshot_command.clone(),
            cfg.restore_command.clone(),
        )),
        prompt: Arc::new(TerminalPrompt::new(assume_yes)),
    })
    .with_ready_poll_interval(Duration::from_millis(cfg.ready_poll_ms));

    let orch = match &cfg.tag_repository {
        Some(dir) => orch.with_tagger(Arc::new(GitTagger::new(dir))),
        None => orch,
    };
    orch.subscribe(Box::new(log_event));
    Ok(orch)
}

fn log_event(event: &UploadEvent) {
    match event {
        UploadEvent::UploadStarted { avatar, platform } => {
            info!(avatar = %avatar, platform = %platform, "uploading");
        }
        UploadEvent::UploadFinished { avatar, platform } => {
            info!(avatar = %avatar, platform = %platform, "uploaded");
        }
        UploadEvent::UploadFailed {
            avatar,
            platform,
            error,
        } => {
            warn!(avatar = %avatar, platform = %platform, %error, "upload failed");
        }
        UploadEvent::PlatformSwitchRequested { from, to } => {
            info!(%from, %to, "switching platform");
        }
        UploadEvent::LoginFailed { error } => error!(%error, "login failed"),
        UploadEvent::UnexpectedError { error } => error!(%error, "batch upload aborted"),
        UploadEvent::RunFinished { .. } => {}
    }
}

/// Aborts the spawned task when dropped.
struct InterruptGuard(tokio::task::JoinHandle<()>);

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Turns Ctrl-C into a cooperative cancellation of the current run.
fn watch_interrupt(orch: &UploadOrchestrator) -> InterruptGuard {
    let handle = orch.cancel_handle();
    InterruptGuard(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling after the current upload");
            handle.cancel();
        }
    }))
}

/// Runs the orchestrator until the batch ends.
///
/// A platform switch suspends the run; this host has no environment to
/// reload, so it re-enters `resume_if_pending` in-process.
async fn drive(orch: &UploadOrchestrator, mut outcome: RunOutcome) -> anyhow::Result<()> {
    loop {
        match outcome {
            RunOutcome::Suspended { target } => {
                info!(%target, "platform switched, resuming");
                outcome = orch.resume_if_pending().await?;
            }
            RunOutcome::Idle => return Ok(()),
            RunOutcome::Finished { success, errors } => {
                if errors.is_empty() {
                    println!("Batch upload finished.");
                } else {
                    println!("Batch upload finished with {} error(s):", errors.len());
                    for e in &errors {
                        println!("  {e}");
                    }
                }
                if !success {
                    anyhow::bail!("batch upload failed");
                }
                return Ok(());
            }
        }
    }
}

fn status(cfg: &CliConfig) -> anyhow::Result<()> {
    let repo = FileProgressRepository::new(cfg.progress_path()?);
    let Some(store) = repo.load().context("failed to read progress")? else {
        println!("No pending batch upload.");
        return Ok(());
    };

    println!("Pending batch upload: {}", repo.path().display());
    for line in status_lines(&store) {
        println!("  {line}");
    }
    Ok(())
}

fn status_lines(store: &ProgressStore) -> Vec<String> {
    let mut lines = vec![format!(
        "progress:  {}/{} uploads",
        store.completed_uploads(),
        store.total_uploads()
    )];
    let platform = store
        .cursor_platform
        .map(|p| p.to_string())
        .unwrap_or_else(|| "not started".into());
    match store.current_job() {
        Some(job) => {
            lines.push(format!(
                "platform:  {platform} (avatar #{})",
                store.cursor_avatar_index + 1
            ));
            lines.push(format!("next:      {}", job.avatar));
        }
        None => lines.push(format!("platform:  {platform}")),
    }
    let finished: Vec<&str> = store.finished_platforms.iter().map(|p| p.as_str()).collect();
    lines.push(format!("finished:  {}", finished.join(", ")));
    if !store.errors.is_empty() {
        lines.push("errors:".into());
        lines.extend(store.errors.iter().map(|e| format!("  {e}")));
    }
    lines
}

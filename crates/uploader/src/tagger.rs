//! Tag-on-success support.

use std::path::PathBuf;

use tracing::debug;

use crate::client::BoxFuture;
use crate::error::UploadError;

/// Creates a named marker for a successful upload.
pub trait Tagger: Send + Sync {
    fn tag<'a>(&'a self, name: &'a str, message: &'a str) -> BoxFuture<'a, Result<(), UploadError>>;
}

/// Creates annotated git tags in a working tree via the `git` executable.
#[derive(Debug, Clone)]
pub struct GitTagger {
    repo_dir: PathBuf,
    git: PathBuf,
    identity: Option<(String, String)>,
}

impl GitTagger {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            git: PathBuf::from("git"),
            identity: None,
        }
    }

    /// Uses a specific git executable instead of the one on `PATH`.
    pub fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    /// Overrides `user.name` / `user.email` for the tag object.
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }
}

impl Tagger for GitTagger {
    fn tag<'a>(&'a self, name: &'a str, message: &'a str) -> BoxFuture<'a, Result<(), UploadError>> {
        Box::pin(async move {
            let mut cmd = tokio::process::Command::new(&self.git);
            cmd.arg("-C").arg(&self.repo_dir);
            if let Some((user, email)) = &self.identity {
                cmd.arg("-c")
                    .arg(format!("user.name={user}"))
                    .arg("-c")
                    .arg(format!("user.email={email}"));
            }
            let output = cmd
                .args(["tag", "-a", name, "-m", message])
                .stdin(std::process::Stdio::null())
                .output()
                .await
                .map_err(|e| UploadError::Tag(format!("failed to run git: {e}")))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(UploadError::Tag(format!(
                    "git tag {name} exited with {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }
            debug!(tag = %name, repo = %self.repo_dir.display(), "created git tag");
            Ok(())
        })
    }
}

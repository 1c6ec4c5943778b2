//! CLI configuration management.
//!
//! Stored as JSON at `<config dir>/avatar-batch/config.json`. Every field is
//! optional on disk; missing fields take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default builder readiness poll interval in milliseconds.
const DEFAULT_READY_POLL_MS: u64 = 500;

fn default_ready_poll_ms() -> u64 {
    DEFAULT_READY_POLL_MS
}

/// Host configuration: where state lives and which external commands
/// implement the build/upload tooling.
///
/// Command lines are argv vectors. Arguments may contain `{placeholders}`
/// that are filled per invocation (see `command::Vars`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Progress record location. Defaults to `<config dir>/avatar-batch/progress.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_file: Option<PathBuf>,

    /// File holding the active platform name. Defaults to
    /// `<config dir>/avatar-batch/platform`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_state_file: Option<PathBuf>,

    /// Builds and uploads one avatar. Required to run uploads.
    #[serde(default)]
    pub upload_command: Vec<String>,

    /// Ensures a logged-in session. Skipped when empty.
    #[serde(default)]
    pub login_command: Vec<String>,

    /// Exits zero once the builder is ready. Skipped when empty.
    #[serde(default)]
    pub ready_command: Vec<String>,

    /// Switches the build target. Skipped when empty.
    #[serde(default)]
    pub switch_command: Vec<String>,

    /// Prints open documents, one per line, active first.
    #[serde(default)]
    pub snapshot_command: Vec<String>,

    /// Reopens documents; they are appended as trailing arguments.
    #[serde(default)]
    pub restore_command: Vec<String>,

    /// Git working tree for tag-on-success. Tagging is off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_repository: Option<PathBuf>,

    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            progress_file: None,
            platform_state_file: None,
            upload_command: Vec::new(),
            login_command: Vec::new(),
            ready_command: Vec::new(),
            switch_command: Vec::new(),
            snapshot_command: Vec::new(),
            restore_command: Vec::new(),
            tag_repository: None,
            ready_poll_ms: DEFAULT_READY_POLL_MS,
        }
    }
}

impl CliConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file is missing or unparsable.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<CliConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    "failed to parse config, using defaults: {e}"
                );
                Ok(Self::default())
            }
        }
    }

    /// Saves configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        set_permissions_0600(path);
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn progress_path(&self) -> anyhow::Result<PathBuf> {
        match &self.progress_file {
            Some(p) => Ok(p.clone()),
            None => avatar_batch_progress::default_progress_path()
                .ok_or_else(|| anyhow::anyhow!("cannot determine config directory")),
        }
    }

    pub fn platform_state_path(&self) -> anyhow::Result<PathBuf> {
        match &self.platform_state_file {
            Some(p) => Ok(p.clone()),
            None => Ok(app_dir()?.join("platform")),
        }
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// Returns the default config file path.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(app_dir()?.join("config.json"))
}

fn app_dir() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("avatar-batch"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .map(PathBuf::from)
            .map_err(|_| anyhow::anyhow!("APPDATA not set"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg));
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".config"))
            .map_err(|_| anyhow::anyhow!("HOME not set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = CliConfig::load_from(&tmp.path().join("config.json")).unwrap();
        assert_eq!(cfg, CliConfig::default());
        assert_eq!(cfg.ready_poll_ms, 500);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"upload_command":["uploader","{avatar_id}"]}"#).unwrap();
        let cfg = CliConfig::load_from(&path).unwrap();
        assert_eq!(cfg.upload_command, vec!["uploader", "{avatar_id}"]);
        assert!(cfg.login_command.is_empty());
        assert_eq!(cfg.ready_poll_ms, 500);
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(CliConfig::load_from(&path).unwrap(), CliConfig::default());
    }

    #[test]
    fn save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        let cfg = CliConfig {
            progress_file: Some(tmp.path().join("progress.json")),
            switch_command: vec!["switch-target".into(), "{platform}".into()],
            tag_repository: Some(tmp.path().to_path_buf()),
            ready_poll_ms: 250,
            ..CliConfig::default()
        };
        cfg.save_to(&path).unwrap();
        assert_eq!(CliConfig::load_from(&path).unwrap(), cfg);
        assert_eq!(cfg.progress_path().unwrap(), tmp.path().join("progress.json"));
    }
}

//! The single slot a [`ProgressStore`] is persisted in.
//!
//! Exactly one store exists at a time; whether the slot is occupied is the
//! sole "run in progress or interrupted" signal.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{FORMAT_VERSION, ProgressStore};

/// Durable storage for the in-flight [`ProgressStore`].
///
/// `delete` is the only way progress is cleared.
pub trait ProgressRepository: Send + Sync {
    /// Loads the stored progress, if any.
    fn load(&self) -> Result<Option<ProgressStore>, StoreError>;

    /// Persists `store`, replacing whatever the slot held. Idempotent.
    fn save(&self, store: &ProgressStore) -> Result<(), StoreError>;

    /// Removes the stored progress. Deleting an empty slot is not an error.
    fn delete(&self) -> Result<(), StoreError>;

    /// Returns true if the slot is occupied.
    fn exists(&self) -> bool;
}

fn decode(json: &str) -> Result<ProgressStore, StoreError> {
    let store: ProgressStore = serde_json::from_str(json)?;
    if store.format_version > FORMAT_VERSION {
        return Err(StoreError::UnsupportedFormat {
            found: store.format_version,
            supported: FORMAT_VERSION,
        });
    }
    Ok(store)
}

/// JSON file backed repository.
///
/// Writes go to a sibling temp file first and are renamed over the target,
/// so a crash mid-write leaves either the old or the new record.
pub struct FileProgressRepository {
    path: PathBuf,
}

impl FileProgressRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "progress.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ProgressRepository for FileProgressRepository {
    fn load(&self) -> Result<Option<ProgressStore>, StoreError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let store = decode(&data)?;
        debug!(
            path = %self.path.display(),
            platform = ?store.cursor_platform,
            index = store.cursor_avatar_index,
            "loaded upload progress"
        );
        Ok(Some(store))
    }

    fn save(&self, store: &ProgressStore) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(store)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)?;
        set_permissions_0600(&tmp);
        std::fs::rename(&tmp, &self.path)?;
        debug!(
            path = %self.path.display(),
            platform = ?store.cursor_platform,
            index = store.cursor_avatar_index,
            "persisted upload progress"
        );
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "deleted upload progress");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
            warn!(path = %path.display(), "failed to restrict permissions: {e}");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

/// In-memory repository. Stores the serialized JSON so that reloads see
/// exactly what a file-backed slot would.
#[derive(Default)]
pub struct MemoryProgressRepository {
    slot: Mutex<Option<String>>,
    saves: Mutex<usize>,
}

impl MemoryProgressRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgressRepository for MemoryProgressRepository {
    fn load(&self) -> Result<Option<ProgressStore>, StoreError> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_deref().map(decode).transpose()
    }

    fn save(&self, store: &ProgressStore) -> Result<(), StoreError> {
        let json = serde_json::to_string(store)?;
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(json);
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    fn delete(&self) -> Result<(), StoreError> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }

    fn exists(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// Returns the default progress file path:
/// `<config dir>/avatar-batch/progress.json`.
pub fn default_progress_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("avatar-batch").join("progress.json"))
}

/// Returns the platform-specific config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}

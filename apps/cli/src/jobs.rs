//! Job files: the user's avatar selection for one run.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use avatar_batch_progress::{PlatformId, ProgressStore, UploadJob};
use serde::{Deserialize, Serialize};

fn default_platforms() -> Vec<PlatformId> {
    PlatformId::ALL.to_vec()
}

/// A batch description as written by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFile {
    #[serde(default = "default_platforms")]
    pub platforms: Vec<PlatformId>,
    #[serde(default)]
    pub sleep_interval_ms: u64,
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default)]
    pub retry_count: u32,
    pub jobs: Vec<UploadJob>,
}

impl JobFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read job file {}", path.display()))?;
        let file: JobFile = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse job file {}", path.display()))?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.platforms.is_empty() {
            anyhow::bail!("job file lists no platforms");
        }
        let mut seen = std::collections::HashSet::new();
        for job in &self.jobs {
            if !seen.insert(job.avatar.id.as_str()) {
                anyhow::bail!("avatar {} is listed twice", job.avatar.id);
            }
        }
        Ok(())
    }

    /// Builds a fresh progress record, applying command-line overrides.
    pub fn into_store(
        self,
        platforms: Option<Vec<PlatformId>>,
        strict: bool,
        retries: Option<u32>,
    ) -> ProgressStore {
        let platforms = platforms.unwrap_or(self.platforms);
        ProgressStore::new(self.jobs, platforms)
            .with_sleep_interval(Duration::from_millis(self.sleep_interval_ms))
            .with_strict_mode(self.strict_mode || strict)
            .with_retry_count(retries.unwrap_or(self.retry_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("jobs.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            r#"{"jobs":[{"avatar":{"id":"a1","name":"Capy"}},{"avatar":{"id":"a2","name":"Bara"}}]}"#,
        );
        let file = JobFile::load(&path).unwrap();
        assert_eq!(file.platforms, vec![PlatformId::Desktop, PlatformId::Mobile]);
        assert_eq!(file.jobs.len(), 2);

        let store = file.into_store(None, false, None);
        assert_eq!(store.platform_queue.len(), 2);
        assert_eq!(store.sleep_interval, Duration::ZERO);
        assert!(!store.strict_mode);
    }

    #[test]
    fn overrides_apply() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            r#"{"platforms":["mobile"],"sleep_interval_ms":2000,"retry_count":1,"jobs":[]}"#,
        );
        let store = JobFile::load(&path)
            .unwrap()
            .into_store(Some(vec![PlatformId::Desktop]), true, Some(4));
        assert_eq!(store.platform_queue, vec![PlatformId::Desktop]);
        assert_eq!(store.sleep_interval, Duration::from_secs(2));
        assert!(store.strict_mode);
        assert_eq!(store.retry_count, 4);
    }

    #[test]
    fn rejects_duplicates_and_empty_platforms() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            r#"{"jobs":[{"avatar":{"id":"a1","name":"A"}},{"avatar":{"id":"a1","name":"B"}}]}"#,
        );
        assert!(JobFile::load(&path).is_err());

        let path = write(tmp.path(), r#"{"platforms":[],"jobs":[]}"#);
        assert!(JobFile::load(&path).is_err());
    }
}

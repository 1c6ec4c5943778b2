//! The persisted upload progress record.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{EnvironmentSnapshot, ErrorRecord, PlatformId, UploadJob};

/// Current on-disk format of [`ProgressStore`].
pub const FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

/// In-flight progress of a batch run.
///
/// The cursor is `(cursor_platform, cursor_avatar_index)`. It only moves
/// forward: the avatar index is reset to zero when a new platform pass starts
/// and is incremented after every attempted avatar, and `finished_platforms`
/// only ever grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStore {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub avatar_queue: Vec<UploadJob>,
    pub platform_queue: Vec<PlatformId>,
    #[serde(default)]
    pub cursor_avatar_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_platform: Option<PlatformId>,
    #[serde(default)]
    pub finished_platforms: Vec<PlatformId>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default, rename = "sleep_interval_ms", with = "duration_ms")]
    pub sleep_interval: Duration,
    #[serde(default)]
    pub strict_mode: bool,
    /// Not persisted: a reload resets the retry budget.
    #[serde(skip)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_environment: Option<EnvironmentSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_switch: Option<PlatformId>,
}

impl ProgressStore {
    /// Creates a fresh store. Duplicate platforms are dropped, keeping the
    /// first occurrence.
    pub fn new(avatar_queue: Vec<UploadJob>, platforms: impl IntoIterator<Item = PlatformId>) -> Self {
        let mut platform_queue = Vec::new();
        for p in platforms {
            if !platform_queue.contains(&p) {
                platform_queue.push(p);
            }
        }
        Self {
            format_version: FORMAT_VERSION,
            avatar_queue,
            platform_queue,
            cursor_avatar_index: 0,
            cursor_platform: None,
            finished_platforms: Vec::new(),
            errors: Vec::new(),
            sleep_interval: Duration::ZERO,
            strict_mode: false,
            retry_count: 0,
            saved_environment: None,
            pending_switch: None,
        }
    }

    pub fn with_sleep_interval(mut self, interval: Duration) -> Self {
        self.sleep_interval = interval;
        self
    }

    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn with_retry_count(mut self, retries: u32) -> Self {
        self.retry_count = retries;
        self
    }

    pub fn with_environment(mut self, snapshot: EnvironmentSnapshot) -> Self {
        self.saved_environment = Some(snapshot);
        self
    }

    /// Returns true once `platform` has been fully processed.
    pub fn is_platform_finished(&self, platform: PlatformId) -> bool {
        self.finished_platforms.contains(&platform)
    }

    /// Returns true when the current platform pass has nothing left to do:
    /// not started yet, already finished, or the avatar index ran past the
    /// end of the queue.
    pub fn is_pass_complete(&self) -> bool {
        match self.cursor_platform {
            None => true,
            Some(p) => {
                self.is_platform_finished(p) || self.cursor_avatar_index >= self.avatar_queue.len()
            }
        }
    }

    /// Returns the job under the cursor, if the pass is still running.
    pub fn current_job(&self) -> Option<&UploadJob> {
        if self.is_pass_complete() {
            return None;
        }
        self.avatar_queue.get(self.cursor_avatar_index)
    }

    /// Returns true when at least one job is enabled for `platform`.
    pub fn has_enabled_jobs(&self, platform: PlatformId) -> bool {
        self.avatar_queue.iter().any(|j| j.is_enabled_for(platform))
    }

    /// Marks `platform` as finished. Platforms outside the queue are ignored.
    pub fn mark_platform_finished(&mut self, platform: PlatformId) {
        if self.platform_queue.contains(&platform) && !self.is_platform_finished(platform) {
            self.finished_platforms.push(platform);
        }
    }

    /// Closes the current pass and moves the cursor to the next unfinished
    /// platform in queue order, resetting the avatar index.
    ///
    /// Returns the new cursor platform, or `None` when every platform is
    /// finished (the cursor is then left on the last platform).
    pub fn advance_platform(&mut self) -> Option<PlatformId> {
        if let Some(current) = self.cursor_platform {
            self.mark_platform_finished(current);
        }
        let next = self
            .platform_queue
            .iter()
            .copied()
            .find(|p| !self.is_platform_finished(*p))?;
        self.cursor_platform = Some(next);
        self.cursor_avatar_index = 0;
        Some(next)
    }

    /// Moves past the avatar under the cursor.
    pub fn advance_avatar(&mut self) {
        self.cursor_avatar_index = self.cursor_avatar_index.saturating_add(1);
    }

    /// Appends a record to the error log.
    pub fn record_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    /// Returns true when every queued platform has been processed.
    pub fn is_complete(&self) -> bool {
        self.platform_queue
            .iter()
            .all(|p| self.is_platform_finished(*p))
    }

    /// Number of `(platform, avatar)` uploads enabled across the whole run.
    pub fn total_uploads(&self) -> usize {
        self.platform_queue
            .iter()
            .map(|p| self.avatar_queue.iter().filter(|j| j.is_enabled_for(*p)).count())
            .sum()
    }

    /// Number of enabled uploads already behind the cursor.
    pub fn completed_uploads(&self) -> usize {
        let finished: usize = self
            .finished_platforms
            .iter()
            .map(|p| self.avatar_queue.iter().filter(|j| j.is_enabled_for(*p)).count())
            .sum();
        let in_pass = match self.cursor_platform {
            Some(p) if !self.is_platform_finished(p) => self
                .avatar_queue
                .iter()
                .take(self.cursor_avatar_index)
                .filter(|j| j.is_enabled_for(p))
                .count(),
            _ => 0,
        };
        finished + in_pass
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

//! Data types shared by the progress store and the orchestrator.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Target build platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    /// Desktop (Windows) build target.
    Desktop,
    /// Mobile / standalone (Android) build target.
    Mobile,
}

impl PlatformId {
    /// All platforms in default upload order.
    pub const ALL: [PlatformId; 2] = [PlatformId::Desktop, PlatformId::Mobile];

    /// Returns the lowercase wire name of the platform.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformId::Desktop => "desktop",
            PlatformId::Mobile => "mobile",
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" | "windows" | "pc" => Ok(PlatformId::Desktop),
            "mobile" | "android" | "quest" => Ok(PlatformId::Mobile),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Stable identity of an avatar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarRef {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_path: Option<PathBuf>,
}

impl AvatarRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            asset_path: None,
        }
    }
}

impl fmt::Display for AvatarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// How the thumbnail is refreshed before upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ImageMode {
    /// Keep the image already on the service.
    #[default]
    Keep,
    /// Capture a fresh image from the preview camera.
    Capture,
    /// Use an image file from disk.
    File { path: PathBuf },
}

/// Tag-on-success request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRequest {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

/// Upload settings for one avatar on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub image: ImageMode,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bump_version: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<TagRequest>,
}

fn default_true() -> bool {
    true
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            image: ImageMode::Keep,
            bump_version: false,
            tag: None,
        }
    }
}

impl PlatformSettings {
    /// Settings for a platform the avatar is not uploaded to.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// One avatar queued for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJob {
    pub avatar: AvatarRef,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub desktop: PlatformSettings,
    #[serde(default)]
    pub mobile: PlatformSettings,
}

impl UploadJob {
    /// Creates a job enabled on every platform with default settings.
    pub fn new(avatar: AvatarRef) -> Self {
        Self {
            avatar,
            description: String::new(),
            desktop: PlatformSettings::default(),
            mobile: PlatformSettings::default(),
        }
    }

    /// Returns the settings for `platform`.
    pub fn settings_for(&self, platform: PlatformId) -> &PlatformSettings {
        match platform {
            PlatformId::Desktop => &self.desktop,
            PlatformId::Mobile => &self.mobile,
        }
    }

    /// Returns true when the avatar should be uploaded on `platform`.
    pub fn is_enabled_for(&self, platform: PlatformId) -> bool {
        self.settings_for(platform).enabled
    }
}

/// A failure recorded during a run.
///
/// `avatar == None` marks a platform-level failure (login, platform switch,
/// unexpected error) rather than a single-avatar one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<AvatarRef>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    /// Error attributed to one avatar on one platform.
    pub fn avatar(platform: PlatformId, avatar: AvatarRef, message: impl Into<String>) -> Self {
        Self {
            platform: Some(platform),
            avatar: Some(avatar),
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// Error attributed to the platform pass as a whole.
    pub fn platform(platform: Option<PlatformId>, message: impl Into<String>) -> Self {
        Self {
            platform,
            avatar: None,
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// Returns true when this record refers to an avatar with `avatar_id`.
    pub fn is_for_avatar(&self, avatar_id: &str) -> bool {
        self.avatar.as_ref().is_some_and(|a| a.id == avatar_id)
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let platform = self.platform.map(|p| p.as_str()).unwrap_or("-");
        match &self.avatar {
            Some(avatar) => write!(f, "[{platform}] {avatar}: {}", self.message),
            None => write!(f, "[{platform}] {}", self.message),
        }
    }
}

/// Host environment state captured before a run and restored after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    #[serde(default)]
    pub open_documents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_document: Option<String>,
}

impl EnvironmentSnapshot {
    pub fn is_empty(&self) -> bool {
        self.open_documents.is_empty() && self.active_document.is_none()
    }
}

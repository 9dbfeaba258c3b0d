//! Share link models for anonymous file access.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::transform::{is_original_alias, TransformDescriptor};

/// Allow-list entry that permits every transform.
pub const ALLOW_ALL_TRANSFORMS: &str = "*";

/// Minimum accepted token length.
pub const MIN_SHARE_TOKEN_LEN: usize = 8;

/// Maximum accepted token length.
pub const MAX_SHARE_TOKEN_LEN: usize = 64;

/// An anonymous, revocable capability granting access to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Share {
    /// Opaque share ID.
    pub id: String,

    /// Public lookup key (URL-safe random string).
    pub token: String,

    /// File this share grants access to.
    pub file_id: String,

    /// Optional expiry timestamp (absent = never expires).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Optional bcrypt hash of the share password.
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,

    /// Optional download ceiling (absent = unlimited).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_downloads: Option<u64>,

    /// Number of successful token resolutions.
    #[serde(default)]
    pub access_count: u64,

    /// Number of successful deliveries.
    #[serde(default)]
    pub download_count: u64,

    /// Transform strings this share may request (empty = unrestricted).
    #[serde(default)]
    pub allowed_transforms: Vec<String>,

    /// When the share was created.
    pub created_at: DateTime<Utc>,
}

impl Share {
    /// Create a new share for a file with a freshly generated token.
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            token: generate_share_token(),
            file_id: file_id.into(),
            expires_at: None,
            password_hash: None,
            max_downloads: None,
            access_count: 0,
            download_count: 0,
            allowed_transforms: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Set expiry.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set an already-hashed password.
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    /// Set the download ceiling.
    pub fn with_max_downloads(mut self, max: u64) -> Self {
        self.max_downloads = Some(max);
        self
    }

    /// Restrict the transforms this share may request.
    pub fn with_allowed_transforms<I, S>(mut self, transforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_transforms = transforms.into_iter().map(Into::into).collect();
        self
    }

    /// Check if the share is expired at the given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }

    /// Check if the share is expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether a password must be supplied.
    pub fn is_password_protected(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Whether the download ceiling has been reached.
    pub fn download_limit_reached(&self) -> bool {
        self.max_downloads
            .map(|max| self.download_count >= max)
            .unwrap_or(false)
    }

    /// Whether any transform is permitted without consulting the list.
    pub fn allows_all_transforms(&self) -> bool {
        self.allowed_transforms.is_empty()
            || self
                .allowed_transforms
                .iter()
                .any(|t| t == ALLOW_ALL_TRANSFORMS)
    }

    /// Check whether a raw transform string appears verbatim in the allow-list.
    ///
    /// Original aliases are always allowed. Canonical-equivalence matching
    /// lives with the descriptor parser.
    pub fn allows_raw_transform(&self, raw: &str) -> bool {
        is_original_alias(raw)
            || self.allows_all_transforms()
            || self.allowed_transforms.iter().any(|t| t == raw)
    }

    /// Allow-list check for a parsed request.
    ///
    /// Passes on a verbatim match, on an entry that parses to an equal
    /// descriptor, or when the request needs no processing. Entries that fail
    /// to parse never match canonically.
    pub fn allows_transform(&self, raw: &str, descriptor: &TransformDescriptor) -> bool {
        if !descriptor.requires_processing() || self.allows_raw_transform(raw) {
            return true;
        }
        self.allowed_transforms.iter().any(|entry| {
            TransformDescriptor::parse(entry)
                .map(|allowed| allowed == *descriptor)
                .unwrap_or(false)
        })
    }
}

/// Generate a URL-safe random share token.
///
/// 16 bytes of UUID v4 randomness, base64url without padding (22 chars).
pub fn generate_share_token() -> String {
    let uuid = uuid::Uuid::new_v4();
    URL_SAFE_NO_PAD.encode(uuid.as_bytes())
}

/// Validate a share token format.
pub fn is_valid_share_token(token: &str) -> bool {
    if token.len() < MIN_SHARE_TOKEN_LEN || token.len() > MAX_SHARE_TOKEN_LEN {
        return false;
    }
    token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

//! Who is asking and which photo the previews are rendered from.

use serde::{Deserialize, Serialize};

use crate::hashing::sha256_hex;

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub access_token: String,
}

/// Where the provider can read the source photo from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageSource {
    /// Publicly reachable or signed URL.
    Url(String),
    /// Inline `data:` URL.
    DataUrl(String),
    /// Path inside the backend's storage bucket.
    StoragePath(String),
}

/// The photo all previews in the session are generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    /// Content hash; changes whenever the pixels change.
    pub hash: String,
    pub source: ImageSource,
    pub display_url: Option<String>,
    pub storage_path: Option<String>,
}

impl SourceImage {
    pub fn new(hash: impl Into<String>, source: ImageSource) -> Self {
        Self {
            hash: hash.into(),
            source,
            display_url: None,
            storage_path: None,
        }
    }

    /// Build a source from raw bytes, hashing the content.
    pub fn from_bytes(bytes: &[u8], source: ImageSource) -> Self {
        Self::new(sha256_hex(bytes), source)
    }

    pub fn with_display_url(mut self, url: impl Into<String>) -> Self {
        self.display_url = Some(url.into());
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = Some(path.into());
        self
    }
}

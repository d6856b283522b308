//! Image references and tracked images.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registry name for images no provider claims
pub const UNKNOWN_REGISTRY: &str = "unknown";

/// Registry an image is pulled from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRef {
    /// Provider id once normalized, or `unknown`
    pub name: String,
    /// Registry URL; a bare domain before normalization, `https://<host>/v2` after
    pub url: String,
}

/// Local tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub value: String,
    pub semver: bool,
}

/// Digest watch state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestRef {
    /// Whether digest changes signal updates
    pub watch: bool,
    /// Repo digest of the local image (`RepoDigests[0]` after the `@`)
    pub repo: Option<String>,
    /// Digest resolved for comparison
    pub value: Option<String>,
}

/// Image a container runs, as seen by the watcher
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Engine image id
    pub id: String,
    pub registry: RegistryRef,
    /// Repository path (e.g. `library/nginx`)
    pub name: String,
    pub tag: TagRef,
    pub digest: DigestRef,
    pub architecture: String,
    pub os: String,
    /// Platform variants reported by the engine distribution endpoint
    pub variant: Vec<String>,
    pub created: Option<String>,
}

impl ImageRef {
    /// Registry host with scheme and `/v2` suffix removed.
    pub fn registry_host(&self) -> &str {
        registry_host(&self.registry.url)
    }

    /// Pullable reference for a tag or digest
    /// (`ghcr.io/org/app:1.2.3`, `ghcr.io/org/app@sha256:...`).
    pub fn full_name(&self, tag_or_digest: &str) -> String {
        let separator = if tag_or_digest.starts_with("sha256:") {
            '@'
        } else {
            ':'
        };
        let host = self.registry_host();
        if host.is_empty() {
            format!("{}{}{}", self.name, separator, tag_or_digest)
        } else {
            format!("{}/{}{}{}", host, self.name, separator, tag_or_digest)
        }
    }

    /// The same image pinned to another tag.
    pub fn with_tag(&self, tag: &str) -> ImageRef {
        let mut image = self.clone();
        image.tag.value = tag.to_string();
        image
    }
}

/// Strip the scheme, the `/v2` API suffix and trailing slashes from a
/// registry URL.
pub fn registry_host(url: &str) -> &str {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let trimmed = without_scheme.trim_end_matches('/');
    trimmed.strip_suffix("/v2").unwrap_or(trimmed)
}

/// Image present on a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedImage {
    pub id: String,
    pub device_id: String,
    pub watcher_id: String,
    pub repo_tags: Vec<String>,
    pub repo_digests: Vec<String>,
    pub size: i64,
    pub created: i64,
    pub labels: HashMap<String, String>,
}

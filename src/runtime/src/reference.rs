//! Image name parsing.
//!
//! Splits the image name a container was started from
//! (`ghcr.io/org/app:1.2.3`) into registry domain, repository path and tag.
//! Unlike a pull reference, nothing is defaulted: an image without a domain
//! keeps an empty domain so the provider that claims it decides how to
//! normalize it.

use a3s_watch_core::error::{Result, WatchError};

/// Default tag when none is specified.
pub const DEFAULT_TAG: &str = "latest";

/// Parsed image name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageName {
    /// Registry domain (e.g., "ghcr.io", "localhost:5000"), if present
    pub domain: Option<String>,
    /// Repository path (e.g., "nginx", "org/app")
    pub path: String,
    /// Tag, `latest` when neither a tag nor a digest is given
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageName {
    /// Parse an image name.
    ///
    /// Supports formats:
    /// - `nginx` → path `nginx`, tag `latest`
    /// - `nginx:1.25` → path `nginx`, tag `1.25`
    /// - `ghcr.io/org/app:tag` → domain `ghcr.io`, path `org/app`
    /// - `localhost:5000/app` → domain `localhost:5000`, path `app`
    /// - `ghcr.io/org/app@sha256:abc...` → digest, no tag
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WatchError::Other("Empty image name".to_string()));
        }

        let (name_tag, digest) = match name.rfind('@') {
            Some(at) => {
                let digest = &name[at + 1..];
                if !digest.contains(':') {
                    return Err(WatchError::Other(format!(
                        "Invalid digest in image name '{}': expected algorithm:hex",
                        name
                    )));
                }
                (&name[..at], Some(digest.to_string()))
            }
            None => (name, None),
        };

        // The tag separator is the last colon after the last slash
        let last_segment_start = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
        let (repo, tag) = match name_tag[last_segment_start..].rfind(':') {
            Some(colon) => {
                let split = last_segment_start + colon;
                (&name_tag[..split], Some(name_tag[split + 1..].to_string()))
            }
            None => (name_tag, None),
        };

        let (domain, path) = split_domain(repo);
        if path.is_empty() {
            return Err(WatchError::Other(format!(
                "Empty repository in image name '{}'",
                name
            )));
        }

        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag,
        };

        Ok(ImageName {
            domain,
            path: path.to_string(),
            tag,
            digest,
        })
    }
}

/// The first component is a domain when it contains a dot or a port, or is
/// `localhost`.
fn split_domain(repo: &str) -> (Option<String>, &str) {
    if let Some(slash) = repo.find('/') {
        let first = &repo[..slash];
        if first.contains('.') || first.contains(':') || first == "localhost" {
            return (Some(first.to_string()), &repo[slash + 1..]);
        }
    }
    (None, repo)
}

//! Registry manifest documents.
//!
//! Only the fields needed to resolve a tag to a digest are modelled. The
//! same document type covers legacy schema 1 manifests, schema 2 manifest
//! lists / OCI indexes and single schema 2 / OCI manifests.

use a3s_watch_core::image::ImageRef;
use serde::Deserialize;

pub const MEDIA_TYPE_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_CONTAINER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const MEDIA_TYPE_OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";

/// `Accept` header sent when fetching a manifest by tag or digest.
pub const MANIFEST_ACCEPT: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json, application/vnd.oci.image.index.v1+json";

/// Manifest response body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<ManifestEntry>,
    #[serde(default)]
    pub config: Option<Descriptor>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Entry of a manifest list / index
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub digest: String,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default)]
    pub variant: Option<String>,
}

/// Content descriptor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub digest: String,
    #[serde(default)]
    pub media_type: Option<String>,
}

/// Schema 1 history entry; `v1Compatibility` is an embedded JSON string
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

#[derive(Debug, Deserialize)]
struct V1Compatibility {
    #[serde(default)]
    config: Option<V1Config>,
    #[serde(default)]
    created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct V1Config {
    #[serde(rename = "Image", default)]
    image: Option<String>,
}

/// What a manifest document points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSelection {
    /// Schema 1: the config image digest, final
    Legacy {
        digest: String,
        created: Option<String>,
    },
    /// Schema 2: a descriptor whose media type decides the next step
    Descriptor { digest: String, media_type: String },
    /// Nothing usable
    NotFound,
}

impl Manifest {
    /// Pick the digest this manifest resolves to for `image`.
    pub fn select(&self, image: &ImageRef) -> ManifestSelection {
        match self.schema_version {
            1 => self.select_legacy(),
            2 if self.is_index() => self.select_platform(image),
            2 => match &self.config {
                Some(config) => ManifestSelection::Descriptor {
                    digest: config.digest.clone(),
                    media_type: config.media_type.clone().unwrap_or_default(),
                },
                None => ManifestSelection::NotFound,
            },
            _ => ManifestSelection::NotFound,
        }
    }

    fn is_index(&self) -> bool {
        match self.media_type.as_deref() {
            Some(MEDIA_TYPE_MANIFEST_LIST) | Some(MEDIA_TYPE_OCI_INDEX) => true,
            // OCI indexes may omit their own media type
            None => !self.manifests.is_empty(),
            Some(_) => false,
        }
    }

    fn select_legacy(&self) -> ManifestSelection {
        let Some(entry) = self.history.first() else {
            return ManifestSelection::NotFound;
        };
        let Ok(compat) = serde_json::from_str::<V1Compatibility>(&entry.v1_compatibility) else {
            return ManifestSelection::NotFound;
        };
        match compat.config.and_then(|c| c.image) {
            Some(digest) => ManifestSelection::Legacy {
                digest,
                created: compat.created,
            },
            None => ManifestSelection::NotFound,
        }
    }

    /// Among entries matching architecture and os, prefer the one whose
    /// variant comes earliest in the local image's variant list; otherwise
    /// take the first match.
    fn select_platform(&self, image: &ImageRef) -> ManifestSelection {
        let matching: Vec<&ManifestEntry> = self
            .manifests
            .iter()
            .filter(|entry| {
                entry.platform.as_ref().is_some_and(|p| {
                    p.architecture == image.architecture && p.os == image.os
                })
            })
            .collect();

        let chosen = if matching.len() > 1 {
            image
                .variant
                .iter()
                .find_map(|wanted| {
                    matching.iter().find(|entry| {
                        entry
                            .platform
                            .as_ref()
                            .and_then(|p| p.variant.as_ref())
                            .is_some_and(|v| v == wanted)
                    })
                })
                .or_else(|| matching.first())
        } else {
            matching.first()
        };

        match chosen {
            Some(entry) => ManifestSelection::Descriptor {
                digest: entry.digest.clone(),
                media_type: entry.media_type.clone().unwrap_or_default(),
            },
            None => ManifestSelection::NotFound,
        }
    }
}

/// Media types whose digest must be confirmed with a `HEAD` request.
pub fn is_manifest_media_type(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_MANIFEST_V2 || media_type == MEDIA_TYPE_OCI_MANIFEST
}

/// Media types of an image config blob.
pub fn is_config_media_type(media_type: &str) -> bool {
    media_type == MEDIA_TYPE_CONTAINER_CONFIG || media_type == MEDIA_TYPE_OCI_CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn local(arch: &str, os: &str, variant: &[&str]) -> ImageRef {
        ImageRef {
            architecture: arch.to_string(),
            os: os.to_string(),
            variant: variant.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        }
    }

    fn manifest(value: serde_json::Value) -> Manifest {
        serde_json::from_value(value).unwrap()
    }

    fn list() -> Manifest {
        manifest(json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_MANIFEST_LIST,
            "manifests": [
                {"digest": "sha256:amd64", "mediaType": MEDIA_TYPE_MANIFEST_V2,
                 "platform": {"architecture": "amd64", "os": "linux"}},
                {"digest": "sha256:armv7", "mediaType": MEDIA_TYPE_MANIFEST_V2,
                 "platform": {"architecture": "arm64", "os": "linux", "variant": "v7"}},
                {"digest": "sha256:armv8", "mediaType": MEDIA_TYPE_MANIFEST_V2,
                 "platform": {"architecture": "arm64", "os": "linux", "variant": "v8"}}
            ]
        }))
    }

    #[test]
    fn test_select_platform_prefers_variant() {
        let selection = list().select(&local("arm64", "linux", &["v8"]));
        assert_eq!(
            selection,
            ManifestSelection::Descriptor {
                digest: "sha256:armv8".to_string(),
                media_type: MEDIA_TYPE_MANIFEST_V2.to_string(),
            }
        );
    }

    #[test]
    fn test_select_platform_follows_variant_order() {
        // The local variant comes first even though v7 is listed first remotely
        let selection = list().select(&local("arm64", "linux", &["v8", "v7"]));
        match selection {
            ManifestSelection::Descriptor { digest, .. } => assert_eq!(digest, "sha256:armv8"),
            other => panic!("unexpected selection: {:?}", other),
        }
    }

    #[test]
    fn test_select_platform_first_match_without_variant() {
        let selection = list().select(&local("arm64", "linux", &[]));
        match selection {
            ManifestSelection::Descriptor { digest, .. } => assert_eq!(digest, "sha256:armv7"),
            other => panic!("unexpected selection: {:?}", other),
        }
    }

    #[test]
    fn test_select_platform_single_match() {
        let selection = list().select(&local("amd64", "linux", &["v8"]));
        match selection {
            ManifestSelection::Descriptor { digest, .. } => assert_eq!(digest, "sha256:amd64"),
            other => panic!("unexpected selection: {:?}", other),
        }
    }

    #[test]
    fn test_select_platform_no_match() {
        let selection = list().select(&local("s390x", "linux", &[]));
        assert_eq!(selection, ManifestSelection::NotFound);
    }

    #[test]
    fn test_select_single_manifest_config() {
        let m = manifest(json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_MANIFEST_V2,
            "config": {"digest": "sha256:cfg", "mediaType": MEDIA_TYPE_CONTAINER_CONFIG}
        }));
        assert_eq!(
            m.select(&local("amd64", "linux", &[])),
            ManifestSelection::Descriptor {
                digest: "sha256:cfg".to_string(),
                media_type: MEDIA_TYPE_CONTAINER_CONFIG.to_string(),
            }
        );
    }

    #[test]
    fn test_select_oci_index_without_media_type() {
        let m = manifest(json!({
            "schemaVersion": 2,
            "manifests": [
                {"digest": "sha256:oci", "mediaType": MEDIA_TYPE_OCI_MANIFEST,
                 "platform": {"architecture": "amd64", "os": "linux"}}
            ]
        }));
        match m.select(&local("amd64", "linux", &[])) {
            ManifestSelection::Descriptor { digest, media_type } => {
                assert_eq!(digest, "sha256:oci");
                assert!(is_manifest_media_type(&media_type));
            }
            other => panic!("unexpected selection: {:?}", other),
        }
    }

    #[test]
    fn test_select_legacy() {
        let compat = json!({
            "config": {"Image": "sha256:legacy"},
            "created": "2020-01-01T00:00:00Z"
        })
        .to_string();
        let m = manifest(json!({
            "schemaVersion": 1,
            "history": [{"v1Compatibility": compat}]
        }));
        assert_eq!(
            m.select(&local("amd64", "linux", &[])),
            ManifestSelection::Legacy {
                digest: "sha256:legacy".to_string(),
                created: Some("2020-01-01T00:00:00Z".to_string()),
            }
        );
    }

    #[test]
    fn test_select_legacy_without_history() {
        let m = manifest(json!({"schemaVersion": 1}));
        assert_eq!(m.select(&local("amd64", "linux", &[])), ManifestSelection::NotFound);
    }

    #[test]
    fn test_media_type_helpers() {
        assert!(is_manifest_media_type(MEDIA_TYPE_OCI_MANIFEST));
        assert!(!is_manifest_media_type(MEDIA_TYPE_OCI_CONFIG));
        assert!(is_config_media_type(MEDIA_TYPE_OCI_CONFIG));
        assert!(!is_config_media_type(MEDIA_TYPE_MANIFEST_LIST));
    }
}

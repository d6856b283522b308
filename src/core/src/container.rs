//! Tracked containers and the update verdict.

use crate::image::ImageRef;
use crate::labels::DEFAULT_ICON;
use crate::tag::{render_link, semver_diff, transform_tag, SemverDiff, TagFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status assigned to containers whose device could not be listed
pub const STATUS_UNREACHABLE: &str = "unreachable";

/// Latest version found on the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub tag: String,
    pub digest: Option<String>,
    pub created: Option<String>,
}

/// Failure recorded on a container by update detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerError {
    pub message: String,
}

/// What kind of update is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Tag,
    Digest,
    Unknown,
}

/// Description of an available update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateKind {
    pub kind: UpdateType,
    pub local_value: Option<String>,
    pub remote_value: Option<String>,
    pub semver_diff: Option<SemverDiff>,
}

/// Container observed on a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedContainer {
    /// Engine container id
    pub id: String,
    pub name: String,
    pub device_id: String,
    pub watcher_id: String,
    /// Engine-reported state (`running`, `exited`, ...) or `unreachable`
    pub status: String,
    pub image: ImageRef,
    pub result: Option<UpdateResult>,
    pub error: Option<ContainerError>,
    pub labels: HashMap<String, String>,
    pub include_tags: Option<String>,
    pub exclude_tags: Option<String>,
    pub transform_tags: Option<String>,
    pub link_template: Option<String>,
    pub link: Option<String>,
    pub display_name: String,
    pub display_icon: String,
    pub update_available: bool,
    pub update_kind: Option<UpdateKind>,
}

impl TrackedContainer {
    /// Tag filter built from the container's labels.
    pub fn tag_filter(&self) -> TagFilter<'_> {
        TagFilter {
            include: self.include_tags.as_deref(),
            exclude: self.exclude_tags.as_deref(),
            transform: self.transform_tags.as_deref(),
        }
    }

    /// Display icon, falling back to the default.
    pub fn icon(&self) -> &str {
        if self.display_icon.is_empty() {
            DEFAULT_ICON
        } else {
            &self.display_icon
        }
    }

    /// Whether the registry holds something newer than what runs locally.
    ///
    /// A tag change counts once transformation is applied to both sides.
    /// For digest-watched images with both digests known, a digest
    /// difference counts too.
    pub fn is_update_available(&self) -> bool {
        let Some(result) = &self.result else {
            return false;
        };
        let transform = self.transform_tags.as_deref();
        let tag_changed =
            transform_tag(transform, &self.image.tag.value) != transform_tag(transform, &result.tag);

        let digest_changed = match (&self.image.digest.value, &result.digest) {
            (Some(local), Some(remote)) if self.image.digest.watch => local != remote,
            _ => false,
        };
        tag_changed || digest_changed
    }

    /// Classify the available update. Tag updates take precedence.
    pub fn compute_update_kind(&self) -> Option<UpdateKind> {
        let result = self.result.as_ref()?;
        if !self.update_available {
            return None;
        }
        if self.image.tag.value != result.tag {
            let diff = if self.image.tag.semver {
                let transform = self.transform_tags.as_deref();
                semver_diff(
                    &transform_tag(transform, &self.image.tag.value),
                    &transform_tag(transform, &result.tag),
                )
            } else {
                SemverDiff::Unknown
            };
            return Some(UpdateKind {
                kind: UpdateType::Tag,
                local_value: Some(self.image.tag.value.clone()),
                remote_value: Some(result.tag.clone()),
                semver_diff: Some(diff),
            });
        }
        if self.image.digest.watch {
            return Some(UpdateKind {
                kind: UpdateType::Digest,
                local_value: self.image.digest.value.clone(),
                remote_value: result.digest.clone(),
                semver_diff: None,
            });
        }
        Some(UpdateKind {
            kind: UpdateType::Unknown,
            local_value: None,
            remote_value: None,
            semver_diff: None,
        })
    }

    /// Render the release link for the running tag.
    pub fn compute_link(&self) -> Option<String> {
        let template = self.link_template.as_deref()?;
        let tag = transform_tag(self.transform_tags.as_deref(), &self.image.tag.value);
        Some(render_link(template, &tag, self.image.tag.semver))
    }

    /// Recompute the derived fields (update verdict, kind, link).
    pub fn refresh_derived(&mut self) {
        self.update_available = self.is_update_available();
        self.update_kind = self.compute_update_kind();
        self.link = self.compute_link();
    }

    /// Whether any tracked field differs from a previously stored record.
    pub fn has_changed(&self, stored: &TrackedContainer) -> bool {
        self.status != stored.status
            || has_result_changed(self.result.as_ref(), stored.result.as_ref())
            || self.labels != stored.labels
            || self.update_available != stored.update_available
            || self.error != stored.error
            || self.image != stored.image
            || self.name != stored.name
    }
}

/// Whether two update results differ in tag, digest or creation time.
pub fn has_result_changed(a: Option<&UpdateResult>, b: Option<&UpdateResult>) -> bool {
    match (a, b) {
        (None, None) => false,
        (Some(a), Some(b)) => a.tag != b.tag || a.digest != b.digest || a.created != b.created,
        _ => true,
    }
}

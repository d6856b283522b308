//! Container labels understood by the watcher.
//!
//! # Label Schema
//!
//! - `wud.watch` - Watch this container (`true`/`false`)
//! - `wud.watch.digest` - Watch the image digest (`true`/`false`)
//! - `wud.tag.include` - Regex remote tags must match
//! - `wud.tag.exclude` - Regex remote tags must not match
//! - `wud.tag.transform` - `<regex> => <replacement>` applied to tags
//! - `wud.link.template` - Release notes link template
//! - `wud.display.name` - Display name
//! - `wud.display.icon` - Display icon
//!
//! # Example
//!
//! ```yaml
//! labels:
//!   wud.watch: "true"
//!   wud.tag.include: "^\\d+\\.\\d+\\.\\d+$"
//!   wud.link.template: "https://github.com/nginx/nginx/releases/tag/release-${major}.${minor}.${patch}"
//! ```

use std::collections::HashMap;

pub const WATCH: &str = "wud.watch";
pub const WATCH_DIGEST: &str = "wud.watch.digest";
pub const TAG_INCLUDE: &str = "wud.tag.include";
pub const TAG_EXCLUDE: &str = "wud.tag.exclude";
pub const TAG_TRANSFORM: &str = "wud.tag.transform";
pub const LINK_TEMPLATE: &str = "wud.link.template";
pub const DISPLAY_NAME: &str = "wud.display.name";
pub const DISPLAY_ICON: &str = "wud.display.icon";

/// Default icon for containers without a `wud.display.icon` label
pub const DEFAULT_ICON: &str = "mdi:docker";

/// Watch-related settings parsed from container labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchLabels {
    pub watch: Option<String>,
    pub watch_digest: Option<String>,
    pub include_tags: Option<String>,
    pub exclude_tags: Option<String>,
    pub transform_tags: Option<String>,
    pub link_template: Option<String>,
    pub display_name: Option<String>,
    pub display_icon: Option<String>,
}

impl WatchLabels {
    /// Parse watch settings from a label map. Empty values count as absent.
    pub fn from_labels(labels: &HashMap<String, String>) -> Self {
        let get = |key: &str| labels.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            watch: get(WATCH),
            watch_digest: get(WATCH_DIGEST),
            include_tags: get(TAG_INCLUDE),
            exclude_tags: get(TAG_EXCLUDE),
            transform_tags: get(TAG_TRANSFORM),
            link_template: get(LINK_TEMPLATE),
            display_name: get(DISPLAY_NAME),
            display_icon: get(DISPLAY_ICON),
        }
    }
}

/// Whether a container is watched, given its `wud.watch` label.
pub fn is_container_to_watch(label: Option<&str>, watch_by_default: bool) -> bool {
    match label.filter(|v| !v.is_empty()) {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => watch_by_default,
    }
}

/// Whether an image digest is watched, given its `wud.watch.digest` label.
///
/// Without a label, non-semver tags are digest-watched and semver tags are not.
pub fn is_digest_to_watch(label: Option<&str>, is_semver: bool) -> bool {
    match label.filter(|v| !v.is_empty()) {
        Some(value) => value.eq_ignore_ascii_case("true"),
        None => !is_semver,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_labels() {
        let mut labels = HashMap::new();
        labels.insert(WATCH.to_string(), "true".to_string());
        labels.insert(TAG_INCLUDE.to_string(), "^1\\.".to_string());
        labels.insert(DISPLAY_NAME.to_string(), String::new());
        labels.insert("com.example.other".to_string(), "x".to_string());

        let parsed = WatchLabels::from_labels(&labels);
        assert_eq!(parsed.watch.as_deref(), Some("true"));
        assert_eq!(parsed.include_tags.as_deref(), Some("^1\\."));
        assert_eq!(parsed.display_name, None);
        assert_eq!(parsed.transform_tags, None);
    }

    #[test]
    fn test_is_container_to_watch() {
        assert!(is_container_to_watch(Some("TRUE"), false));
        assert!(!is_container_to_watch(Some("false"), true));
        assert!(!is_container_to_watch(Some("yes"), true));
        assert!(is_container_to_watch(None, true));
        assert!(!is_container_to_watch(Some(""), false));
    }

    #[test]
    fn test_is_digest_to_watch() {
        assert!(is_digest_to_watch(None, false));
        assert!(!is_digest_to_watch(None, true));
        assert!(is_digest_to_watch(Some("true"), true));
        assert!(!is_digest_to_watch(Some("false"), false));
        assert!(is_digest_to_watch(Some(""), false));
    }
}

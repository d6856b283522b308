//! Tag comparison.
//!
//! Semver-aware parsing, transformation, filtering and ordering of image
//! tags. Everything here is pure; callers decide what to do with the
//! resulting candidates.

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::OnceLock;

fn coerce_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|\D)(\d{1,16})(?:\.(\d{1,16}))?(?:\.(\d{1,16}))?(?:$|\D)").ok()
    })
    .as_ref()
}

/// Parse a tag as semver.
///
/// A strict parse is attempted first (after dropping a leading `v` or `=`);
/// failing that, the first `N[.N[.N]]` run is coerced, so `1.25` becomes
/// `1.25.0` and `3.18-alpine` becomes `3.18.0`. Tags without digits, such as
/// `latest`, are not semver.
pub fn parse_semver(raw: &str) -> Option<Version> {
    let cleaned = raw
        .trim()
        .trim_start_matches(|c: char| c == '=' || c == 'v' || c == 'V');
    if let Ok(version) = Version::parse(cleaned) {
        return Some(version);
    }
    coerce(raw)
}

fn coerce(raw: &str) -> Option<Version> {
    let caps = coerce_regex()?.captures(raw)?;
    let part = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    Some(Version::new(part(1)?, part(2)?, part(3)?))
}

/// True when `candidate` is a strictly greater semver than `reference`.
pub fn is_greater_semver(candidate: &str, reference: &str) -> bool {
    match (parse_semver(candidate), parse_semver(reference)) {
        (Some(a), Some(b)) => a > b,
        _ => false,
    }
}

/// Apply a `<regex> => <replacement>` formula to a tag.
///
/// Capture groups are referenced as `$1`, `$2`, ... in the replacement. A
/// missing, malformed or non-matching formula leaves the tag unchanged.
pub fn transform_tag(formula: Option<&str>, tag: &str) -> String {
    let Some(formula) = formula.filter(|f| !f.trim().is_empty()) else {
        return tag.to_string();
    };
    let Some((pattern, replacement)) = formula.split_once("=>") else {
        tracing::warn!(formula, "Invalid tag transform formula");
        return tag.to_string();
    };
    let regex = match Regex::new(pattern.trim()) {
        Ok(regex) => regex,
        Err(e) => {
            tracing::warn!(formula, error = %e, "Invalid tag transform regex");
            return tag.to_string();
        }
    };
    match regex.captures(tag) {
        Some(caps) => {
            let mut out = String::new();
            caps.expand(replacement.trim(), &mut out);
            out
        }
        None => tag.to_string(),
    }
}

/// Lexicographically descending, deduplicated tag list.
pub fn sort_tags_desc(mut tags: Vec<String>) -> Vec<String> {
    tags.sort_unstable_by(|a, b| b.cmp(a));
    tags.dedup();
    tags
}

/// Semver distance between two versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemverDiff {
    Major,
    Minor,
    Patch,
    Prerelease,
    Unknown,
}

/// Classify the difference between a local and a remote tag.
pub fn semver_diff(local: &str, remote: &str) -> SemverDiff {
    let (Some(a), Some(b)) = (parse_semver(local), parse_semver(remote)) else {
        return SemverDiff::Unknown;
    };
    if a.major != b.major {
        SemverDiff::Major
    } else if a.minor != b.minor {
        SemverDiff::Minor
    } else if a.patch != b.patch {
        SemverDiff::Patch
    } else if a.pre != b.pre {
        SemverDiff::Prerelease
    } else {
        SemverDiff::Unknown
    }
}

/// Tag selection rules attached to a container through labels
#[derive(Debug, Clone, Copy, Default)]
pub struct TagFilter<'a> {
    /// Keep only tags matching this regex
    pub include: Option<&'a str>,
    /// Drop tags matching this regex
    pub exclude: Option<&'a str>,
    /// `<regex> => <replacement>` applied before semver comparison
    pub transform: Option<&'a str>,
}

impl<'a> TagFilter<'a> {
    /// Keep tags matching `include` and not matching `exclude`.
    ///
    /// An invalid regex is logged and ignored rather than filtering
    /// everything out.
    pub fn filter(&self, tags: &[String]) -> Vec<String> {
        let include = self.include.and_then(|p| compile("include", p));
        let exclude = self.exclude.and_then(|p| compile("exclude", p));
        tags.iter()
            .filter(|tag| include.as_ref().map_or(true, |re| re.is_match(tag)))
            .filter(|tag| exclude.as_ref().map_or(true, |re| !re.is_match(tag)))
            .cloned()
            .collect()
    }

    /// Remote tags that are newer than `local_tag`, best first.
    ///
    /// Only a semver local tag yields candidates: remote tags must be semver
    /// after transformation and strictly greater than the local one. A
    /// non-semver local tag (e.g. `latest`) never proposes another tag and
    /// relies on digest watching instead.
    pub fn candidates(&self, local_tag: &str, local_is_semver: bool, tags: &[String]) -> Vec<String> {
        if !local_is_semver {
            return Vec::new();
        }
        let local = transform_tag(self.transform, local_tag);
        let Some(local_version) = parse_semver(&local) else {
            return Vec::new();
        };

        let mut versioned: Vec<(Version, String)> = self
            .filter(tags)
            .into_iter()
            .filter_map(|tag| {
                let version = parse_semver(&transform_tag(self.transform, &tag))?;
                (version > local_version).then_some((version, tag))
            })
            .collect();

        versioned.sort_by(|(a, tag_a), (b, tag_b)| match b.cmp(a) {
            Ordering::Equal => tag_b.cmp(tag_a),
            other => other,
        });
        versioned.into_iter().map(|(_, tag)| tag).collect()
    }
}

fn compile(kind: &str, pattern: &str) -> Option<Regex> {
    if pattern.is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(kind, pattern, error = %e, "Ignoring invalid tag regex");
            None
        }
    }
}

/// Render a link template for a tag.
///
/// Supports `${raw}` always and `${major}`, `${minor}`, `${patch}`,
/// `${prerelease}` when the tag is semver.
pub fn render_link(template: &str, tag: &str, is_semver: bool) -> String {
    let mut link = replace_placeholder(template, "raw", tag);
    if is_semver {
        if let Some(version) = parse_semver(tag) {
            let prerelease = version
                .pre
                .as_str()
                .split('.')
                .next()
                .unwrap_or_default()
                .to_string();
            link = replace_placeholder(&link, "major", &version.major.to_string());
            link = replace_placeholder(&link, "minor", &version.minor.to_string());
            link = replace_placeholder(&link, "patch", &version.patch.to_string());
            link = replace_placeholder(&link, "prerelease", &prerelease);
        }
    }
    link
}

fn replace_placeholder(template: &str, name: &str, value: &str) -> String {
    let pattern = format!(r"\$\{{\s*{}\s*\}}", name);
    match Regex::new(&pattern) {
        Ok(regex) => regex.replace_all(template, regex::NoExpand(value)).into_owned(),
        Err(_) => template.to_string(),
    }
}

//! Generic Docker Registry HTTP API V2 client.
//!
//! Shared by every provider: providers only decide how a request is
//! authenticated and how tag pages are chained; the protocol itself lives
//! here.

use super::manifest::{
    is_config_media_type, is_manifest_media_type, Manifest, ManifestSelection, MANIFEST_ACCEPT,
};
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::image::ImageRef;
use a3s_watch_core::tag::sort_tags_desc;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::Method;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

/// Tags requested per page
pub const PAGE_SIZE: u32 = 1000;

const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// Outgoing registry request, before and after authentication.
#[derive(Debug, Clone)]
pub struct RegistryRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

impl RegistryRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self {
            method: Method::HEAD,
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Set the `Accept` header.
    pub fn accept(mut self, media_type: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(media_type) {
            self.headers.insert(ACCEPT, value);
        }
        self
    }

    /// Set the `Authorization` header to `<scheme> <credentials>`.
    pub fn authorization(mut self, scheme: &str, credentials: &str) -> Result<Self> {
        let value = HeaderValue::from_str(&format!("{} {}", scheme, credentials))
            .map_err(|e| WatchError::Other(format!("Invalid authorization header: {}", e)))?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// The `Authorization` header, if set.
    pub fn authorization_header(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
    }
}

/// How consecutive tag pages are requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `&last=<last tag of the previous page>`
    Last,
    /// `&next_page=<token from the Link header>`
    NextPage,
}

/// Attaches credentials to requests for one provider.
#[async_trait]
pub trait Authenticate: Send + Sync {
    async fn authenticate(&self, image: &ImageRef, request: RegistryRequest)
        -> Result<RegistryRequest>;

    fn pagination(&self) -> Pagination {
        Pagination::Last
    }
}

/// Resolved manifest digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDigest {
    pub digest: String,
    /// 1: config digest comparison, 2: manifest content digest
    pub version: u8,
    pub created: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsPage {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Registry V2 protocol client
#[derive(Debug, Clone)]
pub struct V2Client {
    http: reqwest::Client,
}

impl Default for V2Client {
    fn default() -> Self {
        Self::new()
    }
}

impl V2Client {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// Underlying HTTP client, shared with token endpoints.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Authenticate and send a request. Any failure, including a non-2xx
    /// status, is reported as a registry call error for `image`.
    pub async fn call(
        &self,
        auth: &dyn Authenticate,
        image: &ImageRef,
        request: RegistryRequest,
    ) -> Result<reqwest::Response> {
        let url = request.url.clone();
        let request = auth
            .authenticate(image, request)
            .await
            .map_err(|e| registry_error(image, &url, e.to_string()))?;

        tracing::debug!(method = %request.method, url = %url, image = %image.name, "Calling registry");
        let response = self
            .http
            .request(request.method, &request.url)
            .headers(request.headers)
            .send()
            .await
            .map_err(|e| registry_error(image, &url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(registry_error(image, &url, status.to_string()));
        }
        Ok(response)
    }

    /// All tags of an image repository, following pagination until the
    /// registry stops sending a `Link` header.
    pub async fn get_tags(&self, auth: &dyn Authenticate, image: &ImageRef) -> Result<Vec<String>> {
        let base = format!(
            "{}/{}/tags/list?n={}",
            image.registry.url, image.name, PAGE_SIZE
        );
        let pagination = auth.pagination();
        let mut tags = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let url = match (&cursor, pagination) {
                (None, _) => base.clone(),
                (Some(last), Pagination::Last) => format!("{}&last={}", base, last),
                (Some(token), Pagination::NextPage) => format!("{}&next_page={}", base, token),
            };
            let response = self
                .call(auth, image, RegistryRequest::get(&url).accept("application/json"))
                .await?;
            let link = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let page: TagsPage = response
                .json()
                .await
                .map_err(|e| registry_error(image, &url, e.to_string()))?;

            let page_tags = page.tags.unwrap_or_default();
            let last = page_tags.last().cloned();
            let mut added = 0usize;
            for tag in page_tags {
                if seen.insert(tag.clone()) {
                    tags.push(tag);
                    added += 1;
                }
            }

            let Some(link) = link else { break };
            let next = match pagination {
                Pagination::Last => last,
                Pagination::NextPage => next_page_token(&link),
            };
            // A page that adds nothing cannot advance the cursor
            match next {
                Some(next) if added > 0 && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }

        tracing::debug!(image = %image.name, count = tags.len(), "Listed registry tags");
        Ok(sort_tags_desc(tags))
    }

    /// Resolve a tag (default: the image tag) or digest to a digest.
    pub async fn get_image_manifest_digest(
        &self,
        auth: &dyn Authenticate,
        image: &ImageRef,
        digest: Option<&str>,
    ) -> Result<ManifestDigest> {
        let reference = digest.unwrap_or(&image.tag.value);
        let url = format!(
            "{}/{}/manifests/{}",
            image.registry.url, image.name, reference
        );
        let response = self
            .call(auth, image, RegistryRequest::get(&url).accept(MANIFEST_ACCEPT))
            .await?;
        let manifest: Manifest = response
            .json()
            .await
            .map_err(|e| registry_error(image, &url, e.to_string()))?;

        let (digest, media_type) = match manifest.select(image) {
            ManifestSelection::Legacy { digest, created } => {
                return Ok(ManifestDigest {
                    digest,
                    version: 1,
                    created,
                })
            }
            ManifestSelection::Descriptor { digest, media_type } => (digest, media_type),
            ManifestSelection::NotFound => return Err(manifest_not_found(image)),
        };

        if is_manifest_media_type(&media_type) {
            let url = format!("{}/{}/manifests/{}", image.registry.url, image.name, digest);
            let response = self
                .call(auth, image, RegistryRequest::head(&url).accept(&media_type))
                .await?;
            let content_digest = response
                .headers()
                .get(CONTENT_DIGEST_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| manifest_not_found(image))?;
            return Ok(ManifestDigest {
                digest: content_digest,
                version: 2,
                created: None,
            });
        }

        if is_config_media_type(&media_type) {
            return Ok(ManifestDigest {
                digest,
                version: 1,
                created: None,
            });
        }

        Err(manifest_not_found(image))
    }
}

fn next_page_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^.*next_page=(.*)>.*$").ok())
        .as_ref()
}

/// Extract the `next_page` token from a `Link` header.
pub fn next_page_token(link: &str) -> Option<String> {
    next_page_regex()?
        .captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|token| !token.is_empty())
}

fn registry_error(image: &ImageRef, url: &str, message: String) -> WatchError {
    WatchError::RegistryCall {
        image: image.name.clone(),
        url: url.to_string(),
        message,
    }
}

fn manifest_not_found(image: &ImageRef) -> WatchError {
    WatchError::ManifestNotFound {
        image: image.name.clone(),
    }
}

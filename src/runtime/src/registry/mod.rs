//! Registry providers.
//!
//! A [`RegistryProvider`] pairs one provider variant (Docker Hub, ECR,
//! Quay, ...) with the shared [`V2Client`]. Variants are a closed set chosen
//! by identifier at registration; unknown identifiers are rejected.

pub mod client;
pub mod manifest;
pub mod providers;
pub mod resolver;

pub use client::{Authenticate, ManifestDigest, Pagination, RegistryRequest, V2Client};
pub use providers::{mask, AuthPull};
pub use resolver::ProviderRegistry;

use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::image::ImageRef;
use async_trait::async_trait;
use providers::{
    acr::Acr, custom::Custom, ecr::Ecr, gcr::Gcr, ghcr, ghcr::Ghcr, gitlab::Gitlab, hub::Hub,
    quay::Quay,
};
use std::fmt;
use std::str::FromStr;

/// Supported registry providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Hub,
    Custom,
    Gitea,
    Forgejo,
    Ecr,
    Gcr,
    Ghcr,
    Lscr,
    Gitlab,
    Quay,
    Acr,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 11] = [
        ProviderKind::Hub,
        ProviderKind::Custom,
        ProviderKind::Gitea,
        ProviderKind::Forgejo,
        ProviderKind::Ecr,
        ProviderKind::Gcr,
        ProviderKind::Ghcr,
        ProviderKind::Lscr,
        ProviderKind::Gitlab,
        ProviderKind::Quay,
        ProviderKind::Acr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Hub => "hub",
            ProviderKind::Custom => "custom",
            ProviderKind::Gitea => "gitea",
            ProviderKind::Forgejo => "forgejo",
            ProviderKind::Ecr => "ecr",
            ProviderKind::Gcr => "gcr",
            ProviderKind::Ghcr => "ghcr",
            ProviderKind::Lscr => "lscr",
            ProviderKind::Gitlab => "gitlab",
            ProviderKind::Quay => "quay",
            ProviderKind::Acr => "acr",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| WatchError::invalid_field("registry", format!("provider '{}'", s)))
    }
}

/// Provider-specific behavior
#[derive(Debug)]
enum Backend {
    Hub(Hub),
    Custom(Custom),
    Ecr(Ecr),
    Gcr(Gcr),
    Ghcr(Ghcr),
    Gitlab(Gitlab),
    Quay(Quay),
    Acr(Acr),
}

/// A registered registry provider
pub struct RegistryProvider {
    id: String,
    kind: ProviderKind,
    name: String,
    backend: Backend,
    client: V2Client,
}

impl fmt::Debug for RegistryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryProvider")
            .field("id", &self.id)
            .field("configuration", &self.masked_configuration())
            .finish()
    }
}

impl RegistryProvider {
    /// Validate a configuration and build the provider.
    ///
    /// Fails with a configuration validation error for an unknown provider
    /// identifier or a configuration the provider rejects.
    pub async fn register(provider: &str, name: &str, config: &serde_json::Value) -> Result<Self> {
        let kind = ProviderKind::from_str(provider)?;
        let id = format!("registry.{}.{}", kind, name);
        let backend = match kind {
            ProviderKind::Hub => Backend::Hub(Hub::from_config(&id, config)?),
            ProviderKind::Custom | ProviderKind::Gitea | ProviderKind::Forgejo => {
                Backend::Custom(Custom::from_config(&id, config)?)
            }
            ProviderKind::Ecr => {
                let mut ecr = Ecr::from_config(&id, config)?;
                ecr.init().await;
                Backend::Ecr(ecr)
            }
            ProviderKind::Gcr => Backend::Gcr(Gcr::from_config(&id, config)?),
            ProviderKind::Ghcr => Backend::Ghcr(Ghcr::from_config(ghcr::GHCR_HOST, &id, config)?),
            ProviderKind::Lscr => Backend::Ghcr(Ghcr::from_config(ghcr::LSCR_HOST, &id, config)?),
            ProviderKind::Gitlab => Backend::Gitlab(Gitlab::from_config(&id, config)?),
            ProviderKind::Quay => Backend::Quay(Quay::from_config(&id, config)?),
            ProviderKind::Acr => Backend::Acr(Acr::from_config(&id, config)?),
        };
        let provider = Self {
            id,
            kind,
            name: name.to_string(),
            backend,
            client: V2Client::new(),
        };
        tracing::info!(
            id = %provider.id,
            configuration = %provider.masked_configuration(),
            "Registry provider registered"
        );
        Ok(provider)
    }

    /// Component id (`registry.<provider>.<name>`).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this provider is authoritative for the image's registry.
    pub fn matches(&self, image: &ImageRef) -> bool {
        match &self.backend {
            Backend::Hub(p) => p.matches(image),
            Backend::Custom(p) => p.matches(image),
            Backend::Ecr(p) => p.matches(image),
            Backend::Gcr(p) => p.matches(image),
            Backend::Ghcr(p) => p.matches(image),
            Backend::Gitlab(p) => p.matches(image),
            Backend::Quay(p) => p.matches(image),
            Backend::Acr(p) => p.matches(image),
        }
    }

    /// Rewrite the image's registry to this provider's canonical form.
    pub fn normalize_image(&self, image: &ImageRef) -> ImageRef {
        let mut normalized = image.clone();
        match &self.backend {
            Backend::Hub(p) => p.normalize(&mut normalized),
            Backend::Custom(p) => p.normalize(&mut normalized),
            Backend::Ecr(p) => p.normalize(&mut normalized),
            Backend::Gcr(p) => p.normalize(&mut normalized),
            Backend::Ghcr(p) => p.normalize(&mut normalized),
            Backend::Gitlab(p) => p.normalize(&mut normalized),
            Backend::Quay(p) => p.normalize(&mut normalized),
            Backend::Acr(p) => p.normalize(&mut normalized),
        }
        normalized.registry.name = self.id.clone();
        normalized
    }

    /// All tags of the image repository, newest first.
    pub async fn get_tags(&self, image: &ImageRef) -> Result<Vec<String>> {
        self.client.get_tags(self, image).await
    }

    /// Resolve the image tag, or `digest` when given, to a digest.
    pub async fn get_image_manifest_digest(
        &self,
        image: &ImageRef,
        digest: Option<&str>,
    ) -> Result<ManifestDigest> {
        self.client.get_image_manifest_digest(self, image, digest).await
    }

    /// Credentials for an engine pull, if the provider needs any.
    pub async fn get_auth_pull(&self) -> Option<AuthPull> {
        match &self.backend {
            Backend::Hub(p) => p.auth_pull(),
            Backend::Custom(p) => p.auth_pull(),
            Backend::Ecr(p) => p.auth_pull().await,
            Backend::Gcr(p) => p.auth_pull(),
            Backend::Ghcr(p) => p.auth_pull(),
            Backend::Gitlab(p) => p.auth_pull(),
            Backend::Quay(p) => p.auth_pull(),
            Backend::Acr(p) => p.auth_pull(),
        }
    }

    /// Configuration with every secret masked.
    pub fn masked_configuration(&self) -> serde_json::Value {
        match &self.backend {
            Backend::Hub(p) => p.masked(),
            Backend::Custom(p) => p.masked(),
            Backend::Ecr(p) => p.masked(),
            Backend::Gcr(p) => p.masked(),
            Backend::Ghcr(p) => p.masked(),
            Backend::Gitlab(p) => p.masked(),
            Backend::Quay(p) => p.masked(),
            Backend::Acr(p) => p.masked(),
        }
    }
}

#[async_trait]
impl Authenticate for RegistryProvider {
    async fn authenticate(
        &self,
        image: &ImageRef,
        request: RegistryRequest,
    ) -> Result<RegistryRequest> {
        let http = self.client.http();
        match &self.backend {
            Backend::Hub(p) => p.authenticate(http, image, request).await,
            Backend::Custom(p) => p.authenticate(request),
            Backend::Ecr(p) => p.authenticate(request).await,
            Backend::Gcr(p) => p.authenticate(http, image, request).await,
            Backend::Ghcr(p) => p.authenticate(request),
            Backend::Gitlab(p) => p.authenticate(http, image, request).await,
            Backend::Quay(p) => p.authenticate(http, image, request).await,
            Backend::Acr(p) => p.authenticate(request),
        }
    }

    fn pagination(&self) -> Pagination {
        match self.backend {
            Backend::Quay(_) => Pagination::NextPage,
            _ => Pagination::Last,
        }
    }
}

//! Provider registry: which provider owns an image.

use super::RegistryProvider;
use a3s_watch_core::image::{ImageRef, UNKNOWN_REGISTRY};
use parking_lot::RwLock;
use std::sync::Arc;

/// Registered providers in registration order.
///
/// Read-mostly: providers change only through explicit (de)registration.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<Vec<Arc<RegistryProvider>>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider, replacing one with the same id in place.
    pub fn insert(&self, provider: Arc<RegistryProvider>) {
        let mut providers = self.providers.write();
        match providers.iter_mut().find(|p| p.id() == provider.id()) {
            Some(slot) => *slot = provider,
            None => providers.push(provider),
        }
    }

    /// Remove a provider by id.
    pub fn remove(&self, id: &str) -> Option<Arc<RegistryProvider>> {
        let mut providers = self.providers.write();
        let index = providers.iter().position(|p| p.id() == id)?;
        Some(providers.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<Arc<RegistryProvider>> {
        self.providers.read().iter().find(|p| p.id() == id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<RegistryProvider>> {
        self.providers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// First provider, in registration order, that matches the image.
    ///
    /// When several match, the first one wins and the ambiguity is logged.
    pub fn resolve(&self, image: &ImageRef) -> Option<Arc<RegistryProvider>> {
        let providers = self.providers.read();
        let mut matching = providers.iter().filter(|p| p.matches(image));
        let first = matching.next()?.clone();
        let others: Vec<&str> = matching.map(|p| p.id()).collect();
        if !others.is_empty() {
            tracing::warn!(
                image = %image.name,
                chosen = %first.id(),
                ignored = ?others,
                "Several registry providers match image; using the first registered"
            );
        }
        Some(first)
    }

    /// Normalize an image through its provider, or mark its registry
    /// `unknown` when no provider claims it.
    pub fn normalize(&self, image: &ImageRef) -> (ImageRef, Option<Arc<RegistryProvider>>) {
        match self.resolve(image) {
            Some(provider) => (provider.normalize_image(image), Some(provider)),
            None => {
                tracing::warn!(image = %image.name, registry = %image.registry.url, "No registry provider found");
                let mut unknown = image.clone();
                unknown.registry.name = UNKNOWN_REGISTRY.to_string();
                (unknown, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a3s_watch_core::image::RegistryRef;
    use serde_json::json;

    async fn provider(kind: &str, name: &str, config: serde_json::Value) -> Arc<RegistryProvider> {
        Arc::new(RegistryProvider::register(kind, name, &config).await.unwrap())
    }

    fn image(url: &str, name: &str) -> ImageRef {
        ImageRef {
            registry: RegistryRef {
                name: String::new(),
                url: url.to_string(),
            },
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolve_by_host() {
        let registry = ProviderRegistry::new();
        registry.insert(provider("hub", "public", json!({})).await);
        registry.insert(provider("ghcr", "public", json!({})).await);

        let found = registry.resolve(&image("ghcr.io", "org/app")).unwrap();
        assert_eq!(found.id(), "registry.ghcr.public");
        let found = registry.resolve(&image("", "nginx")).unwrap();
        assert_eq!(found.id(), "registry.hub.public");
        assert!(registry.resolve(&image("quay.io", "org/app")).is_none());
    }

    #[tokio::test]
    async fn test_first_registered_wins() {
        let registry = ProviderRegistry::new();
        registry.insert(provider("custom", "a", json!({"url": "https://registry.lan"})).await);
        registry.insert(provider("gitea", "b", json!({"url": "https://registry.lan"})).await);
        let found = registry.resolve(&image("registry.lan", "team/app")).unwrap();
        assert_eq!(found.id(), "registry.custom.a");
    }

    #[tokio::test]
    async fn test_normalize_unknown() {
        let registry = ProviderRegistry::new();
        registry.insert(provider("hub", "public", json!({})).await);
        let (normalized, found) = registry.normalize(&image("quay.io", "org/app"));
        assert!(found.is_none());
        assert_eq!(normalized.registry.name, UNKNOWN_REGISTRY);
        assert_eq!(normalized.registry.url, "quay.io");
    }

    #[tokio::test]
    async fn test_normalize_known() {
        let registry = ProviderRegistry::new();
        registry.insert(provider("hub", "public", json!({})).await);
        let (normalized, found) = registry.normalize(&image("", "nginx"));
        assert_eq!(found.unwrap().id(), "registry.hub.public");
        assert_eq!(normalized.registry.name, "registry.hub.public");
        assert_eq!(normalized.name, "library/nginx");
    }

    #[tokio::test]
    async fn test_insert_replaces_and_remove() {
        let registry = ProviderRegistry::new();
        registry.insert(provider("hub", "public", json!({})).await);
        registry.insert(provider("ghcr", "public", json!({})).await);
        registry.insert(provider("hub", "public", json!({"login": "me", "password": "pw"})).await);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list()[0].id(), "registry.hub.public");

        assert!(registry.remove("registry.hub.public").is_some());
        assert!(registry.remove("registry.hub.public").is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("registry.ghcr.public").is_some());
    }
}

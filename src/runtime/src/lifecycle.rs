//! Component lifecycle manager.
//!
//! Owns every live watcher and registry provider of the process and is the
//! only place they are created or torn down. Components refer to each
//! other by id (`watcher.docker.<name>`, `registry.<provider>.<name>`),
//! never by handle.

use crate::directory::DeviceDirectory;
use crate::engine::EngineFactory;
use crate::metrics::WatchMetrics;
use crate::registry::{ProviderRegistry, RegistryProvider};
use crate::store::Stores;
use crate::watcher::{DeviceWatcher, WatchContext, WatchSettings, WatcherState};
use a3s_watch_core::config::{WatchConfig, WatcherConfig};
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::event::events;
use a3s_watch_core::{EventEmitter, WatchEvent};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Component kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Watcher,
    Registry,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Watcher => write!(f, "watcher"),
            ComponentKind::Registry => write!(f, "registry"),
        }
    }
}

/// Registration record of a live component
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentRecord {
    pub id: String,
    pub kind: ComponentKind,
    /// Watcher lifecycle state; `None` for registries
    pub state: Option<WatcherState>,
}

/// Registry and watcher registrations of one process
pub struct ComponentManager {
    ctx: WatchContext,
    watchers: RwLock<HashMap<String, Arc<DeviceWatcher>>>,
}

impl ComponentManager {
    pub fn new(ctx: WatchContext) -> Self {
        Self {
            ctx,
            watchers: RwLock::new(HashMap::new()),
        }
    }

    /// Build a manager with in-memory stores and a fresh provider registry.
    pub fn with_defaults(
        config: &WatchConfig,
        directory: Arc<dyn DeviceDirectory>,
        engines: Arc<dyn EngineFactory>,
    ) -> Result<Self> {
        Ok(Self::new(WatchContext {
            directory,
            engines,
            stores: Stores::in_memory(),
            providers: ProviderRegistry::new(),
            emitter: EventEmitter::default(),
            metrics: WatchMetrics::new()?,
            settings: WatchSettings::from_config(config),
        }))
    }

    pub fn context(&self) -> &WatchContext {
        &self.ctx
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.ctx.providers
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.ctx.emitter
    }

    /// Register a registry provider, replacing one with the same id.
    pub async fn register_registry(
        &self,
        provider: &str,
        name: &str,
        config: &serde_json::Value,
    ) -> Result<Arc<RegistryProvider>> {
        let registered = match RegistryProvider::register(provider, name, config).await {
            Ok(registered) => Arc::new(registered),
            Err(e) => {
                tracing::error!(provider, name, error = %e, "Registry registration failed");
                return Err(e);
            }
        };
        self.ctx.providers.insert(registered.clone());
        self.emit(events::REGISTRY_REGISTERED, registered.id());
        Ok(registered)
    }

    /// Register a watcher, deregistering a previous one with the same id.
    pub async fn register_watcher(&self, config: WatcherConfig) -> Result<Arc<DeviceWatcher>> {
        let id = DeviceWatcher::component_id(&config.name);
        let previous = self.watchers.write().remove(&id);
        if let Some(previous) = previous {
            tracing::info!(watcher = %id, "Replacing registered watcher");
            previous.deregister().await;
        }

        let watcher = match DeviceWatcher::register(config, &self.ctx).await {
            Ok(watcher) => Arc::new(watcher),
            Err(e) => {
                tracing::error!(watcher = %id, error = %e, "Watcher registration failed");
                return Err(e);
            }
        };
        self.watchers.write().insert(id.clone(), watcher.clone());
        self.emit(events::WATCHER_REGISTERED, &id);
        Ok(watcher)
    }

    /// Re-register a watcher with a new configuration.
    pub async fn update_watcher(&self, config: WatcherConfig) -> Result<Arc<DeviceWatcher>> {
        let id = DeviceWatcher::component_id(&config.name);
        if !self.watchers.read().contains_key(&id) {
            return Err(WatchError::ComponentNotFound(id));
        }
        self.deregister(&id).await?;
        self.register_watcher(config).await
    }

    /// Re-register a registry provider with a new configuration.
    pub async fn update_registry(
        &self,
        provider: &str,
        name: &str,
        config: &serde_json::Value,
    ) -> Result<Arc<RegistryProvider>> {
        let id = format!("registry.{}.{}", provider.to_lowercase(), name);
        if self.ctx.providers.get(&id).is_none() {
            return Err(WatchError::ComponentNotFound(id));
        }
        self.deregister(&id).await?;
        self.register_registry(provider, name, config).await
    }

    /// Deregister a component by id.
    pub async fn deregister(&self, id: &str) -> Result<()> {
        let watcher = self.watchers.write().remove(id);
        if let Some(watcher) = watcher {
            watcher.deregister().await;
            self.emit(events::WATCHER_DEREGISTERED, id);
            return Ok(());
        }
        if self.ctx.providers.remove(id).is_some() {
            tracing::info!(id, "Registry provider deregistered");
            self.emit(events::REGISTRY_DEREGISTERED, id);
            return Ok(());
        }
        Err(WatchError::ComponentNotFound(id.to_string()))
    }

    pub fn find_watcher(&self, id: &str) -> Option<Arc<DeviceWatcher>> {
        self.watchers.read().get(id).cloned()
    }

    pub fn find_registry(&self, id: &str) -> Option<Arc<RegistryProvider>> {
        self.ctx.providers.get(id)
    }

    /// All live components, registries first, each group sorted by id.
    pub fn list(&self) -> Vec<ComponentRecord> {
        let mut registries: Vec<ComponentRecord> = self
            .ctx
            .providers
            .list()
            .iter()
            .map(|p| ComponentRecord {
                id: p.id().to_string(),
                kind: ComponentKind::Registry,
                state: None,
            })
            .collect();
        registries.sort_by(|a, b| a.id.cmp(&b.id));

        let mut watchers: Vec<ComponentRecord> = self
            .watchers
            .read()
            .values()
            .map(|w| ComponentRecord {
                id: w.id().to_string(),
                kind: ComponentKind::Watcher,
                state: Some(w.state()),
            })
            .collect();
        watchers.sort_by(|a, b| a.id.cmp(&b.id));

        registries.extend(watchers);
        registries
    }

    /// Register every registry, then every watcher, of a configuration.
    ///
    /// A failing component does not prevent the others from starting; the
    /// failures are returned with the id of the component that failed.
    pub async fn register_from_config(&self, config: &WatchConfig) -> Vec<(String, WatchError)> {
        let mut failures = Vec::new();
        for entry in &config.registries {
            if let Err(e) = self
                .register_registry(&entry.provider, &entry.name, &entry.config)
                .await
            {
                failures.push((format!("registry.{}.{}", entry.provider, entry.name), e));
            }
        }
        for watcher in &config.watchers {
            if let Err(e) = self.register_watcher(watcher.clone()).await {
                failures.push((DeviceWatcher::component_id(&watcher.name), e));
            }
        }
        tracing::info!(
            registries = self.ctx.providers.len(),
            watchers = self.watchers.read().len(),
            failures = failures.len(),
            "Components registered"
        );
        failures
    }

    /// Deregister every watcher.
    pub async fn shutdown(&self) {
        let watchers: Vec<Arc<DeviceWatcher>> =
            self.watchers.write().drain().map(|(_, w)| w).collect();
        for watcher in watchers {
            watcher.deregister().await;
            self.emit(events::WATCHER_DEREGISTERED, watcher.id());
        }
        tracing::info!("All watchers stopped");
    }

    fn emit(&self, key: &str, id: &str) {
        self.ctx
            .emitter
            .emit(WatchEvent::with_fields(key, [("id", serde_json::json!(id))]));
    }
}

//! Persisted entity stores.
//!
//! Every tracked entity is keyed by `(device_id, natural key)`. Stores only
//! need per-key upsert and delete; no operation takes a store-wide lock.

use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::{TrackedContainer, TrackedImage, TrackedNetwork, TrackedVolume};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Natural key of a tracked entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub device_id: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(device_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            id: id.into(),
        }
    }
}

/// An entity the watcher reconciles.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Store kind, used in logs and errors
    const KIND: &'static str;

    fn key(&self) -> EntityKey;

    fn watcher_id(&self) -> &str;
}

impl Entity for TrackedContainer {
    const KIND: &'static str = "containers";

    fn key(&self) -> EntityKey {
        EntityKey::new(&self.device_id, &self.id)
    }

    fn watcher_id(&self) -> &str {
        &self.watcher_id
    }
}

impl Entity for TrackedImage {
    const KIND: &'static str = "images";

    fn key(&self) -> EntityKey {
        EntityKey::new(&self.device_id, &self.id)
    }

    fn watcher_id(&self) -> &str {
        &self.watcher_id
    }
}

impl Entity for TrackedNetwork {
    const KIND: &'static str = "networks";

    fn key(&self) -> EntityKey {
        EntityKey::new(&self.device_id, &self.id)
    }

    fn watcher_id(&self) -> &str {
        &self.watcher_id
    }
}

impl Entity for TrackedVolume {
    const KIND: &'static str = "volumes";

    fn key(&self) -> EntityKey {
        EntityKey::new(&self.device_id, &self.name)
    }

    fn watcher_id(&self) -> &str {
        &self.watcher_id
    }
}

/// Persistence for one entity type.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    async fn find_all_by_watcher(&self, watcher_id: &str) -> Result<Vec<T>>;

    async fn find_by_key(&self, key: &EntityKey) -> Result<Option<T>>;

    /// Insert a new entity; fails if the key is taken.
    async fn create(&self, entity: T) -> Result<T>;

    /// Replace an existing entity; fails if the key is unknown.
    async fn update(&self, entity: T) -> Result<T>;

    /// Delete by key, returning whether something was removed.
    async fn delete_by_key(&self, key: &EntityKey) -> Result<bool>;
}

/// In-process store.
pub struct MemoryStore<T: Entity> {
    entries: DashMap<EntityKey, T>,
}

impl<T: Entity> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: Entity> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl<T: Entity> EntityStore<T> for MemoryStore<T> {
    async fn find_all_by_watcher(&self, watcher_id: &str) -> Result<Vec<T>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.value().watcher_id() == watcher_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_by_key(&self, key: &EntityKey) -> Result<Option<T>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn create(&self, entity: T) -> Result<T> {
        use dashmap::mapref::entry::Entry;
        let key = entity.key();
        match self.entries.entry(key) {
            Entry::Occupied(occupied) => Err(WatchError::StoreError(format!(
                "{} {}/{} already exists",
                T::KIND,
                occupied.key().device_id,
                occupied.key().id
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(entity.clone());
                Ok(entity)
            }
        }
    }

    async fn update(&self, entity: T) -> Result<T> {
        let key = entity.key();
        match self.entries.get_mut(&key) {
            Some(mut slot) => {
                *slot = entity.clone();
                Ok(entity)
            }
            None => Err(WatchError::StoreError(format!(
                "{} {}/{} not found",
                T::KIND,
                key.device_id,
                key.id
            ))),
        }
    }

    async fn delete_by_key(&self, key: &EntityKey) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// The four entity stores a watcher writes to.
#[derive(Clone)]
pub struct Stores {
    pub containers: Arc<dyn EntityStore<TrackedContainer>>,
    pub images: Arc<dyn EntityStore<TrackedImage>>,
    pub networks: Arc<dyn EntityStore<TrackedNetwork>>,
    pub volumes: Arc<dyn EntityStore<TrackedVolume>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            containers: Arc::new(MemoryStore::<TrackedContainer>::new()),
            images: Arc::new(MemoryStore::<TrackedImage>::new()),
            networks: Arc::new(MemoryStore::<TrackedNetwork>::new()),
            volumes: Arc::new(MemoryStore::<TrackedVolume>::new()),
        }
    }
}

impl Default for Stores {
    fn default() -> Self {
        Self::in_memory()
    }
}

//! Reconciliation: list live state, diff it against the stores, apply.
//!
//! Within one cycle the engine listing always precedes per-item upserts,
//! and upserts always precede pruning. A failed container listing marks
//! the watcher's containers unreachable and skips pruning entirely.

use super::update::find_new_version;
use crate::engine::{ContainerSummary, Engine};
use crate::metrics::WatchMetrics;
use crate::reference::{ImageName, DEFAULT_TAG};
use crate::registry::ProviderRegistry;
use crate::store::{Entity, EntityKey, EntityStore, Stores};
use a3s_watch_core::config::WatcherConfig;
use a3s_watch_core::container::STATUS_UNREACHABLE;
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::event::events;
use a3s_watch_core::image::UNKNOWN_REGISTRY;
use a3s_watch_core::labels::{is_container_to_watch, is_digest_to_watch, WatchLabels, DEFAULT_ICON};
use a3s_watch_core::tag::{parse_semver, transform_tag};
use a3s_watch_core::{
    ContainerError, DigestRef, EventEmitter, ImageRef, RegistryRef, TagRef, TrackedContainer,
    TrackedImage, TrackedNetwork, TrackedVolume, WatchEvent,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Outcome of one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Containers that went through update detection
    pub watched: usize,
    /// Containers whose detection recorded an error
    pub errors: usize,
    /// Containers with an update available
    pub updates: usize,
    /// Resources whose listing failed
    pub failed_listings: Vec<String>,
}

/// Create/update/delete counts of a key-based sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Reconciliation state and collaborators of one watcher.
pub struct Reconciler {
    watcher_id: String,
    config: WatcherConfig,
    engine: Arc<dyn Engine>,
    stores: Stores,
    providers: ProviderRegistry,
    emitter: EventEmitter,
    metrics: WatchMetrics,
    permits: Arc<Semaphore>,
    cycle: Mutex<()>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        watcher_id: String,
        config: WatcherConfig,
        engine: Arc<dyn Engine>,
        stores: Stores,
        providers: ProviderRegistry,
        emitter: EventEmitter,
        metrics: WatchMetrics,
        concurrency: usize,
    ) -> Self {
        Self {
            watcher_id,
            config,
            engine,
            stores,
            providers,
            emitter,
            metrics,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            cycle: Mutex::new(()),
        }
    }

    pub fn watcher_id(&self) -> &str {
        &self.watcher_id
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_uuid
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn metrics(&self) -> &WatchMetrics {
        &self.metrics
    }

    pub(crate) fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }

    pub(crate) fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Run one full cycle. Cycles of the same watcher never overlap.
    pub async fn run_cycle(&self) -> CycleReport {
        let _cycle = self.cycle.lock().await;
        tracing::debug!(watcher = %self.watcher_id, "Reconciliation cycle started");

        let mut report = CycleReport::default();
        match self.reconcile_containers().await {
            Ok(containers) => {
                report.watched = containers.len();
                report.errors = containers.iter().filter(|c| c.error.is_some()).count();
                report.updates = containers.iter().filter(|c| c.update_available).count();
            }
            Err(e) => {
                tracing::warn!(watcher = %self.watcher_id, error = %e, "Container reconciliation aborted");
                report.failed_listings.push("containers".to_string());
            }
        }

        if let Err(e) = self.reconcile_networks().await {
            self.listing_failed(&mut report, "networks", &e);
        }
        if let Err(e) = self.reconcile_volumes().await {
            self.listing_failed(&mut report, "volumes", &e);
        }
        if let Err(e) = self.reconcile_images().await {
            self.listing_failed(&mut report, "images", &e);
        }

        self.emitter.emit(WatchEvent::with_fields(
            events::CONTAINERS_UPDATED,
            [
                ("watcher", serde_json::json!(self.watcher_id)),
                ("device", serde_json::json!(self.config.device_uuid)),
                ("count", serde_json::json!(report.watched)),
            ],
        ));
        self.metrics
            .cycle_completed(&self.watcher_id, report.watched, report.updates);

        tracing::info!(
            watcher = %self.watcher_id,
            watched = report.watched,
            errors = report.errors,
            updates = report.updates,
            failed = ?report.failed_listings,
            "Reconciliation cycle finished"
        );
        report
    }

    fn listing_failed(&self, report: &mut CycleReport, resource: &str, error: &WatchError) {
        tracing::warn!(watcher = %self.watcher_id, resource, error = %error, "Reconciliation skipped");
        report.failed_listings.push(resource.to_string());
    }

    /// List, detect updates, upsert, then prune containers.
    pub async fn reconcile_containers(&self) -> Result<Vec<TrackedContainer>> {
        let live = match self.engine.list_containers(self.config.watch_all).await {
            Ok(live) => live,
            Err(e) => {
                self.metrics.listing_failed(&self.watcher_id, "containers");
                self.mark_unreachable().await;
                return Err(WatchError::EngineListing {
                    resource: "containers".to_string(),
                    message: e.to_string(),
                });
            }
        };

        let to_watch: Vec<ContainerSummary> = live
            .into_iter()
            .filter(|c| {
                let labels = c.labels();
                is_container_to_watch(
                    labels.get(a3s_watch_core::labels::WATCH).map(String::as_str),
                    self.config.watch_by_default,
                )
            })
            .collect();
        let seen: HashSet<String> = to_watch.iter().map(|c| c.id.clone()).collect();
        tracing::debug!(watcher = %self.watcher_id, count = to_watch.len(), "Containers to watch");

        let checks = to_watch.into_iter().map(|summary| async move {
            let _permit = self.permits.acquire().await.ok()?;
            self.watch_container(summary).await
        });
        let watched: Vec<TrackedContainer> = futures::future::join_all(checks)
            .await
            .into_iter()
            .flatten()
            .collect();

        self.prune_containers(&seen).await?;
        Ok(watched)
    }

    /// Detect updates for one container and persist the outcome.
    async fn watch_container(&self, summary: ContainerSummary) -> Option<TrackedContainer> {
        let key = EntityKey::new(&self.config.device_uuid, &summary.id);
        let stored = match self.stores.containers.find_by_key(&key).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(watcher = %self.watcher_id, container = %summary.id, error = %e, "Store lookup failed");
                None
            }
        };

        let mut container = match stored.as_ref().filter(|c| c.error.is_none()) {
            Some(cached) => {
                let mut container = cached.clone();
                container.status = summary.state.clone();
                container.labels = summary.labels();
                apply_labels(&mut container);
                container
            }
            None => self.describe_container(&summary).await?,
        };

        // Normalization is idempotent, so repeating it each cycle keeps the
        // registry id current when providers change
        let (image, provider) = self.providers.normalize(&container.image);
        container.image = image;

        container.result = None;
        container.error = None;
        match find_new_version(&mut container, provider.as_deref(), self.engine.as_ref()).await {
            Ok(result) => container.result = Some(result),
            Err(e) if e.is_registry_failure() => {
                tracing::warn!(
                    watcher = %self.watcher_id,
                    container = %container.name,
                    image = %container.image.name,
                    error = %e,
                    "Update detection failed"
                );
                container.error = Some(ContainerError {
                    message: e.to_string(),
                });
            }
            Err(e) => {
                // The stored record stays as it was; the container is still
                // listed, so it is not pruned either
                tracing::warn!(
                    watcher = %self.watcher_id,
                    container = %container.name,
                    image = %container.image.name,
                    error = %e,
                    "Engine call failed during update detection; skipping container"
                );
                return None;
            }
        }
        container.refresh_derived();

        let outcome = match &stored {
            None => self.stores.containers.create(container.clone()).await.map(|_| ()),
            Some(previous) if container.has_changed(previous) => {
                self.stores.containers.update(container.clone()).await.map(|_| ())
            }
            Some(_) => Ok(()),
        };
        if let Err(e) = outcome {
            tracing::warn!(watcher = %self.watcher_id, container = %container.name, error = %e, "Failed to persist container");
        }
        Some(container)
    }

    /// Build a tracked container from engine image metadata.
    ///
    /// Returns `None` (with a warning) when the image cannot be described.
    async fn describe_container(&self, summary: &ContainerSummary) -> Option<TrackedContainer> {
        let image = match self.engine.inspect_image(&summary.image).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(watcher = %self.watcher_id, image = %summary.image, error = %e, "Image inspection failed; skipping container");
                return None;
            }
        };
        let remote_variants = match self.engine.distribution(&summary.image).await {
            Ok(distribution) => distribution.variants(),
            Err(e) => {
                tracing::debug!(image = %summary.image, error = %e, "No distribution metadata");
                Vec::new()
            }
        };
        let variant = image_variants(image.variant.as_deref(), remote_variants);

        let name_to_parse = if summary.image.contains("sha256:") {
            match image.repo_tags.as_ref().and_then(|tags| tags.first()) {
                Some(tag) => tag.clone(),
                None => {
                    tracing::warn!(
                        watcher = %self.watcher_id,
                        container = %summary.id,
                        image = %summary.image,
                        "Cannot get a reliable tag for this image; skipping container"
                    );
                    return None;
                }
            }
        } else {
            summary.image.clone()
        };

        let parsed = match ImageName::parse(&name_to_parse) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(image = %name_to_parse, error = %e, "Unparseable image name; skipping container");
                return None;
            }
        };
        let tag = parsed.tag.unwrap_or_else(|| DEFAULT_TAG.to_string());

        let labels = summary.labels();
        let watch_labels = WatchLabels::from_labels(&labels);
        let is_semver =
            parse_semver(&transform_tag(watch_labels.transform_tags.as_deref(), &tag)).is_some();
        let watch_digest = is_digest_to_watch(watch_labels.watch_digest.as_deref(), is_semver);
        if !is_semver && !watch_digest {
            tracing::warn!(
                image = %name_to_parse,
                "Image is not semver and digest watching is disabled; no update can be reported"
            );
        }

        let mut container = TrackedContainer {
            id: summary.id.clone(),
            name: summary.name(),
            device_id: self.config.device_uuid.clone(),
            watcher_id: self.watcher_id.clone(),
            status: summary.state.clone(),
            image: ImageRef {
                id: image.id.clone(),
                registry: RegistryRef {
                    name: UNKNOWN_REGISTRY.to_string(),
                    url: parsed.domain.unwrap_or_default(),
                },
                name: parsed.path,
                tag: TagRef {
                    value: tag,
                    semver: is_semver,
                },
                digest: DigestRef {
                    watch: watch_digest,
                    repo: image.repo_digest(),
                    value: None,
                },
                architecture: image.architecture.clone(),
                os: image.os.clone(),
                variant,
                created: image.created.clone(),
            },
            labels,
            ..Default::default()
        };
        if container.name.is_empty() {
            container.name = "unknown".to_string();
        }
        apply_labels(&mut container);
        Some(container)
    }

    async fn prune_containers(&self, seen: &HashSet<String>) -> Result<()> {
        let stored = self
            .stores
            .containers
            .find_all_by_watcher(&self.watcher_id)
            .await?;
        for container in stored.into_iter().filter(|c| !seen.contains(&c.id)) {
            tracing::debug!(watcher = %self.watcher_id, container = %container.name, "Pruning container");
            self.stores.containers.delete_by_key(&container.key()).await?;
        }
        Ok(())
    }

    /// Flag every persisted container of this watcher as unreachable.
    pub async fn mark_unreachable(&self) {
        let stored = match self
            .stores
            .containers
            .find_all_by_watcher(&self.watcher_id)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(watcher = %self.watcher_id, error = %e, "Cannot load containers to mark unreachable");
                return;
            }
        };
        for mut container in stored
            .into_iter()
            .filter(|c| c.status != STATUS_UNREACHABLE)
        {
            container.status = STATUS_UNREACHABLE.to_string();
            if let Err(e) = self.stores.containers.update(container).await {
                tracing::warn!(watcher = %self.watcher_id, error = %e, "Failed to mark container unreachable");
            }
        }
        tracing::warn!(watcher = %self.watcher_id, device = %self.config.device_uuid, "Containers marked unreachable");
    }

    pub async fn reconcile_networks(&self) -> Result<SyncCounts> {
        let live = self
            .engine
            .list_networks()
            .await
            .map_err(|e| self.listing_error("networks", e))?;
        let networks = live
            .into_iter()
            .map(|n| TrackedNetwork {
                id: n.id,
                name: n.name,
                driver: n.driver,
                scope: n.scope,
                device_id: self.config.device_uuid.clone(),
                watcher_id: self.watcher_id.clone(),
                labels: n.labels.unwrap_or_default(),
            })
            .collect();
        sync_entities(self.stores.networks.as_ref(), &self.watcher_id, networks).await
    }

    pub async fn reconcile_volumes(&self) -> Result<SyncCounts> {
        let live = self
            .engine
            .list_volumes()
            .await
            .map_err(|e| self.listing_error("volumes", e))?;
        let volumes = live
            .into_iter()
            .map(|v| TrackedVolume {
                name: v.name,
                driver: v.driver,
                mountpoint: v.mountpoint,
                scope: v.scope,
                device_id: self.config.device_uuid.clone(),
                watcher_id: self.watcher_id.clone(),
                labels: v.labels.unwrap_or_default(),
            })
            .collect();
        sync_entities(self.stores.volumes.as_ref(), &self.watcher_id, volumes).await
    }

    pub async fn reconcile_images(&self) -> Result<SyncCounts> {
        let live = self
            .engine
            .list_images()
            .await
            .map_err(|e| self.listing_error("images", e))?;
        let images = live
            .into_iter()
            .map(|i| TrackedImage {
                id: i.id,
                device_id: self.config.device_uuid.clone(),
                watcher_id: self.watcher_id.clone(),
                repo_tags: i.repo_tags.unwrap_or_default(),
                repo_digests: i.repo_digests.unwrap_or_default(),
                size: i.size,
                created: i.created,
                labels: i.labels.unwrap_or_default(),
            })
            .collect();
        sync_entities(self.stores.images.as_ref(), &self.watcher_id, images).await
    }

    fn listing_error(&self, resource: &str, error: WatchError) -> WatchError {
        self.metrics.listing_failed(&self.watcher_id, resource);
        WatchError::EngineListing {
            resource: resource.to_string(),
            message: error.to_string(),
        }
    }
}

/// Copy label-driven settings onto a container.
fn apply_labels(container: &mut TrackedContainer) {
    let labels = WatchLabels::from_labels(&container.labels);
    container.include_tags = labels.include_tags;
    container.exclude_tags = labels.exclude_tags;
    container.transform_tags = labels.transform_tags;
    container.link_template = labels.link_template;
    container.display_name = labels.display_name.unwrap_or_else(|| container.name.clone());
    container.display_icon = labels
        .display_icon
        .unwrap_or_else(|| DEFAULT_ICON.to_string());
}

/// Platform variants in preference order: the local image's own variant,
/// then the ones the registry publishes.
fn image_variants(local: Option<&str>, remote: Vec<String>) -> Vec<String> {
    let mut variants: Vec<String> = local
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .into_iter()
        .collect();
    for variant in remote {
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }
    variants
}

/// Insert new, update changed and delete vanished entities of a watcher.
pub async fn sync_entities<T>(
    store: &dyn EntityStore<T>,
    watcher_id: &str,
    live: Vec<T>,
) -> Result<SyncCounts>
where
    T: Entity + PartialEq,
{
    let mut existing: HashMap<EntityKey, T> = store
        .find_all_by_watcher(watcher_id)
        .await?
        .into_iter()
        .map(|entity| (entity.key(), entity))
        .collect();

    let mut counts = SyncCounts::default();
    for entity in live {
        match existing.remove(&entity.key()) {
            Some(previous) if previous == entity => {}
            Some(_) => {
                store.update(entity).await?;
                counts.updated += 1;
            }
            None => {
                // The key may belong to another watcher of the same device
                if store.find_by_key(&entity.key()).await?.is_some() {
                    store.update(entity).await?;
                    counts.updated += 1;
                } else {
                    store.create(entity).await?;
                    counts.created += 1;
                }
            }
        }
    }

    for key in existing.into_keys() {
        store.delete_by_key(&key).await?;
        counts.deleted += 1;
    }

    if counts != SyncCounts::default() {
        tracing::debug!(
            watcher = watcher_id,
            kind = T::KIND,
            created = counts.created,
            updated = counts.updated,
            deleted = counts.deleted,
            "Entities synced"
        );
    }
    Ok(counts)
}

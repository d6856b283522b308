//! Shared test fixtures: an in-process engine and a directory pointing at it.

#![allow(dead_code)]

use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::{DeviceConfig, WatcherConfig};
use a3s_watch_runtime::engine::{
    ByteStream, ContainerInspect, ContainerState, ContainerStats, ContainerSummary,
    CreateContainerOptions, DistributionInspect, DistributionPlatform, EngineEvent, EngineInfo, EventStream,
    ImageConfig, ImageInspect, ImageSummary, NetworkSummary, VolumeSummary,
};
use a3s_watch_runtime::{
    Device, DeviceAuth, Engine, EngineFactory, StaticDeviceDirectory, WatchContext, WatchMetrics,
    WatchSettings,
};
use a3s_watch_runtime::{ProviderRegistry, Stores};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEVICE: &str = "device-1";

#[derive(Default)]
struct FakeState {
    containers: Vec<ContainerSummary>,
    images: HashMap<String, ImageInspect>,
    distributions: HashMap<String, DistributionInspect>,
    statuses: HashMap<String, String>,
    networks: Vec<NetworkSummary>,
    volumes: Vec<VolumeSummary>,
    fail_listing: bool,
    fail_image_by_id: bool,
    events: Vec<std::result::Result<EngineEvent, String>>,
    archive: Vec<std::result::Result<Vec<u8>, String>>,
    calls: Vec<String>,
}

/// Engine whose answers are set by the test
#[derive(Default, Clone)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, id: &str, name: &str, image: &str) {
        self.add_container_with_labels(id, name, image, HashMap::new());
    }

    pub fn add_container_with_labels(
        &self,
        id: &str,
        name: &str,
        image: &str,
        labels: HashMap<String, String>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.containers.push(ContainerSummary {
            id: id.to_string(),
            names: vec![format!("/{}", name)],
            image: image.to_string(),
            image_id: format!("sha256:{}", id),
            state: "running".to_string(),
            status: "Up 2 hours".to_string(),
            labels: Some(labels),
        });
        state.statuses.insert(id.to_string(), "running".to_string());
        state
            .images
            .entry(image.to_string())
            .or_insert_with(|| ImageInspect {
                id: format!("sha256:image-{}", id),
                repo_tags: Some(vec![image.to_string()]),
                architecture: "amd64".to_string(),
                os: "linux".to_string(),
                ..Default::default()
            });
    }

    pub fn remove_container(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .containers
            .retain(|c| c.id != id);
    }

    pub fn set_status(&self, id: &str, status: &str) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(id.to_string(), status.to_string());
    }

    /// Record `digest` as the repo digest of `image`.
    pub fn set_repo_digest(&self, image: &str, digest: &str) {
        self.update_image(image, |inspect| {
            inspect.repo_digests = Some(vec![format!("{}@{}", image, digest)]);
        });
    }

    /// Set the config image digest legacy manifests are compared against.
    pub fn set_config_image(&self, image: &str, config_image: &str) {
        self.update_image(image, |inspect| {
            inspect.config = Some(ImageConfig {
                image: Some(config_image.to_string()),
                ..Default::default()
            });
        });
    }

    pub fn set_platform(&self, image: &str, architecture: &str, variant: Option<&str>) {
        self.update_image(image, |inspect| {
            inspect.architecture = architecture.to_string();
            inspect.variant = variant.map(str::to_string);
        });
    }

    /// Platforms the registry publishes for `image`, as `/distribution`
    /// reports them.
    pub fn set_distribution(&self, image: &str, architecture: &str, variants: &[&str]) {
        let platforms = variants
            .iter()
            .map(|variant| DistributionPlatform {
                architecture: architecture.to_string(),
                os: "linux".to_string(),
                variant: Some(variant.to_string()),
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .distributions
            .insert(image.to_string(), DistributionInspect { platforms });
    }

    /// Make image inspection by id fail while lookups by name still work.
    pub fn set_fail_image_by_id(&self, fail: bool) {
        self.state.lock().unwrap().fail_image_by_id = fail;
    }

    /// Events served once by the next subscription, which then stays open;
    /// an `Err` is delivered as an undecodable event.
    pub fn set_events(&self, events: Vec<std::result::Result<EngineEvent, String>>) {
        self.state.lock().unwrap().events = events;
    }

    fn update_image(&self, image: &str, apply: impl FnOnce(&mut ImageInspect)) {
        let mut state = self.state.lock().unwrap();
        let inspect = state.images.get_mut(image).unwrap();
        apply(inspect);
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    pub fn add_volume(&self, name: &str) {
        self.state.lock().unwrap().volumes.push(VolumeSummary {
            name: name.to_string(),
            driver: "local".to_string(),
            ..Default::default()
        });
    }

    /// Chunks served by `container_archive`; an `Err` breaks the stream.
    pub fn set_archive(&self, chunks: Vec<std::result::Result<Vec<u8>, String>>) {
        self.state.lock().unwrap().archive = chunks;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(call)).count()
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().unwrap().calls.push(call.into());
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn info(&self) -> Result<EngineInfo> {
        Ok(EngineInfo {
            name: "fake".to_string(),
            server_version: "24.0.0".to_string(),
            ..Default::default()
        })
    }

    async fn list_containers(&self, _all: bool) -> Result<Vec<ContainerSummary>> {
        self.record("list_containers");
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(WatchError::EngineError("connection refused".to_string()));
        }
        Ok(state.containers.clone())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect> {
        self.record(format!("inspect_container {}", id));
        let state = self.state.lock().unwrap();
        let status = state
            .statuses
            .get(id)
            .cloned()
            .ok_or_else(|| WatchError::EngineError(format!("no such container: {}", id)))?;
        Ok(ContainerInspect {
            id: id.to_string(),
            name: format!("/{}", id),
            state: ContainerState {
                running: status == "running",
                status,
            },
        })
    }

    async fn inspect_image(&self, name: &str) -> Result<ImageInspect> {
        self.record(format!("inspect_image {}", name));
        let state = self.state.lock().unwrap();
        if let Some(image) = state.images.get(name) {
            return Ok(image.clone());
        }
        state
            .images
            .values()
            .find(|image| image.id == name && !state.fail_image_by_id)
            .cloned()
            .ok_or_else(|| WatchError::EngineError(format!("no such image: {}", name)))
    }

    async fn distribution(&self, name: &str) -> Result<DistributionInspect> {
        self.state
            .lock()
            .unwrap()
            .distributions
            .get(name)
            .cloned()
            .ok_or_else(|| WatchError::EngineError(format!("no distribution for {}", name)))
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        Ok(Vec::new())
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>> {
        Ok(self.state.lock().unwrap().networks.clone())
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeSummary>> {
        Ok(self.state.lock().unwrap().volumes.clone())
    }

    async fn events(&self, _actions: &[&str]) -> Result<EventStream> {
        self.record("events");
        let events: Vec<Result<EngineEvent>> = std::mem::take(&mut self.state.lock().unwrap().events)
            .into_iter()
            .map(|event| event.map_err(WatchError::SerializationError))
            .collect();
        Ok(Box::pin(
            futures::stream::iter(events).chain(futures::stream::pending()),
        ))
    }

    async fn container_stats(&self, id: &str) -> Result<ContainerStats> {
        self.record(format!("container_stats {}", id));
        Ok(ContainerStats::default())
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<()> {
        self.record(format!("pull_image {}:{}", image, tag));
        Ok(())
    }

    async fn create_container(&self, options: &CreateContainerOptions) -> Result<String> {
        self.record(format!(
            "create_container {} {}",
            options.image,
            options.host_config.binds.join(",")
        ));
        Ok("helper-1".to_string())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.record(format!("start_container {}", id));
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        self.record(format!("wait_container {}", id));
        Ok(0)
    }

    async fn container_archive(&self, id: &str, path: &str) -> Result<ByteStream> {
        self.record(format!("container_archive {} {}", id, path));
        let chunks: Vec<Result<Bytes>> = self
            .state
            .lock()
            .unwrap()
            .archive
            .iter()
            .map(|chunk| match chunk {
                Ok(bytes) => Ok(Bytes::from(bytes.clone())),
                Err(message) => Err(WatchError::EngineError(message.clone())),
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()> {
        self.record(format!("stop_container {} {}", id, timeout_secs));
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.record(format!("remove_container {}", id));
        Ok(())
    }
}

/// Factory handing out the same fake engine for every device
pub struct FakeEngineFactory {
    pub engine: FakeEngine,
}

#[async_trait]
impl EngineFactory for FakeEngineFactory {
    async fn connect(&self, _device: &Device, _auth: &DeviceAuth) -> Result<Arc<dyn Engine>> {
        Ok(Arc::new(self.engine.clone()))
    }
}

pub fn device_config(uuid: &str) -> DeviceConfig {
    DeviceConfig {
        uuid: uuid.to_string(),
        ip: "127.0.0.1".to_string(),
        hostname: None,
        engine_url: None,
        username: None,
        password: None,
    }
}

/// Watcher configuration with every background trigger effectively idle.
pub fn quiet_watcher(name: &str) -> WatcherConfig {
    WatcherConfig {
        name: name.to_string(),
        device_uuid: DEVICE.to_string(),
        cron: "0 0 1 1 *".to_string(),
        watch_stats: false,
        watch_events: false,
        ..Default::default()
    }
}

pub fn context(engine: &FakeEngine, providers: ProviderRegistry) -> WatchContext {
    let directory = StaticDeviceDirectory::from_config(&[device_config(DEVICE)]).unwrap();
    WatchContext {
        directory: Arc::new(directory),
        engines: Arc::new(FakeEngineFactory {
            engine: engine.clone(),
        }),
        stores: Stores::in_memory(),
        providers,
        emitter: Default::default(),
        metrics: WatchMetrics::new().unwrap(),
        settings: WatchSettings {
            concurrency: 4,
            debounce: Duration::from_millis(100),
            warmup: Duration::from_secs(3600),
        },
    }
}

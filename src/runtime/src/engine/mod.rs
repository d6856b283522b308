//! Container engine access.
//!
//! [`Engine`] is the subset of the Docker Engine API the watcher needs.
//! [`HttpEngine`] talks to a daemon over HTTP; tests substitute their own
//! implementation.

pub mod http;
pub mod types;

pub use http::{HttpEngine, HttpEngineFactory};
pub use types::*;

use crate::directory::{Device, DeviceAuth};
use a3s_watch_core::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Stream of raw bytes (image pulls, archives)
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Stream of engine events
pub type EventStream = BoxStream<'static, Result<EngineEvent>>;

/// Docker-compatible engine API
#[async_trait]
pub trait Engine: Send + Sync {
    /// Daemon information; used as a connectivity check.
    async fn info(&self) -> Result<EngineInfo>;

    /// List containers; all states when `all`, running ones otherwise.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect>;

    async fn inspect_image(&self, name: &str) -> Result<ImageInspect>;

    /// Registry-side platform information for an image.
    async fn distribution(&self, name: &str) -> Result<DistributionInspect>;

    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>>;

    async fn list_volumes(&self) -> Result<Vec<VolumeSummary>>;

    /// Subscribe to container events with the given actions.
    async fn events(&self, actions: &[&str]) -> Result<EventStream>;

    /// One stats sample for a container.
    async fn container_stats(&self, id: &str) -> Result<ContainerStats>;

    /// Pull an image and wait for the pull to finish.
    async fn pull_image(&self, image: &str, tag: &str) -> Result<()>;

    /// Create a container, returning its id.
    async fn create_container(&self, options: &CreateContainerOptions) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Block until the container exits, returning its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64>;

    /// Tar archive of a path inside a container.
    async fn container_archive(&self, id: &str, path: &str) -> Result<ByteStream>;

    /// Stop a container, killing it after `timeout_secs`.
    async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()>;

    async fn remove_container(&self, id: &str) -> Result<()>;
}

/// Opens engine connections for devices.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn connect(&self, device: &Device, auth: &DeviceAuth) -> Result<Arc<dyn Engine>>;
}

//! A3S Watch Runtime - registry clients and device watchers.
//!
//! This crate provides the Docker Registry V2 client with its provider
//! variants, the engine client, the device watchers that reconcile
//! containers, images, networks and volumes, and the component lifecycle
//! manager that owns them.

#![allow(clippy::result_large_err)]

pub mod backup;
pub mod directory;
pub mod engine;
pub mod lifecycle;
pub mod metrics;
pub mod reference;
pub mod registry;
pub mod store;
pub mod watcher;

// Re-export common types
pub use backup::VolumeBackup;
pub use directory::{Device, DeviceAuth, DeviceDirectory, StaticDeviceDirectory};
pub use engine::{Engine, EngineFactory, HttpEngine, HttpEngineFactory};
pub use lifecycle::{ComponentKind, ComponentManager, ComponentRecord};
pub use metrics::WatchMetrics;
pub use reference::ImageName;
pub use registry::{ManifestDigest, ProviderKind, ProviderRegistry, RegistryProvider};
pub use store::{EntityKey, EntityStore, MemoryStore, Stores};
pub use watcher::{CycleReport, DeviceWatcher, WatchContext, WatchSettings, WatcherState};

/// A3S Watch Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

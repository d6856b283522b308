//! A3S Watch Core - Foundational Types
//!
//! Error taxonomy, configuration, the event bus, the tracked entity model
//! and tag comparison shared by the watch runtime and CLI.

pub mod config;
pub mod container;
pub mod error;
pub mod event;
pub mod image;
pub mod labels;
pub mod network;
pub mod schedule;
pub mod tag;
pub mod volume;

// Re-export commonly used types
pub use config::{DeviceConfig, LogLevel, RegistryEntry, WatchConfig, WatcherConfig};
pub use container::{ContainerError, TrackedContainer, UpdateKind, UpdateResult, UpdateType};
pub use error::{Result, WatchError};
pub use event::{EventEmitter, EventPayload, WatchEvent};
pub use image::{DigestRef, ImageRef, RegistryRef, TagRef, TrackedImage};
pub use network::TrackedNetwork;
pub use volume::TrackedVolume;

/// A3S Watch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Tracked volumes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Volume present on a device, keyed by volume name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedVolume {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    pub scope: String,
    pub device_id: String,
    pub watcher_id: String,
    pub labels: HashMap<String, String>,
}

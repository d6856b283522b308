//! Tracked networks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Network present on a device, keyed by engine network id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedNetwork {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub device_id: String,
    pub watcher_id: String,
    pub labels: HashMap<String, String>,
}

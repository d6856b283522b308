use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Empty,
    String(String),
    Map(HashMap<String, serde_json::Value>),
}

/// Notification published on the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    /// Event key (e.g., "containers.updated")
    pub key: String,

    /// Event payload
    pub payload: EventPayload,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl WatchEvent {
    /// Create a new event
    pub fn new(key: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            key: key.into(),
            payload,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Create an event with no payload
    pub fn empty(key: impl Into<String>) -> Self {
        Self::new(key, EventPayload::Empty)
    }

    /// Create an event with a map payload built from key/value pairs
    pub fn with_fields<I, K>(key: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        let map = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::new(key, EventPayload::Map(map))
    }

    /// Look up a field of a map payload
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        match &self.payload {
            EventPayload::Map(map) => map.get(name),
            _ => None,
        }
    }
}

/// Fire-and-forget event bus
#[derive(Clone)]
pub struct EventEmitter {
    sender: Arc<broadcast::Sender<WatchEvent>>,
}

impl EventEmitter {
    /// Create a new event emitter
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Emit an event; having no subscriber is not an error
    pub fn emit(&self, event: WatchEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to events with a filter
    pub fn subscribe_filtered(
        &self,
        filter: impl Fn(&WatchEvent) -> bool + Send + Sync + 'static,
    ) -> EventStream {
        EventStream {
            receiver: self.sender.subscribe(),
            filter: Arc::new(filter),
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Event stream with filtering
pub struct EventStream {
    receiver: broadcast::Receiver<WatchEvent>,
    filter: Arc<dyn Fn(&WatchEvent) -> bool + Send + Sync>,
}

impl EventStream {
    /// Receive the next matching event. Lagged receivers skip ahead.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if (self.filter)(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Event catalog - predefined event keys
pub mod events {
    // Reconciliation
    pub const CONTAINERS_UPDATED: &str = "containers.updated";
    pub const CONTAINER_STATUS_CHANGED: &str = "container.status.changed";

    // Volume backup
    pub const VOLUME_BACKUP_SUCCESS: &str = "volume.backup.success";
    pub const VOLUME_BACKUP_ERROR: &str = "volume.backup.error";

    // Component lifecycle
    pub const WATCHER_REGISTERED: &str = "watcher.registered";
    pub const WATCHER_DEREGISTERED: &str = "watcher.deregistered";
    pub const REGISTRY_REGISTERED: &str = "registry.registered";
    pub const REGISTRY_DEREGISTERED: &str = "registry.deregistered";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_with_fields() {
        let event = WatchEvent::with_fields(
            events::VOLUME_BACKUP_SUCCESS,
            [("volume", json!("data")), ("device", json!("d-1"))],
        );
        assert_eq!(event.key, "volume.backup.success");
        assert_eq!(event.field("volume"), Some(&json!("data")));
        assert_eq!(event.field("missing"), None);
    }

    #[test]
    fn test_empty_event_has_no_fields() {
        let event = WatchEvent::empty(events::CONTAINERS_UPDATED);
        assert_eq!(event.payload, EventPayload::Empty);
        assert!(event.field("anything").is_none());
    }

    #[tokio::test]
    async fn test_emit_and_subscribe() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();
        emitter.emit(WatchEvent::empty(events::CONTAINERS_UPDATED));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, events::CONTAINERS_UPDATED);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let emitter = EventEmitter::new(4);
        emitter.emit(WatchEvent::empty(events::WATCHER_REGISTERED));
    }

    #[tokio::test]
    async fn test_filtered_stream() {
        let emitter = EventEmitter::new(16);
        let mut stream = emitter.subscribe_filtered(|e| e.key.starts_with("volume."));
        emitter.emit(WatchEvent::empty(events::CONTAINERS_UPDATED));
        emitter.emit(WatchEvent::empty(events::VOLUME_BACKUP_ERROR));
        let event = stream.recv().await.unwrap();
        assert_eq!(event.key, events::VOLUME_BACKUP_ERROR);
    }
}

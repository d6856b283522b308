//! Live engine events.

use super::reconcile::Reconciler;
use super::scheduler::{stopped, DebounceTrigger};
use crate::engine::EngineEvent;
use crate::store::EntityKey;
use a3s_watch_core::error::WatchError;
use a3s_watch_core::event::events;
use a3s_watch_core::WatchEvent;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Container event actions the listener subscribes to
pub const EVENT_ACTIONS: &[&str] = &[
    "create", "destroy", "start", "stop", "pause", "unpause", "die", "update",
];

/// Wait before resubscribing after the event stream ends or fails
pub const RESUBSCRIBE_BACKOFF: Duration = Duration::from_secs(5);

/// What an event asks the watcher to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// Container set changed: run a (debounced) full cycle
    Reconcile,
    /// Only this container's status may have changed
    RefreshStatus(String),
    Ignore,
}

pub fn classify(event: &EngineEvent) -> EventAction {
    if !event.kind.is_empty() && event.kind != "container" {
        return EventAction::Ignore;
    }
    match event.base_action() {
        "create" | "destroy" => EventAction::Reconcile,
        _ if event.actor.id.is_empty() => EventAction::Ignore,
        _ => EventAction::RefreshStatus(event.actor.id.clone()),
    }
}

/// Follow the engine event stream until shutdown, resubscribing after
/// failures.
pub(crate) async fn listen(
    reconciler: Arc<Reconciler>,
    trigger: DebounceTrigger,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let watcher = reconciler.watcher_id().to_string();
    loop {
        match reconciler.engine().events(EVENT_ACTIONS).await {
            Ok(mut stream) => {
                tracing::debug!(watcher = %watcher, "Listening to engine events");
                loop {
                    tokio::select! {
                        _ = stopped(&mut shutdown_rx) => return,
                        next = stream.next() => match next {
                            Some(Ok(event)) => handle_event(&reconciler, &trigger, &event).await,
                            Some(Err(WatchError::SerializationError(e))) => {
                                tracing::warn!(watcher = %watcher, error = %e, "Skipping undecodable engine event");
                            }
                            Some(Err(e)) => {
                                tracing::warn!(watcher = %watcher, error = %e, "Engine event stream failed");
                                break;
                            }
                            None => {
                                tracing::debug!(watcher = %watcher, "Engine event stream ended");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(watcher = %watcher, error = %e, "Cannot subscribe to engine events");
            }
        }

        tokio::select! {
            _ = stopped(&mut shutdown_rx) => return,
            _ = tokio::time::sleep(RESUBSCRIBE_BACKOFF) => {}
        }
    }
}

async fn handle_event(reconciler: &Reconciler, trigger: &DebounceTrigger, event: &EngineEvent) {
    match classify(event) {
        EventAction::Reconcile => {
            tracing::debug!(watcher = %reconciler.watcher_id(), action = %event.action, "Container set changed");
            trigger.fire();
        }
        EventAction::RefreshStatus(id) => refresh_status(reconciler, &id).await,
        EventAction::Ignore => {}
    }
}

/// Patch one persisted container's status from the engine, without a full
/// cycle. Unknown containers are left to the next cycle.
pub async fn refresh_status(reconciler: &Reconciler, container_id: &str) {
    let key = EntityKey::new(reconciler.device_id(), container_id);
    let store = &reconciler.stores().containers;
    let mut container = match store.find_by_key(&key).await {
        Ok(Some(container)) => container,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(container = %container_id, error = %e, "Store lookup failed");
            return;
        }
    };

    let status = match reconciler.engine().inspect_container(container_id).await {
        Ok(inspect) => inspect.state.status,
        Err(e) => {
            tracing::debug!(container = %container_id, error = %e, "Cannot inspect container");
            return;
        }
    };
    if status == container.status {
        return;
    }

    let previous = std::mem::replace(&mut container.status, status.clone());
    tracing::info!(
        watcher = %reconciler.watcher_id(),
        container = %container.name,
        from = %previous,
        to = %status,
        "Container status changed"
    );
    let name = container.name.clone();
    if let Err(e) = store.update(container).await {
        tracing::warn!(container = %container_id, error = %e, "Failed to update container status");
        return;
    }
    reconciler.emitter().emit(WatchEvent::with_fields(
        events::CONTAINER_STATUS_CHANGED,
        [
            ("watcher", serde_json::json!(reconciler.watcher_id())),
            ("id", serde_json::json!(container_id)),
            ("name", serde_json::json!(name)),
            ("status", serde_json::json!(status)),
        ],
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EventActor;

    fn event(kind: &str, action: &str, id: &str) -> EngineEvent {
        EngineEvent {
            kind: kind.to_string(),
            action: action.to_string(),
            actor: EventActor {
                id: id.to_string(),
                ..Default::default()
            },
            time: 0,
        }
    }

    #[test]
    fn test_classify_create_destroy() {
        assert_eq!(classify(&event("container", "create", "a")), EventAction::Reconcile);
        assert_eq!(classify(&event("container", "destroy", "a")), EventAction::Reconcile);
    }

    #[test]
    fn test_classify_status_events() {
        for action in ["start", "stop", "die", "pause", "unpause", "update"] {
            assert_eq!(
                classify(&event("container", action, "abc")),
                EventAction::RefreshStatus("abc".to_string())
            );
        }
    }

    #[test]
    fn test_classify_ignores_other_types() {
        assert_eq!(classify(&event("network", "create", "n")), EventAction::Ignore);
        assert_eq!(classify(&event("container", "start", "")), EventAction::Ignore);
    }

    #[test]
    fn test_event_actions() {
        assert_eq!(EVENT_ACTIONS.len(), 8);
        assert!(EVENT_ACTIONS.contains(&"unpause"));
    }
}

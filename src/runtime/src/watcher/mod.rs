//! Device watchers.
//!
//! A [`DeviceWatcher`] monitors one device: it opens the engine connection,
//! then runs reconciliation on a schedule, on debounced engine events and
//! once after a warm-up delay.
//!
//! ```text
//! Unregistered -> Initializing -> Active -> Deregistering -> Stopped
//! ```

pub mod events;
pub mod reconcile;
pub mod scheduler;
pub mod stats;
pub mod update;

pub use reconcile::{CycleReport, Reconciler, SyncCounts};
pub use scheduler::{DebounceTrigger, SchedulePlan, WatchScheduler};

use crate::directory::DeviceDirectory;
use crate::engine::EngineFactory;
use crate::metrics::WatchMetrics;
use crate::registry::ProviderRegistry;
use crate::store::Stores;
use a3s_watch_core::config::{WatchConfig, WatcherConfig};
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::schedule::parse_cron;
use a3s_watch_core::EventEmitter;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Watcher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Unregistered,
    Initializing,
    Active,
    Deregistering,
    Stopped,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatcherState::Unregistered => "unregistered",
            WatcherState::Initializing => "initializing",
            WatcherState::Active => "active",
            WatcherState::Deregistering => "deregistering",
            WatcherState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

/// Process-wide timing and fan-out settings for watchers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    pub concurrency: usize,
    pub debounce: Duration,
    pub warmup: Duration,
}

impl WatchSettings {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            debounce: Duration::from_millis(config.debounce_ms),
            warmup: Duration::from_millis(config.warmup_ms),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self::from_config(&WatchConfig::default())
    }
}

/// Collaborators shared by every watcher
#[derive(Clone)]
pub struct WatchContext {
    pub directory: Arc<dyn DeviceDirectory>,
    pub engines: Arc<dyn EngineFactory>,
    pub stores: Stores,
    pub providers: ProviderRegistry,
    pub emitter: EventEmitter,
    pub metrics: WatchMetrics,
    pub settings: WatchSettings,
}

/// Watcher bound to one device
pub struct DeviceWatcher {
    id: String,
    config: WatcherConfig,
    plan: SchedulePlan,
    ctx: WatchContext,
    state: RwLock<WatcherState>,
    reconciler: RwLock<Option<Arc<Reconciler>>>,
    scheduler: Mutex<Option<WatchScheduler>>,
}

impl fmt::Debug for DeviceWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceWatcher")
            .field("id", &self.id)
            .field("device", &self.config.device_uuid)
            .field("state", &self.state())
            .finish()
    }
}

impl DeviceWatcher {
    /// Component id of a watcher (`watcher.docker.<name>`).
    pub fn component_id(name: &str) -> String {
        format!("watcher.docker.{}", name)
    }

    /// Validate the configuration and compute the schedule. The watcher
    /// starts `Unregistered`; nothing runs until [`init`](Self::init).
    pub fn new(config: WatcherConfig, ctx: &WatchContext) -> Result<Self> {
        let id = Self::component_id(&config.name);
        config.validate(&id)?;
        let cron = parse_cron(&config.cron).map_err(|e| invalid_cron(&id, "cron", e))?;
        let stats = if config.watch_stats {
            Some(parse_cron(&config.stats_cron).map_err(|e| invalid_cron(&id, "stats_cron", e))?)
        } else {
            None
        };
        let plan = SchedulePlan {
            cron,
            stats,
            watch_events: config.watch_events,
            warmup: ctx.settings.warmup,
            debounce: ctx.settings.debounce,
        };
        Ok(Self {
            id,
            config,
            plan,
            ctx: ctx.clone(),
            state: RwLock::new(WatcherState::Unregistered),
            reconciler: RwLock::new(None),
            scheduler: Mutex::new(None),
        })
    }

    /// Connect to the device and start the scheduler.
    ///
    /// Fails with `DeviceUnreachable` when the device or its credentials are
    /// unknown or the engine does not answer; the watcher then returns to
    /// `Unregistered` and may be initialized again.
    pub async fn init(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state != WatcherState::Unregistered {
                return Err(WatchError::Other(format!(
                    "Watcher {} cannot be initialized while {}",
                    self.id, *state
                )));
            }
            *state = WatcherState::Initializing;
        }

        tracing::info!(watcher = %self.id, device = %self.config.device_uuid, "Initializing watcher");
        let engine = match connect(&self.config.device_uuid, &self.ctx).await {
            Ok(engine) => engine,
            Err(e) => {
                *self.state.write() = WatcherState::Unregistered;
                return Err(e);
            }
        };

        let reconciler = Arc::new(Reconciler::new(
            self.id.clone(),
            self.config.clone(),
            engine,
            self.ctx.stores.clone(),
            self.ctx.providers.clone(),
            self.ctx.emitter.clone(),
            self.ctx.metrics.clone(),
            self.ctx.settings.concurrency,
        ));
        let scheduler = WatchScheduler::start(reconciler.clone(), self.plan.clone());
        *self.reconciler.write() = Some(reconciler);
        *self.scheduler.lock() = Some(scheduler);
        *self.state.write() = WatcherState::Active;

        tracing::info!(
            watcher = %self.id,
            cron = %self.config.cron,
            stats = self.config.watch_stats,
            events = self.config.watch_events,
            "Watcher active"
        );
        Ok(())
    }

    /// Validate, connect and start a watcher in one step.
    pub async fn register(config: WatcherConfig, ctx: &WatchContext) -> Result<Self> {
        let watcher = Self::new(config, ctx)?;
        watcher.init().await?;
        Ok(watcher)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn state(&self) -> WatcherState {
        *self.state.read()
    }

    /// Reconciler of an initialized watcher.
    pub fn reconciler(&self) -> Option<Arc<Reconciler>> {
        self.reconciler.read().clone()
    }

    /// Run a cycle now, outside the schedule. A watcher that was never
    /// initialized reports an empty cycle.
    pub async fn watch(&self) -> CycleReport {
        match self.reconciler() {
            Some(reconciler) => reconciler.run_cycle().await,
            None => {
                tracing::warn!(watcher = %self.id, "Watcher is not initialized; nothing to watch");
                CycleReport::default()
            }
        }
    }

    /// Request a debounced cycle, as a container create/destroy event does.
    pub fn request_cycle(&self) {
        if let Some(scheduler) = self.scheduler.lock().as_ref() {
            scheduler.trigger().fire();
        }
    }

    /// Cancel every timer, pending debounce and event subscription, then
    /// release the connection. Idempotent.
    pub async fn deregister(&self) {
        let scheduler = {
            let mut state = self.state.write();
            if *state != WatcherState::Active {
                return;
            }
            *state = WatcherState::Deregistering;
            self.scheduler.lock().take()
        };
        tracing::info!(watcher = %self.id, "Deregistering watcher");
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
        self.reconciler.write().take();
        self.ctx.metrics.forget_watcher(&self.id);
        *self.state.write() = WatcherState::Stopped;
        tracing::info!(watcher = %self.id, "Watcher stopped");
    }
}

fn invalid_cron(component: &str, field: &str, error: cron::error::Error) -> WatchError {
    WatchError::invalid_field(component, format!("{} ({})", field, error))
}

async fn connect(device_uuid: &str, ctx: &WatchContext) -> Result<Arc<dyn crate::engine::Engine>> {
    let unreachable = |message: String| WatchError::DeviceUnreachable {
        device: device_uuid.to_string(),
        message,
    };

    let device = ctx
        .directory
        .find_device_by_uuid(device_uuid)
        .await?
        .ok_or_else(|| unreachable("device not found".to_string()))?;
    let auth = ctx
        .directory
        .find_auth_by_device_uuid(device_uuid)
        .await?
        .ok_or_else(|| unreachable("no credentials for device".to_string()))?;

    let engine = ctx
        .engines
        .connect(&device, &auth)
        .await
        .map_err(|e| unreachable(e.to_string()))?;
    let info = engine
        .info()
        .await
        .map_err(|e| unreachable(e.to_string()))?;
    tracing::debug!(
        device = %device_uuid,
        engine = %info.name,
        version = %info.server_version,
        "Engine reachable"
    );
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id() {
        assert_eq!(DeviceWatcher::component_id("edge"), "watcher.docker.edge");
    }

    #[test]
    fn test_settings_from_config() {
        let config = WatchConfig {
            concurrency: 0,
            debounce_ms: 250,
            ..Default::default()
        };
        let settings = WatchSettings::from_config(&config);
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.debounce, Duration::from_millis(250));
        assert_eq!(settings.warmup, Duration::from_millis(1000));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(WatcherState::Deregistering.to_string(), "deregistering");
    }
}

//! Watch metrics.
//!
//! Collected in-process into a Prometheus registry; exporting them is left
//! to whoever embeds the runtime.

use a3s_watch_core::error::{Result, WatchError};
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

/// Counters and gauges updated by watchers
#[derive(Clone)]
pub struct WatchMetrics {
    registry: Registry,
    cycles: IntCounterVec,
    cycle_failures: IntCounterVec,
    containers: IntGaugeVec,
    updates_available: IntGaugeVec,
    cpu_percent: GaugeVec,
    memory_bytes: GaugeVec,
}

fn metric_error(e: prometheus::Error) -> WatchError {
    WatchError::Other(format!("metrics: {}", e))
}

impl WatchMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let cycles = IntCounterVec::new(
            Opts::new("a3s_watch_cycles_total", "Reconciliation cycles run"),
            &["watcher"],
        )
        .map_err(metric_error)?;
        let cycle_failures = IntCounterVec::new(
            Opts::new(
                "a3s_watch_cycle_failures_total",
                "Entity listings that failed during a cycle",
            ),
            &["watcher", "resource"],
        )
        .map_err(metric_error)?;
        let containers = IntGaugeVec::new(
            Opts::new("a3s_watch_containers", "Containers watched in the last cycle"),
            &["watcher"],
        )
        .map_err(metric_error)?;
        let updates_available = IntGaugeVec::new(
            Opts::new(
                "a3s_watch_updates_available",
                "Watched containers with an update available",
            ),
            &["watcher"],
        )
        .map_err(metric_error)?;
        let cpu_percent = GaugeVec::new(
            Opts::new("a3s_watch_container_cpu_percent", "Container CPU usage"),
            &["watcher", "container"],
        )
        .map_err(metric_error)?;
        let memory_bytes = GaugeVec::new(
            Opts::new("a3s_watch_container_memory_bytes", "Container memory usage"),
            &["watcher", "container"],
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(cycles.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(cycle_failures.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(containers.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(updates_available.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(cpu_percent.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(memory_bytes.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            registry,
            cycles,
            cycle_failures,
            containers,
            updates_available,
            cpu_percent,
            memory_bytes,
        })
    }

    pub fn cycle_completed(&self, watcher: &str, watched: usize, updates: usize) {
        self.cycles.with_label_values(&[watcher]).inc();
        self.containers
            .with_label_values(&[watcher])
            .set(watched as i64);
        self.updates_available
            .with_label_values(&[watcher])
            .set(updates as i64);
    }

    pub fn listing_failed(&self, watcher: &str, resource: &str) {
        self.cycle_failures
            .with_label_values(&[watcher, resource])
            .inc();
    }

    pub fn record_stats(&self, watcher: &str, container: &str, cpu_percent: f64, memory: u64) {
        self.cpu_percent
            .with_label_values(&[watcher, container])
            .set(cpu_percent);
        self.memory_bytes
            .with_label_values(&[watcher, container])
            .set(memory as f64);
    }

    /// Drop every series labelled with a watcher.
    pub fn forget_watcher(&self, watcher: &str) {
        let _ = self.cycles.remove_label_values(&[watcher]);
        let _ = self.containers.remove_label_values(&[watcher]);
        let _ = self.updates_available.remove_label_values(&[watcher]);
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| WatchError::Other(e.to_string()))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

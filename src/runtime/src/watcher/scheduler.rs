//! Per-watcher scheduler.
//!
//! One scheduler owns every background task of a watcher: the primary cron
//! loop, the warm-up cycle, the stats loop, the debouncer and the event
//! listener. [`WatchScheduler::shutdown`] signals all of them, waits for
//! them to exit and aborts any that do not, so no cycle starts afterwards.

use super::events;
use super::reconcile::Reconciler;
use super::stats::collect_stats;
use a3s_watch_core::schedule::delay_until_next;
use cron::Schedule;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Grace period for tasks to observe shutdown before being aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What a scheduler runs and when
#[derive(Debug, Clone)]
pub struct SchedulePlan {
    pub cron: Schedule,
    /// Stats schedule; `None` disables stats collection
    pub stats: Option<Schedule>,
    pub watch_events: bool,
    pub warmup: Duration,
    pub debounce: Duration,
}

/// Resolves once `shutdown_rx` carries `true` or its sender is gone.
pub(crate) async fn stopped(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Requests a debounced reconciliation cycle.
#[derive(Debug, Clone)]
pub struct DebounceTrigger {
    tx: mpsc::Sender<()>,
}

impl DebounceTrigger {
    /// Request a cycle. A full queue already guarantees one.
    pub fn fire(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Background tasks of one watcher
pub struct WatchScheduler {
    shutdown_tx: watch::Sender<bool>,
    trigger: DebounceTrigger,
    handles: Vec<JoinHandle<()>>,
}

impl WatchScheduler {
    /// Spawn every task the plan asks for.
    pub fn start(reconciler: Arc<Reconciler>, plan: SchedulePlan) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(16);
        let trigger = DebounceTrigger { tx };
        let mut handles = Vec::new();

        handles.push(tokio::spawn(warmup_cycle(
            reconciler.clone(),
            plan.warmup,
            shutdown_rx.clone(),
        )));
        handles.push(tokio::spawn(cron_loop(
            reconciler.clone(),
            plan.cron.clone(),
            shutdown_rx.clone(),
        )));
        handles.push(tokio::spawn(debounce_loop(
            reconciler.clone(),
            rx,
            plan.debounce,
            shutdown_rx.clone(),
        )));
        if let Some(stats) = plan.stats.clone() {
            handles.push(tokio::spawn(stats_loop(
                reconciler.clone(),
                stats,
                shutdown_rx.clone(),
            )));
        }
        if plan.watch_events {
            handles.push(tokio::spawn(events::listen(
                reconciler.clone(),
                trigger.clone(),
                shutdown_rx,
            )));
        }

        tracing::debug!(
            watcher = %reconciler.watcher_id(),
            tasks = handles.len(),
            "Scheduler started"
        );
        Self {
            shutdown_tx,
            trigger,
            handles,
        }
    }

    /// Handle for requesting debounced cycles.
    pub fn trigger(&self) -> DebounceTrigger {
        self.trigger.clone()
    }

    /// Stop every task. Returns once all of them have exited.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                abort.abort();
            }
        }
    }
}

/// Run a cycle unless shutdown is signalled first; an in-flight cycle is
/// dropped on shutdown.
async fn guarded_cycle(reconciler: &Reconciler, shutdown_rx: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = stopped(shutdown_rx) => {}
        _ = reconciler.run_cycle() => {}
    }
}

async fn warmup_cycle(
    reconciler: Arc<Reconciler>,
    warmup: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = stopped(&mut shutdown_rx) => return,
        _ = tokio::time::sleep(warmup) => {}
    }
    guarded_cycle(&reconciler, &mut shutdown_rx).await;
}

async fn cron_loop(
    reconciler: Arc<Reconciler>,
    schedule: Schedule,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let Some(delay) = delay_until_next(&schedule, chrono::Utc::now()) else {
            tracing::warn!(watcher = %reconciler.watcher_id(), "Cron schedule has no upcoming run");
            return;
        };
        tokio::select! {
            _ = stopped(&mut shutdown_rx) => return,
            _ = tokio::time::sleep(delay) => {}
        }
        guarded_cycle(&reconciler, &mut shutdown_rx).await;
    }
}

async fn stats_loop(
    reconciler: Arc<Reconciler>,
    schedule: Schedule,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let Some(delay) = delay_until_next(&schedule, chrono::Utc::now()) else {
            return;
        };
        tokio::select! {
            _ = stopped(&mut shutdown_rx) => return,
            _ = tokio::time::sleep(delay) => {}
        }
        tokio::select! {
            _ = stopped(&mut shutdown_rx) => return,
            result = collect_stats(&reconciler) => {
                if let Err(e) = result {
                    tracing::warn!(watcher = %reconciler.watcher_id(), error = %e, "Stats collection failed");
                }
            }
        }
    }
}

/// Trailing-edge debounce: a cycle runs once no trigger arrived for a full
/// quiet window.
async fn debounce_loop(
    reconciler: Arc<Reconciler>,
    mut rx: mpsc::Receiver<()>,
    window: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stopped(&mut shutdown_rx) => return,
            received = rx.recv() => if received.is_none() { return },
        }

        loop {
            tokio::select! {
                _ = stopped(&mut shutdown_rx) => return,
                _ = tokio::time::sleep(window) => break,
                received = rx.recv() => if received.is_none() { return },
            }
        }

        tracing::info!(watcher = %reconciler.watcher_id(), "Running debounced cycle");
        guarded_cycle(&reconciler, &mut shutdown_rx).await;
    }
}

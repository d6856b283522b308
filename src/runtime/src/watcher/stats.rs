//! Container stats collection.

use super::reconcile::Reconciler;
use a3s_watch_core::error::Result;

/// Sample stats of every running container of the watcher into the
/// metrics gauges. Returns how many containers were sampled.
pub async fn collect_stats(reconciler: &Reconciler) -> Result<usize> {
    let watcher = reconciler.watcher_id();
    let containers = reconciler
        .stores()
        .containers
        .find_all_by_watcher(watcher)
        .await?;

    let samples = containers
        .iter()
        .filter(|c| c.status == "running")
        .map(|container| async move {
            let _permit = reconciler.permits().acquire().await.ok()?;
            match reconciler.engine().container_stats(&container.id).await {
                Ok(stats) => {
                    reconciler.metrics().record_stats(
                        watcher,
                        &container.name,
                        stats.cpu_percent(),
                        stats.memory_bytes(),
                    );
                    Some(())
                }
                Err(e) => {
                    tracing::debug!(watcher = %watcher, container = %container.name, error = %e, "Stats unavailable");
                    None
                }
            }
        });
    let sampled = futures::future::join_all(samples)
        .await
        .into_iter()
        .flatten()
        .count();
    tracing::debug!(watcher = %watcher, sampled, "Container stats collected");
    Ok(sampled)
}

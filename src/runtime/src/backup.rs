//! Volume backup through a disposable helper container.
//!
//! The helper mounts the volume read-only, tars it to `/backup.tar` and
//! exits; the archive is then streamed out to the destination. The helper
//! is stopped and removed whatever happens after it was created.

use crate::engine::{CreateContainerOptions, Engine, HostConfig};
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::event::events;
use a3s_watch_core::labels;
use a3s_watch_core::{EventEmitter, WatchEvent};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

pub const HELPER_IMAGE: &str = "alpine";
pub const HELPER_TAG: &str = "latest";
const ARCHIVE_PATH: &str = "/backup.tar";
const MOUNT_PATH: &str = "/backup";

/// Backs up volumes of one device
pub struct VolumeBackup {
    engine: Arc<dyn Engine>,
    emitter: EventEmitter,
    emit_events: bool,
}

impl VolumeBackup {
    pub fn new(engine: Arc<dyn Engine>, emitter: EventEmitter) -> Self {
        Self {
            engine,
            emitter,
            emit_events: true,
        }
    }

    /// Disable `volume.backup.*` notifications.
    pub fn without_events(mut self) -> Self {
        self.emit_events = false;
        self
    }

    /// Default archive name for a volume.
    pub fn default_file_name(volume: &str) -> String {
        format!("{}-{}.tar", volume, chrono::Utc::now().format("%Y%m%d%H%M%S"))
    }

    /// Back up `volume` to `dir/file_name`, creating `dir` if needed.
    pub async fn backup(&self, volume: &str, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let path = dir.join(file_name);
        let result = self.backup_file(volume, dir, &path).await;
        self.notify(volume, &result);
        let written = result?;
        tracing::info!(volume, path = %path.display(), bytes = written, "Volume backup saved");
        Ok(path)
    }

    /// Back up `volume` into an arbitrary writer, returning the bytes written.
    pub async fn backup_to<W>(&self, volume: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let result = self.stream_backup(volume, writer).await;
        self.notify(volume, &result);
        result
    }

    async fn backup_file(&self, volume: &str, dir: &Path, path: &Path) -> Result<u64> {
        tokio::fs::create_dir_all(dir).await?;
        let mut file = tokio::fs::File::create(path).await?;
        self.stream_backup(volume, &mut file).await
    }

    async fn stream_backup<W>(&self, volume: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        tracing::info!(volume, "Volume backup started");
        self.engine.pull_image(HELPER_IMAGE, HELPER_TAG).await?;

        let options = CreateContainerOptions {
            image: format!("{}:{}", HELPER_IMAGE, HELPER_TAG),
            cmd: vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("tar -cvf {} {}", ARCHIVE_PATH, MOUNT_PATH),
            ],
            host_config: HostConfig {
                binds: vec![format!("{}:{}:ro", volume, MOUNT_PATH)],
            },
            labels: HashMap::from([(labels::WATCH.to_string(), "false".to_string())]),
        };
        let helper = self.engine.create_container(&options).await?;
        tracing::debug!(volume, helper = %helper, "Helper container created");

        let outcome = self.archive(&helper, writer).await;
        let cleanup = self.cleanup(&helper).await;
        match (outcome, cleanup) {
            (Ok(written), Ok(())) => Ok(written),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), cleanup) => {
                if let Err(cleanup_error) = cleanup {
                    tracing::warn!(helper = %helper, error = %cleanup_error, "Helper cleanup failed");
                }
                Err(e)
            }
        }
    }

    async fn archive<W>(&self, helper: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.engine.start_container(helper).await?;
        let exit_code = self.engine.wait_container(helper).await?;
        if exit_code != 0 {
            tracing::warn!(helper, exit_code, "Helper container exited with an error");
        }

        let mut stream = self.engine.container_archive(helper, ARCHIVE_PATH).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }

    async fn cleanup(&self, helper: &str) -> Result<()> {
        if let Err(e) = self.engine.stop_container(helper, 0).await {
            tracing::warn!(helper, error = %e, "Helper container already stopped");
        }
        self.engine.remove_container(helper).await
    }

    fn notify(&self, volume: &str, result: &Result<u64>) {
        if !self.emit_events {
            return;
        }
        let event = match result {
            Ok(_) => WatchEvent::with_fields(
                events::VOLUME_BACKUP_SUCCESS,
                [
                    ("success", serde_json::json!(true)),
                    ("volume", serde_json::json!(volume)),
                    ("message", serde_json::json!("Backup success")),
                ],
            ),
            Err(e) => {
                tracing::error!(volume, error = %e, "Volume backup failed");
                WatchEvent::with_fields(
                    events::VOLUME_BACKUP_ERROR,
                    [
                        ("success", serde_json::json!(false)),
                        ("volume", serde_json::json!(volume)),
                        ("message", serde_json::json!(error_message(e))),
                    ],
                )
            }
        };
        self.emitter.emit(event);
    }
}

fn error_message(error: &WatchError) -> String {
    format!("Backup error: {}", error)
}

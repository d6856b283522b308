//! Volume backup through the helper container.

mod common;

use a3s_watch_core::event::events;
use a3s_watch_core::EventEmitter;
use a3s_watch_runtime::VolumeBackup;
use common::FakeEngine;
use serde_json::json;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

#[tokio::test]
async fn test_backup_writes_archive_and_removes_helper() {
    let engine = FakeEngine::new();
    engine.set_archive(vec![Ok(b"tar-part-1".to_vec()), Ok(b"tar-part-2".to_vec())]);
    let emitter = EventEmitter::default();
    let mut rx = emitter.subscribe();
    let backup = VolumeBackup::new(Arc::new(engine.clone()), emitter);

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested");
    let path = backup
        .backup("app_data", &target, "app_data.tar")
        .await
        .unwrap();

    assert_eq!(path, target.join("app_data.tar"));
    let contents = std::fs::read(&path).unwrap();
    assert_eq!(contents, b"tar-part-1tar-part-2");

    let calls = engine.calls();
    assert_eq!(
        calls,
        vec![
            "pull_image alpine:latest",
            "create_container alpine:latest app_data:/backup:ro",
            "start_container helper-1",
            "wait_container helper-1",
            "container_archive helper-1 /backup.tar",
            "stop_container helper-1 0",
            "remove_container helper-1",
        ]
    );

    let event = rx.try_recv().unwrap();
    assert_eq!(event.key, events::VOLUME_BACKUP_SUCCESS);
    assert_eq!(event.field("volume"), Some(&json!("app_data")));
    assert_eq!(event.field("success"), Some(&json!(true)));
}

#[tokio::test]
async fn test_broken_archive_stream_still_cleans_up() {
    let engine = FakeEngine::new();
    engine.set_archive(vec![
        Ok(b"partial".to_vec()),
        Err("connection reset".to_string()),
    ]);
    let emitter = EventEmitter::default();
    let mut rx = emitter.subscribe();
    let backup = VolumeBackup::new(Arc::new(engine.clone()), emitter);

    let mut sink = Vec::new();
    let err = backup.backup_to("app_data", &mut sink).await.unwrap_err();
    assert!(err.to_string().contains("connection reset"));
    assert_eq!(engine.count("stop_container helper-1"), 1);
    assert_eq!(engine.count("remove_container helper-1"), 1);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.key, events::VOLUME_BACKUP_ERROR);
    assert_eq!(event.field("success"), Some(&json!(false)));
    let message = event.field("message").and_then(|m| m.as_str()).unwrap();
    assert!(message.starts_with("Backup error:"));
}

/// Writer that rejects every write
struct FailingWriter;

impl AsyncWrite for FailingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_write_failure_still_cleans_up() {
    let engine = FakeEngine::new();
    engine.set_archive(vec![Ok(b"data".to_vec())]);
    let backup = VolumeBackup::new(Arc::new(engine.clone()), EventEmitter::default())
        .without_events();

    let mut writer = FailingWriter;
    assert!(backup.backup_to("app_data", &mut writer).await.is_err());
    assert_eq!(engine.count("remove_container helper-1"), 1);
}

#[test]
fn test_default_file_name() {
    let name = VolumeBackup::default_file_name("app_data");
    assert!(name.starts_with("app_data-"));
    assert!(name.ends_with(".tar"));
    // app_data- + YYYYmmddHHMMSS + .tar
    assert_eq!(name.len(), "app_data-".len() + 14 + ".tar".len());
}

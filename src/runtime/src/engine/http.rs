//! Docker Engine API over HTTP.

use super::types::*;
use super::{ByteStream, Engine, EngineFactory, EventStream};
use crate::directory::{Device, DeviceAuth};
use a3s_watch_core::error::{Result, WatchError};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Default engine port for plain-HTTP daemons
pub const DEFAULT_ENGINE_PORT: u16 = 2375;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine client for a daemon reachable at `base_url`.
///
/// Streaming endpoints (events, pulls, archives) run without a request
/// timeout; everything else is bounded.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    base_url: String,
    credentials: Option<(String, String)>,
    http: reqwest::Client,
}

impl HttpEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
            http: reqwest::Client::new(),
        }
    }

    /// Authenticate every request with Basic credentials.
    pub fn with_basic_auth(mut self, username: String, password: String) -> Self {
        self.credentials = Some((username, password));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| WatchError::EngineError(format!("{}: {}", what, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(WatchError::EngineError(format!(
            "{}: {} {}",
            what,
            status,
            body.trim()
        )))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let builder = self.request(Method::GET, path).timeout(REQUEST_TIMEOUT);
        let response = self.send(builder, path).await?;
        response
            .json()
            .await
            .map_err(|e| WatchError::EngineError(format!("{}: invalid response: {}", path, e)))
    }
}

#[async_trait]
impl Engine for HttpEngine {
    async fn info(&self) -> Result<EngineInfo> {
        self.get_json("/info").await
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        self.get_json(&format!("/containers/json?all={}", all)).await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect> {
        self.get_json(&format!("/containers/{}/json", id)).await
    }

    async fn inspect_image(&self, name: &str) -> Result<ImageInspect> {
        self.get_json(&format!("/images/{}/json", name)).await
    }

    async fn distribution(&self, name: &str) -> Result<DistributionInspect> {
        self.get_json(&format!("/distribution/{}/json", name)).await
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        self.get_json("/images/json").await
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>> {
        self.get_json("/networks").await
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeSummary>> {
        let list: VolumeList = self.get_json("/volumes").await?;
        Ok(list.volumes.unwrap_or_default())
    }

    async fn events(&self, actions: &[&str]) -> Result<EventStream> {
        let filters = serde_json::json!({
            "type": ["container"],
            "event": actions,
        });
        let builder = self
            .request(Method::GET, "/events")
            .query(&[("filters", filters.to_string())]);
        let response = self.send(builder, "/events").await?;
        Ok(ndjson(response.bytes_stream()))
    }

    async fn container_stats(&self, id: &str) -> Result<ContainerStats> {
        self.get_json(&format!("/containers/{}/stats?stream=false", id))
            .await
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<()> {
        let builder = self
            .request(Method::POST, "/images/create")
            .query(&[("fromImage", image), ("tag", tag)]);
        let response = self.send(builder, "/images/create").await?;
        let body = response
            .text()
            .await
            .map_err(|e| WatchError::EngineError(format!("pull {}:{}: {}", image, tag, e)))?;
        // Progress is streamed as JSON lines; failures arrive as an `error` line
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
                if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
                    return Err(WatchError::EngineError(format!(
                        "pull {}:{}: {}",
                        image, tag, error
                    )));
                }
            }
        }
        tracing::debug!(image, tag, "Image pulled");
        Ok(())
    }

    async fn create_container(&self, options: &CreateContainerOptions) -> Result<String> {
        let builder = self
            .request(Method::POST, "/containers/create")
            .timeout(REQUEST_TIMEOUT)
            .json(options);
        let response = self.send(builder, "/containers/create").await?;
        let created: CreateContainerResponse = response
            .json()
            .await
            .map_err(|e| WatchError::EngineError(format!("/containers/create: {}", e)))?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let path = format!("/containers/{}/start", id);
        let builder = self.request(Method::POST, &path).timeout(REQUEST_TIMEOUT);
        self.send(builder, &path).await.map(|_| ())
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let path = format!("/containers/{}/wait", id);
        let response = self.send(self.request(Method::POST, &path), &path).await?;
        let waited: WaitResponse = response
            .json()
            .await
            .map_err(|e| WatchError::EngineError(format!("{}: {}", path, e)))?;
        Ok(waited.status_code)
    }

    async fn container_archive(&self, id: &str, path: &str) -> Result<ByteStream> {
        let endpoint = format!("/containers/{}/archive", id);
        let builder = self
            .request(Method::GET, &endpoint)
            .query(&[("path", path)]);
        let response = self.send(builder, &endpoint).await?;
        Ok(response
            .bytes_stream()
            .map_err(|e| WatchError::EngineError(format!("archive stream: {}", e)))
            .boxed())
    }

    async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<()> {
        let path = format!("/containers/{}/stop?t={}", id, timeout_secs);
        let response = self
            .request(Method::POST, &path)
            .timeout(REQUEST_TIMEOUT + Duration::from_secs(u64::from(timeout_secs)))
            .send()
            .await
            .map_err(|e| WatchError::EngineError(format!("{}: {}", path, e)))?;
        // 304: already stopped
        match response.status() {
            s if s.is_success() || s == StatusCode::NOT_MODIFIED => Ok(()),
            s => Err(WatchError::EngineError(format!("{}: {}", path, s))),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let path = format!("/containers/{}?force=true", id);
        let builder = self.request(Method::DELETE, &path).timeout(REQUEST_TIMEOUT);
        self.send(builder, &path).await.map(|_| ())
    }
}

/// Decode a newline-delimited JSON byte stream into events.
///
/// Lines that are not events are logged and skipped; only transport errors
/// are yielded as `Err`.
fn ndjson<S>(bytes: S) -> EventStream
where
    S: futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
{
    futures::stream::unfold(
        (Box::pin(bytes), Vec::<u8>::new()),
        |(mut bytes, mut buffer)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if line.iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }
                    match serde_json::from_slice::<EngineEvent>(&line) {
                        Ok(event) => return Some((Ok(event), (bytes, buffer))),
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                line = %String::from_utf8_lossy(&line).trim_end(),
                                "Skipping undecodable engine event"
                            );
                            continue;
                        }
                    }
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        let error = WatchError::EngineError(format!("event stream: {}", e));
                        return Some((Err(error), (bytes, buffer)));
                    }
                    None => return None,
                }
            }
        },
    )
    .boxed()
}

/// Builds [`HttpEngine`]s from device records.
#[derive(Debug, Clone, Default)]
pub struct HttpEngineFactory;

impl HttpEngineFactory {
    /// Engine URL for a device: the explicit one, or `http://<ip>:2375`.
    pub fn engine_url(device: &Device, auth: &DeviceAuth) -> String {
        auth.engine_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", device.ip, DEFAULT_ENGINE_PORT))
    }
}

#[async_trait]
impl EngineFactory for HttpEngineFactory {
    async fn connect(&self, device: &Device, auth: &DeviceAuth) -> Result<Arc<dyn Engine>> {
        let url = Self::engine_url(device, auth);
        tracing::debug!(device = %device.uuid, url = %url, "Opening engine connection");
        let mut engine = HttpEngine::new(url);
        if let (Some(user), Some(password)) = (&auth.username, &auth.password) {
            engine = engine.with_basic_auth(user.clone(), password.clone());
        }
        Ok(Arc::new(engine))
    }
}

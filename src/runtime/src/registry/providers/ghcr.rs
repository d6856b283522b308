//! GitHub Container Registry and LinuxServer Container Registry.
//!
//! Both accept a bearer built from a static personal access token.

use super::{https_v2, mask_opt, parse_config, AuthPull};
use crate::registry::client::RegistryRequest;
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::image::ImageRef;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

pub const GHCR_HOST: &str = "ghcr.io";
pub const LSCR_HOST: &str = "lscr.io";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GhcrConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Ghcr {
    host: &'static str,
    config: GhcrConfig,
}

impl Ghcr {
    pub fn from_config(host: &'static str, component: &str, value: &serde_json::Value) -> Result<Self> {
        let config: GhcrConfig = parse_config(component, value)?;
        if config.username.is_some() && config.token.is_none() {
            return Err(WatchError::invalid_field(component, "token"));
        }
        Ok(Self { host, config })
    }

    pub fn matches(&self, image: &ImageRef) -> bool {
        image.registry_host() == self.host
    }

    pub fn normalize(&self, image: &mut ImageRef) {
        image.registry.url = https_v2(self.host);
    }

    pub fn authenticate(&self, request: RegistryRequest) -> Result<RegistryRequest> {
        let secret = self.config.token.as_deref().unwrap_or(":");
        request.authorization("Bearer", &B64.encode(secret))
    }

    pub fn auth_pull(&self) -> Option<AuthPull> {
        match (&self.config.username, &self.config.token) {
            (Some(username), Some(token)) => Some(AuthPull {
                username: username.clone(),
                password: token.clone(),
            }),
            _ => None,
        }
    }

    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "username": self.config.username,
            "token": mask_opt(&self.config.token),
        })
    }
}

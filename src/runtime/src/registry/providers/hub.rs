//! Docker Hub.

use super::{basic_credentials, decode_basic, fetch_token, mask_opt, parse_config, AuthPull};
use crate::registry::client::RegistryRequest;
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::image::ImageRef;
use serde::{Deserialize, Serialize};

const REGISTRY_URL: &str = "https://registry-1.docker.io/v2";
const AUTH_URL: &str = "https://auth.docker.io/token";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Base64 `login:password`
    #[serde(default)]
    pub auth: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Hub {
    config: HubConfig,
}

impl Hub {
    pub fn from_config(component: &str, value: &serde_json::Value) -> Result<Self> {
        let config: HubConfig = parse_config(component, value)?;
        if config.login.is_some() && config.password.is_none() && config.token.is_none() {
            return Err(WatchError::invalid_field(component, "password"));
        }
        Ok(Self { config })
    }

    /// Images without a registry domain belong to Docker Hub.
    pub fn matches(&self, image: &ImageRef) -> bool {
        let host = image.registry_host();
        host.is_empty() || host.ends_with("docker.io")
    }

    pub fn normalize(&self, image: &mut ImageRef) {
        image.registry.url = REGISTRY_URL.to_string();
        if !image.name.contains('/') {
            image.name = format!("library/{}", image.name);
        }
    }

    /// Token endpoint for a repository.
    pub fn token_url(name: &str) -> String {
        format!(
            "{}?service=registry.docker.io&scope=repository:{}:pull&grant_type=password",
            AUTH_URL, name
        )
    }

    fn credentials(&self) -> Option<String> {
        if let Some(auth) = &self.config.auth {
            return Some(auth.clone());
        }
        let login = self.config.login.as_ref()?;
        let secret = self.config.password.as_ref().or(self.config.token.as_ref())?;
        Some(basic_credentials(login, secret))
    }

    pub async fn authenticate(
        &self,
        http: &reqwest::Client,
        image: &ImageRef,
        request: RegistryRequest,
    ) -> Result<RegistryRequest> {
        let credentials = self.credentials();
        let token = fetch_token(http, &Self::token_url(&image.name), credentials.as_deref()).await?;
        request.authorization("Bearer", &token)
    }

    pub fn auth_pull(&self) -> Option<AuthPull> {
        if let (Some(login), Some(secret)) = (
            &self.config.login,
            self.config.password.as_ref().or(self.config.token.as_ref()),
        ) {
            return Some(AuthPull {
                username: login.clone(),
                password: secret.clone(),
            });
        }
        self.config.auth.as_deref().and_then(decode_basic)
    }

    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "login": self.config.login,
            "password": mask_opt(&self.config.password),
            "token": mask_opt(&self.config.token),
            "auth": mask_opt(&self.config.auth),
        })
    }
}

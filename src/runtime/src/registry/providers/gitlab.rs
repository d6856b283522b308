//! GitLab container registry.

use super::{
    basic_credentials, fetch_token, mask, missing_fields, parse_config, validation_result,
    with_scheme, AuthPull,
};
use crate::registry::client::RegistryRequest;
use a3s_watch_core::error::Result;
use a3s_watch_core::image::ImageRef;
use serde::{Deserialize, Serialize};

pub const DEFAULT_URL: &str = "https://registry.gitlab.com";
pub const DEFAULT_AUTH_URL: &str = "https://gitlab.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitlabConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub authurl: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Gitlab {
    url: String,
    auth_url: String,
    token: String,
}

impl Gitlab {
    pub fn from_config(component: &str, value: &serde_json::Value) -> Result<Self> {
        let config: GitlabConfig = parse_config(component, value)?;
        validation_result(component, missing_fields(&[("token", config.token.as_ref())]))?;
        Ok(Self {
            url: with_scheme(config.url.as_deref().unwrap_or(DEFAULT_URL)),
            auth_url: with_scheme(config.authurl.as_deref().unwrap_or(DEFAULT_AUTH_URL)),
            token: config.token.unwrap_or_default(),
        })
    }

    pub fn matches(&self, image: &ImageRef) -> bool {
        let host = image.registry_host();
        !host.is_empty() && self.url.contains(host)
    }

    pub fn normalize(&self, image: &mut ImageRef) {
        image.registry.url = format!("{}/v2", self.url);
    }

    pub fn token_url(&self, name: &str) -> String {
        format!(
            "{}/jwt/auth?service=container_registry&scope=repository:{}:pull",
            self.auth_url, name
        )
    }

    pub async fn authenticate(
        &self,
        http: &reqwest::Client,
        image: &ImageRef,
        request: RegistryRequest,
    ) -> Result<RegistryRequest> {
        let credentials = basic_credentials("", &self.token);
        let token = fetch_token(http, &self.token_url(&image.name), Some(&credentials)).await?;
        request.authorization("Bearer", &token)
    }

    pub fn auth_pull(&self) -> Option<AuthPull> {
        Some(AuthPull {
            username: String::new(),
            password: self.token.clone(),
        })
    }

    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "url": self.url,
            "authurl": self.auth_url,
            "token": mask(&self.token),
        })
    }
}

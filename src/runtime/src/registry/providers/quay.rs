//! Quay.io.
//!
//! Robot account credentials are exchanged for a bearer token; tag pages
//! are chained through the `next_page` token of the `Link` header.

use super::{basic_credentials, fetch_token, https_v2, mask_opt, parse_config, AuthPull};
use crate::registry::client::RegistryRequest;
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::image::ImageRef;
use serde::{Deserialize, Serialize};

const HOST: &str = "quay.io";
const TOKEN_URL: &str = "https://quay.io/v2/auth";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuayConfig {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Quay {
    config: QuayConfig,
}

impl Quay {
    pub fn from_config(component: &str, value: &serde_json::Value) -> Result<Self> {
        let config: QuayConfig = parse_config(component, value)?;
        let set = [&config.namespace, &config.account, &config.token];
        let present = set.iter().filter(|v| v.is_some()).count();
        if present != 0 && present != set.len() {
            let missing = ["namespace", "account", "token"]
                .iter()
                .zip(set.iter())
                .filter(|(_, v)| v.is_none())
                .map(|(name, _)| name.to_string())
                .collect();
            return Err(WatchError::ConfigValidation {
                component: component.to_string(),
                fields: missing,
            });
        }
        Ok(Self { config })
    }

    pub fn matches(&self, image: &ImageRef) -> bool {
        image.registry_host().ends_with(HOST)
    }

    pub fn normalize(&self, image: &mut ImageRef) {
        let host = image.registry_host().to_string();
        image.registry.url = https_v2(&host);
    }

    /// Robot account login (`namespace+account`).
    fn login(&self) -> Option<(String, &str)> {
        let namespace = self.config.namespace.as_ref()?;
        let account = self.config.account.as_ref()?;
        let token = self.config.token.as_deref()?;
        Some((format!("{}+{}", namespace, account), token))
    }

    pub fn token_url(name: &str) -> String {
        format!(
            "{}?service=quay.io&scope=repository:{}:pull",
            TOKEN_URL, name
        )
    }

    /// Anonymous access is left untouched.
    pub async fn authenticate(
        &self,
        http: &reqwest::Client,
        image: &ImageRef,
        request: RegistryRequest,
    ) -> Result<RegistryRequest> {
        let Some((login, token)) = self.login() else {
            return Ok(request);
        };
        let credentials = basic_credentials(&login, token);
        let bearer = fetch_token(http, &Self::token_url(&image.name), Some(&credentials)).await?;
        request.authorization("Bearer", &bearer)
    }

    pub fn auth_pull(&self) -> Option<AuthPull> {
        self.login().map(|(username, token)| AuthPull {
            username,
            password: token.to_string(),
        })
    }

    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "namespace": self.config.namespace,
            "account": self.config.account,
            "token": mask_opt(&self.config.token),
        })
    }
}

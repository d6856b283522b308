//! Google Container Registry.

use super::{basic_credentials, fetch_token, https_v2, mask_opt, parse_config, AuthPull};
use crate::registry::client::RegistryRequest;
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::image::ImageRef;
use serde::{Deserialize, Serialize};

const TOKEN_URL: &str = "https://gcr.io/v2/token";
const JSON_KEY_USER: &str = "_json_key";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GcrConfig {
    #[serde(default)]
    pub clientemail: Option<String>,
    #[serde(default)]
    pub privatekey: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Gcr {
    config: GcrConfig,
}

impl Gcr {
    pub fn from_config(component: &str, value: &serde_json::Value) -> Result<Self> {
        let config: GcrConfig = parse_config(component, value)?;
        if config.clientemail.is_some() != config.privatekey.is_some() {
            let missing = if config.clientemail.is_some() {
                "privatekey"
            } else {
                "clientemail"
            };
            return Err(WatchError::invalid_field(component, missing));
        }
        Ok(Self { config })
    }

    pub fn matches(&self, image: &ImageRef) -> bool {
        image.registry_host().ends_with("gcr.io")
    }

    pub fn normalize(&self, image: &mut ImageRef) {
        let host = image.registry_host().to_string();
        image.registry.url = https_v2(&host);
    }

    /// Service account key in the form accepted as a `_json_key` password.
    fn json_key(&self) -> Option<String> {
        let email = self.config.clientemail.as_ref()?;
        let key = self.config.privatekey.as_ref()?;
        Some(
            serde_json::json!({
                "client_email": email,
                "private_key": key,
            })
            .to_string(),
        )
    }

    pub fn token_url(name: &str) -> String {
        format!("{}?scope=repository:{}:pull", TOKEN_URL, name)
    }

    /// Anonymous access is left untouched.
    pub async fn authenticate(
        &self,
        http: &reqwest::Client,
        image: &ImageRef,
        request: RegistryRequest,
    ) -> Result<RegistryRequest> {
        let Some(json_key) = self.json_key() else {
            return Ok(request);
        };
        let credentials = basic_credentials(JSON_KEY_USER, &json_key);
        let token = fetch_token(http, &Self::token_url(&image.name), Some(&credentials)).await?;
        request.authorization("Bearer", &token)
    }

    pub fn auth_pull(&self) -> Option<AuthPull> {
        self.json_key().map(|password| AuthPull {
            username: JSON_KEY_USER.to_string(),
            password,
        })
    }

    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "clientemail": self.config.clientemail,
            "privatekey": mask_opt(&self.config.privatekey),
        })
    }
}

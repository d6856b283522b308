//! Amazon Elastic Container Registry.
//!
//! Requests carry the short-lived authorization token issued by the ECR
//! `GetAuthorizationToken` API for the configured IAM credentials.

use super::{
    decode_basic, https_v2, mask, missing_fields, parse_config, validation_result, AuthPull,
};
use crate::registry::client::RegistryRequest;
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::image::ImageRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcrConfig {
    pub accesskeyid: Option<String>,
    pub secretaccesskey: Option<String>,
    pub region: Option<String>,
}

pub struct Ecr {
    access_key_id: String,
    secret_access_key: String,
    region: String,
    client: Option<aws_sdk_ecr::Client>,
}

impl std::fmt::Debug for Ecr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ecr")
            .field("access_key_id", &mask(&self.access_key_id))
            .field("region", &self.region)
            .finish()
    }
}

impl Ecr {
    pub fn from_config(component: &str, value: &serde_json::Value) -> Result<Self> {
        let config: EcrConfig = parse_config(component, value)?;
        validation_result(
            component,
            missing_fields(&[
                ("accesskeyid", config.accesskeyid.as_ref()),
                ("secretaccesskey", config.secretaccesskey.as_ref()),
                ("region", config.region.as_ref()),
            ]),
        )?;
        Ok(Self {
            access_key_id: config.accesskeyid.unwrap_or_default(),
            secret_access_key: config.secretaccesskey.unwrap_or_default(),
            region: config.region.unwrap_or_default(),
            client: None,
        })
    }

    /// Build the ECR API client for the configured credentials.
    pub async fn init(&mut self) {
        let credentials = aws_sdk_ecr::config::Credentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.clone(),
            None,
            None,
            "a3s-watch",
        );
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(self.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;
        self.client = Some(aws_sdk_ecr::Client::new(&sdk_config));
    }

    /// `<account>.dkr.ecr.<region>.amazonaws.com`
    pub fn matches(&self, image: &ImageRef) -> bool {
        is_ecr_host(image.registry_host())
    }

    pub fn normalize(&self, image: &mut ImageRef) {
        let host = image.registry_host().to_string();
        image.registry.url = https_v2(&host);
    }

    async fn authorization_token(&self) -> Result<String> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| WatchError::Other("ECR client not initialized".to_string()))?;
        let output = client
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| WatchError::Other(format!("ECR GetAuthorizationToken failed: {}", e)))?;
        output
            .authorization_data()
            .first()
            .and_then(|data| data.authorization_token())
            .map(str::to_string)
            .ok_or_else(|| WatchError::Other("ECR returned no authorization token".to_string()))
    }

    pub async fn authenticate(&self, request: RegistryRequest) -> Result<RegistryRequest> {
        let token = self.authorization_token().await?;
        request.authorization("Basic", &token)
    }

    pub async fn auth_pull(&self) -> Option<AuthPull> {
        match self.authorization_token().await {
            Ok(token) => decode_basic(&token),
            Err(e) => {
                tracing::warn!(error = %e, "Unable to fetch ECR pull credentials");
                None
            }
        }
    }

    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "accesskeyid": mask(&self.access_key_id),
            "secretaccesskey": mask(&self.secret_access_key),
            "region": self.region,
        })
    }
}

fn is_ecr_host(host: &str) -> bool {
    let Some(prefix) = host.strip_suffix(".amazonaws.com") else {
        return false;
    };
    match prefix.split_once(".dkr.ecr.") {
        Some((account, region)) => !account.is_empty() && !region.is_empty(),
        None => false,
    }
}

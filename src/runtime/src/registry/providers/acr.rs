//! Azure Container Registry.

use super::{
    basic_credentials, https_v2, mask, missing_fields, parse_config, validation_result, AuthPull,
};
use crate::registry::client::RegistryRequest;
use a3s_watch_core::error::Result;
use a3s_watch_core::image::ImageRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcrConfig {
    pub clientid: Option<String>,
    pub clientsecret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Acr {
    client_id: String,
    client_secret: String,
}

impl Acr {
    pub fn from_config(component: &str, value: &serde_json::Value) -> Result<Self> {
        let config: AcrConfig = parse_config(component, value)?;
        validation_result(
            component,
            missing_fields(&[
                ("clientid", config.clientid.as_ref()),
                ("clientsecret", config.clientsecret.as_ref()),
            ]),
        )?;
        Ok(Self {
            client_id: config.clientid.unwrap_or_default(),
            client_secret: config.clientsecret.unwrap_or_default(),
        })
    }

    pub fn matches(&self, image: &ImageRef) -> bool {
        image.registry_host().ends_with("azurecr.io")
    }

    pub fn normalize(&self, image: &mut ImageRef) {
        let host = image.registry_host().to_string();
        image.registry.url = https_v2(&host);
    }

    pub fn authenticate(&self, request: RegistryRequest) -> Result<RegistryRequest> {
        request.authorization(
            "Basic",
            &basic_credentials(&self.client_id, &self.client_secret),
        )
    }

    pub fn auth_pull(&self) -> Option<AuthPull> {
        Some(AuthPull {
            username: self.client_id.clone(),
            password: self.client_secret.clone(),
        })
    }

    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "clientid": self.client_id,
            "clientsecret": mask(&self.client_secret),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a3s_watch_core::image::RegistryRef;
    use serde_json::json;

    #[test]
    fn test_match_normalize_auth() {
        let provider = Acr::from_config(
            "registry.acr.private",
            &json!({"clientid": "app-id", "clientsecret": "app-secret-value"}),
        )
        .unwrap();
        let mut img = ImageRef {
            registry: RegistryRef {
                name: String::new(),
                url: "myregistry.azurecr.io".to_string(),
            },
            name: "app".to_string(),
            ..Default::default()
        };
        assert!(provider.matches(&img));
        provider.normalize(&mut img);
        assert_eq!(img.registry.url, "https://myregistry.azurecr.io/v2");
        assert!(provider.matches(&img));

        let request = provider
            .authenticate(RegistryRequest::get("https://myregistry.azurecr.io/v2/"))
            .unwrap();
        assert!(request.authorization_header().unwrap().starts_with("Basic "));
        assert_eq!(provider.masked()["clientsecret"], "app**********lue");
    }

    #[test]
    fn test_secret_required() {
        assert!(Acr::from_config("registry.acr.private", &json!({"clientid": "a"})).is_err());
    }
}

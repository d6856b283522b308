//! Self-hosted V2 registries (plain registry, Gitea, Forgejo).

use super::{
    basic_credentials, decode_basic, mask_opt, missing_fields, parse_config, validation_result,
    with_scheme, AuthPull,
};
use crate::registry::client::RegistryRequest;
use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::image::ImageRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomConfig {
    pub url: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Base64 `login:password`
    #[serde(default)]
    pub auth: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Custom {
    url: String,
    config: CustomConfig,
}

impl Custom {
    pub fn from_config(component: &str, value: &serde_json::Value) -> Result<Self> {
        let config: CustomConfig = parse_config(component, value)?;
        let mut missing = missing_fields(&[("url", config.url.as_ref())]);
        if config.login.is_some() != config.password.is_some() {
            missing.push(if config.login.is_some() { "password" } else { "login" }.to_string());
        }
        validation_result(component, missing)?;
        let url = config
            .url
            .as_deref()
            .map(with_scheme)
            .ok_or_else(|| WatchError::invalid_field(component, "url"))?;
        Ok(Self { url, config })
    }

    /// Configured base URL with scheme.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The image's registry host must appear in the configured URL.
    pub fn matches(&self, image: &ImageRef) -> bool {
        let host = image.registry_host();
        !host.is_empty() && self.url.contains(host)
    }

    pub fn normalize(&self, image: &mut ImageRef) {
        image.registry.url = format!("{}/v2", self.url);
    }

    fn credentials(&self) -> Option<String> {
        if let Some(auth) = &self.config.auth {
            return Some(auth.clone());
        }
        match (&self.config.login, &self.config.password) {
            (Some(login), Some(password)) => Some(basic_credentials(login, password)),
            _ => None,
        }
    }

    pub fn authenticate(&self, request: RegistryRequest) -> Result<RegistryRequest> {
        match self.credentials() {
            Some(credentials) => request.authorization("Basic", &credentials),
            None => Ok(request),
        }
    }

    pub fn auth_pull(&self) -> Option<AuthPull> {
        if let (Some(login), Some(password)) = (&self.config.login, &self.config.password) {
            return Some(AuthPull {
                username: login.clone(),
                password: password.clone(),
            });
        }
        self.config.auth.as_deref().and_then(decode_basic)
    }

    pub fn masked(&self) -> serde_json::Value {
        serde_json::json!({
            "url": self.url,
            "login": self.config.login,
            "password": mask_opt(&self.config.password),
            "auth": mask_opt(&self.config.auth),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a3s_watch_core::image::RegistryRef;
    use serde_json::json;

    fn image(url: &str) -> ImageRef {
        ImageRef {
            registry: RegistryRef {
                name: String::new(),
                url: url.to_string(),
            },
            name: "team/app".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_url_required() {
        let err = Custom::from_config("registry.custom.lan", &json!({})).unwrap_err();
        match err {
            WatchError::ConfigValidation { fields, .. } => assert_eq!(fields, vec!["url"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_login_without_password() {
        let err = Custom::from_config(
            "registry.custom.lan",
            &json!({"url": "https://registry.lan", "login": "me"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_match_and_normalize_roundtrip() {
        let provider =
            Custom::from_config("registry.gitea.git", &json!({"url": "git.example.com"})).unwrap();
        let mut img = image("git.example.com");
        assert!(provider.matches(&img));
        provider.normalize(&mut img);
        assert_eq!(img.registry.url, "https://git.example.com/v2");
        assert!(provider.matches(&img));
        assert!(!provider.matches(&image("ghcr.io")));
        assert!(!provider.matches(&image("")));
    }

    #[test]
    fn test_static_basic_auth() {
        let provider = Custom::from_config(
            "registry.custom.lan",
            &json!({"url": "https://registry.lan", "login": "me", "password": "pw"}),
        )
        .unwrap();
        let request = provider
            .authenticate(RegistryRequest::get("https://registry.lan/v2/"))
            .unwrap();
        assert_eq!(
            request.authorization_header(),
            Some(format!("Basic {}", basic_credentials("me", "pw")).as_str())
        );
    }

    #[test]
    fn test_anonymous_request_untouched() {
        let provider =
            Custom::from_config("registry.custom.lan", &json!({"url": "https://registry.lan"}))
                .unwrap();
        let request = provider
            .authenticate(RegistryRequest::get("https://registry.lan/v2/"))
            .unwrap();
        assert!(request.authorization_header().is_none());
        assert!(provider.auth_pull().is_none());
    }
}

//! Per-provider behavior.
//!
//! Each provider is a small struct holding its validated configuration and
//! overriding what differs from the generic V2 protocol: which hosts it
//! claims, how image names are normalized and how requests are
//! authenticated.

pub mod acr;
pub mod custom;
pub mod ecr;
pub mod gcr;
pub mod ghcr;
pub mod gitlab;
pub mod hub;
pub mod quay;

use a3s_watch_core::error::{Result, WatchError};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Credentials usable by an engine pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPull {
    pub username: String,
    pub password: String,
}

/// Deserialize a provider configuration, treating `null` as empty.
pub(crate) fn parse_config<T: DeserializeOwned>(
    component: &str,
    value: &serde_json::Value,
) -> Result<T> {
    let value = if value.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        value.clone()
    };
    serde_json::from_value(value).map_err(|e| WatchError::invalid_field(component, e.to_string()))
}

/// Collect the names of required fields that are missing or empty.
pub(crate) fn missing_fields(fields: &[(&str, Option<&String>)]) -> Vec<String> {
    fields
        .iter()
        .filter(|(_, value)| value.map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| name.to_string())
        .collect()
}

pub(crate) fn validation_result(component: &str, fields: Vec<String>) -> Result<()> {
    if fields.is_empty() {
        Ok(())
    } else {
        Err(WatchError::ConfigValidation {
            component: component.to_string(),
            fields,
        })
    }
}

/// Base64 of `user:password`.
pub(crate) fn basic_credentials(user: &str, password: &str) -> String {
    B64.encode(format!("{}:{}", user, password))
}

/// Decode a base64 `user:password` pair.
pub(crate) fn decode_basic(encoded: &str) -> Option<AuthPull> {
    let bytes = B64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(AuthPull {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Hide a secret, keeping three characters at each end of long values.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    if len == 0 {
        return String::new();
    }
    if len <= 8 {
        return "*".repeat(len);
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[len - 3..].iter().collect();
    format!("{}{}{}", head, "*".repeat(len - 6), tail)
}

pub(crate) fn mask_opt(value: &Option<String>) -> serde_json::Value {
    match value {
        Some(v) => serde_json::Value::String(mask(v)),
        None => serde_json::Value::Null,
    }
}

/// Normalized URL `https://<host>/v2`.
pub(crate) fn https_v2(host: &str) -> String {
    format!("https://{}/v2", host)
}

/// Ensure a configured URL carries a scheme and no trailing slash.
pub(crate) fn with_scheme(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Exchange (optional) Basic credentials for a bearer token.
pub(crate) async fn fetch_token(
    http: &reqwest::Client,
    url: &str,
    basic: Option<&str>,
) -> Result<String> {
    let mut request = http.get(url).header(reqwest::header::ACCEPT, "application/json");
    if let Some(credentials) = basic {
        request = request.header(
            reqwest::header::AUTHORIZATION,
            format!("Basic {}", credentials),
        );
    }
    let response = request
        .send()
        .await
        .map_err(|e| WatchError::Other(format!("Token request to {} failed: {}", url, e)))?;
    let status = response.status();
    if !status.is_success() {
        return Err(WatchError::Other(format!(
            "Token request to {} failed: {}",
            url, status
        )));
    }
    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| WatchError::Other(format!("Invalid token response from {}: {}", url, e)))?;
    body.token
        .or(body.access_token)
        .ok_or_else(|| WatchError::Other(format!("No token in response from {}", url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask(""), "");
        assert_eq!(mask("abc"), "***");
        assert_eq!(mask("12345678"), "********");
        assert_eq!(mask("123456789"), "123***789");
        assert_eq!(mask("ghp_abcdefghijkl"), "ghp**********jkl");
    }

    #[test]
    fn test_basic_roundtrip() {
        let encoded = basic_credentials("user", "p:ss");
        let decoded = decode_basic(&encoded).unwrap();
        assert_eq!(decoded.username, "user");
        assert_eq!(decoded.password, "p:ss");
        assert!(decode_basic("not base64!").is_none());
    }

    #[test]
    fn test_missing_fields() {
        let present = "x".to_string();
        let blank = " ".to_string();
        let missing = missing_fields(&[("a", Some(&present)), ("b", Some(&blank)), ("c", None)]);
        assert_eq!(missing, vec!["b", "c"]);
    }

    #[test]
    fn test_with_scheme() {
        assert_eq!(with_scheme("git.example.com/"), "https://git.example.com");
        assert_eq!(with_scheme("http://localhost:5000"), "http://localhost:5000");
    }

    #[test]
    fn test_parse_config_null_is_empty() {
        #[derive(Debug, Deserialize)]
        struct Sample {
            #[serde(default)]
            login: Option<String>,
        }
        let parsed: Sample = parse_config("registry.hub.public", &serde_json::Value::Null).unwrap();
        assert!(parsed.login.is_none());
    }
}

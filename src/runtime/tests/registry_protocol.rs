//! Registry V2 protocol against a mock registry.

use a3s_watch_core::error::{Result, WatchError};
use a3s_watch_core::image::{ImageRef, RegistryRef, TagRef};
use a3s_watch_runtime::registry::{Authenticate, Pagination, RegistryRequest, V2Client};
use a3s_watch_runtime::{ProviderRegistry, RegistryProvider};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INDEX_TYPE: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
const MANIFEST_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";
const CONFIG_TYPE: &str = "application/vnd.docker.container.image.v1+json";

fn host(server: &MockServer) -> String {
    server.uri().trim_start_matches("http://").to_string()
}

fn local_image(server: &MockServer, name: &str, tag: &str) -> ImageRef {
    ImageRef {
        registry: RegistryRef {
            name: "unknown".to_string(),
            url: host(server),
        },
        name: name.to_string(),
        tag: TagRef {
            value: tag.to_string(),
            semver: true,
        },
        architecture: "arm64".to_string(),
        os: "linux".to_string(),
        variant: vec!["v8".to_string()],
        ..Default::default()
    }
}

async fn custom_provider(server: &MockServer) -> RegistryProvider {
    RegistryProvider::register("custom", "local", &json!({ "url": server.uri() }))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_custom_provider_normalizes_to_v2_endpoint() {
    let server = MockServer::start().await;
    let provider = custom_provider(&server).await;
    assert_eq!(provider.id(), "registry.custom.local");

    let image = local_image(&server, "team/app", "1.0.0");
    assert!(provider.matches(&image));
    let normalized = provider.normalize_image(&image);
    assert_eq!(normalized.registry.url, format!("{}/v2", server.uri()));
    assert_eq!(normalized.registry.name, "registry.custom.local");
    // Idempotent
    assert_eq!(provider.normalize_image(&normalized), normalized);
}

#[tokio::test]
async fn test_tags_follow_last_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/team/app/tags/list"))
        .and(query_param("n", "1000"))
        .and(query_param_is_missing("last"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    "</v2/team/app/tags/list?n=1000&last=1.1.0>; rel=\"next\"",
                )
                .set_body_json(json!({ "name": "team/app", "tags": ["1.0.0", "1.1.0"] })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/team/app/tags/list"))
        .and(query_param("last", "1.1.0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "name": "team/app", "tags": ["1.1.0", "1.2.0"] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = custom_provider(&server).await;
    let image = provider.normalize_image(&local_image(&server, "team/app", "1.0.0"));
    let tags = provider.get_tags(&image).await.unwrap();
    assert_eq!(tags, vec!["1.2.0", "1.1.0", "1.0.0"]);
}

#[tokio::test]
async fn test_tags_stop_when_page_adds_nothing() {
    let server = MockServer::start().await;
    // Always advertises a next page but never advances
    Mock::given(method("GET"))
        .and(path("/v2/team/app/tags/list"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    "</v2/team/app/tags/list?n=1000&last=2.0.0>; rel=\"next\"",
                )
                .set_body_json(json!({ "tags": ["2.0.0"] })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let provider = custom_provider(&server).await;
    let image = provider.normalize_image(&local_image(&server, "team/app", "1.0.0"));
    let tags = provider.get_tags(&image).await.unwrap();
    assert_eq!(tags, vec!["2.0.0"]);
}

struct TokenPaging;

#[async_trait]
impl Authenticate for TokenPaging {
    async fn authenticate(
        &self,
        _image: &ImageRef,
        request: RegistryRequest,
    ) -> Result<RegistryRequest> {
        request.authorization("Bearer", "paging-token")
    }

    fn pagination(&self) -> Pagination {
        Pagination::NextPage
    }
}

#[tokio::test]
async fn test_tags_follow_next_page_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/org/app/tags/list"))
        .and(header("Authorization", "Bearer paging-token"))
        .and(query_param_is_missing("next_page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Link",
                    "</v2/org/app/tags/list?n=1000&next_page=gAAAAB2>; rel=\"next\"",
                )
                .set_body_json(json!({ "tags": ["v1.0.0"] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/org/app/tags/list"))
        .and(query_param("next_page", "gAAAAB2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": ["v2.0.0"] })))
        .mount(&server)
        .await;

    let image = ImageRef {
        registry: RegistryRef {
            name: "test".to_string(),
            url: format!("{}/v2", server.uri()),
        },
        name: "org/app".to_string(),
        ..Default::default()
    };
    let tags = V2Client::new().get_tags(&TokenPaging, &image).await.unwrap();
    assert_eq!(tags, vec!["v2.0.0", "v1.0.0"]);
}

#[tokio::test]
async fn test_manifest_list_resolves_platform_content_digest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/library/nginx/manifests/1.25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schemaVersion": 2,
            "mediaType": INDEX_TYPE,
            "manifests": [
                {
                    "digest": "sha256:amd",
                    "mediaType": MANIFEST_TYPE,
                    "platform": { "architecture": "amd64", "os": "linux" }
                },
                {
                    "digest": "sha256:armv7",
                    "mediaType": MANIFEST_TYPE,
                    "platform": { "architecture": "arm64", "os": "linux", "variant": "v7" }
                },
                {
                    "digest": "sha256:armv8",
                    "mediaType": MANIFEST_TYPE,
                    "platform": { "architecture": "arm64", "os": "linux", "variant": "v8" }
                }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/v2/library/nginx/manifests/sha256:armv8"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("docker-content-digest", "sha256:content-v8"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = custom_provider(&server).await;
    let image = provider.normalize_image(&local_image(&server, "library/nginx", "1.25"));
    let digest = provider.get_image_manifest_digest(&image, None).await.unwrap();
    assert_eq!(digest.digest, "sha256:content-v8");
    assert_eq!(digest.version, 2);
}

#[tokio::test]
async fn test_single_manifest_returns_config_digest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/team/tool/manifests/3.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_TYPE,
            "config": { "digest": "sha256:config", "mediaType": CONFIG_TYPE }
        })))
        .mount(&server)
        .await;

    let provider = custom_provider(&server).await;
    let image = provider.normalize_image(&local_image(&server, "team/tool", "3.0.0"));
    let digest = provider.get_image_manifest_digest(&image, None).await.unwrap();
    assert_eq!(digest.digest, "sha256:config");
    assert_eq!(digest.version, 1);
}

#[tokio::test]
async fn test_no_matching_platform_is_manifest_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/team/tool/manifests/1.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schemaVersion": 2,
            "mediaType": INDEX_TYPE,
            "manifests": [{
                "digest": "sha256:s390x",
                "mediaType": MANIFEST_TYPE,
                "platform": { "architecture": "s390x", "os": "linux" }
            }]
        })))
        .mount(&server)
        .await;

    let provider = custom_provider(&server).await;
    let image = provider.normalize_image(&local_image(&server, "team/tool", "1.0.0"));
    let err = provider
        .get_image_manifest_digest(&image, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WatchError::ManifestNotFound { .. }));
}

#[tokio::test]
async fn test_unauthorized_is_registry_call_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/private/app/tags/list"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = custom_provider(&server).await;
    let image = provider.normalize_image(&local_image(&server, "private/app", "1.0.0"));
    let err = provider.get_tags(&image).await.unwrap_err();
    assert!(err.is_registry_failure());
    match err {
        WatchError::RegistryCall { image, url, .. } => {
            assert_eq!(image, "private/app");
            assert!(url.ends_with("/v2/private/app/tags/list?n=1000"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_custom_basic_credentials_are_sent() {
    let server = MockServer::start().await;
    let expected = format!("Basic {}", B64.encode("robot:s3cret"));
    Mock::given(method("GET"))
        .and(path("/v2/team/app/tags/list"))
        .and(header("Authorization", expected.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": ["1.0.0"] })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = RegistryProvider::register(
        "custom",
        "private",
        &json!({ "url": server.uri(), "login": "robot", "password": "s3cret" }),
    )
    .await
    .unwrap();
    let image = provider.normalize_image(&local_image(&server, "team/app", "1.0.0"));
    assert_eq!(provider.get_tags(&image).await.unwrap(), vec!["1.0.0"]);

    let masked = provider.masked_configuration();
    assert_ne!(masked["password"], json!("s3cret"));
}

#[tokio::test]
async fn test_gitlab_exchanges_token_before_call() {
    let server = MockServer::start().await;
    let basic = format!("Basic {}", B64.encode(":glpat-token"));
    Mock::given(method("GET"))
        .and(path("/jwt/auth"))
        .and(query_param("service", "container_registry"))
        .and(query_param("scope", "repository:group/project:pull"))
        .and(header("Authorization", basic.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "jwt-abc" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/group/project/tags/list"))
        .and(header("Authorization", "Bearer jwt-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": ["0.9.0", "1.0.0"] })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = RegistryProvider::register(
        "gitlab",
        "private",
        &json!({ "url": server.uri(), "authurl": server.uri(), "token": "glpat-token" }),
    )
    .await
    .unwrap();
    let image = provider.normalize_image(&local_image(&server, "group/project", "0.9.0"));
    assert_eq!(provider.get_tags(&image).await.unwrap(), vec!["1.0.0", "0.9.0"]);
}

#[tokio::test]
async fn test_provider_registry_resolves_by_host() {
    let server = MockServer::start().await;
    let providers = ProviderRegistry::new();
    providers.insert(Arc::new(custom_provider(&server).await));

    let (normalized, provider) = providers.normalize(&local_image(&server, "team/app", "1.0.0"));
    assert_eq!(
        provider.map(|p| p.id().to_string()).as_deref(),
        Some("registry.custom.local")
    );
    assert_eq!(normalized.registry.name, "registry.custom.local");

    let foreign = ImageRef {
        registry: RegistryRef {
            name: "unknown".to_string(),
            url: "registry.example.org".to_string(),
        },
        name: "team/app".to_string(),
        ..Default::default()
    };
    let (unchanged, provider) = providers.normalize(&foreign);
    assert!(provider.is_none());
    assert_eq!(unchanged, foreign);
}

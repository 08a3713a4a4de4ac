//! Unit tests for registry client

use super::*;

use futures::StreamExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_registry_client_creation() {
    let client = RegistryClient::new().unwrap();
    assert_eq!(client.base_url(), "https://registry.npmjs.org");

    let client = RegistryClient::with_base_url("http://localhost:4873/").unwrap();
    assert_eq!(client.base_url(), "http://localhost:4873");
}

#[test]
fn test_encode_package_name() {
    // Regular package
    assert_eq!(encode_package_name("lodash"), "lodash");
    assert_eq!(encode_package_name("lodash.merge"), "lodash.merge");

    // Scoped package
    assert_eq!(encode_package_name("@types/node"), "@types%2Fnode");
}

#[tokio::test]
async fn test_fetch_package_info_success() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "name": "test-package",
        "description": "A test package",
        "dist-tags": {
            "latest": "1.0.0"
        },
        "versions": {
            "1.0.0": {
                "version": "1.0.0",
                "dist": {
                    "tarball": "https://registry.npmjs.org/test-package/-/test-package-1.0.0.tgz",
                    "shasum": "abc123"
                }
            }
        }
    });

    Mock::given(method("GET"))
        .and(path("/test-package"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RegistryClient::with_base_url(&mock_server.uri()).unwrap();

    let info = client.fetch_package_info("test-package").await.unwrap().unwrap();
    assert_eq!(info.name, "test-package");
    assert_eq!(info.description, Some("A test package".to_string()));
    assert_eq!(info.tag("latest"), Some("1.0.0"));
}

#[tokio::test]
async fn test_fetch_package_info_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/nonexistent-package"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = RegistryClient::with_base_url(&mock_server.uri()).unwrap();

    let result = client.fetch_package_info("nonexistent-package").await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_fetch_package_info_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RegistryClient::with_base_url(&mock_server.uri()).unwrap();

    match client.fetch_package_info("flaky").await {
        Err(CdnError::Network { message, .. }) => assert!(message.contains("503")),
        other => panic!("Expected Network error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_package_info_bad_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&mock_server)
        .await;

    let client = RegistryClient::with_base_url(&mock_server.uri()).unwrap();

    let result = client.fetch_package_info("garbage").await;
    assert!(matches!(result, Err(CdnError::Network { .. })));
}

#[tokio::test]
async fn test_scoped_package_url_encoding() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/@types%2Fnode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "@types/node",
            "dist-tags": { "latest": "1.0.0" },
            "versions": {}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RegistryClient::with_base_url(&mock_server.uri()).unwrap();

    let result = client.fetch_package_info("@types/node").await.unwrap();
    assert_eq!(result.unwrap().name, "@types/node");
}

#[tokio::test]
async fn test_download_tarball_streams_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pkg/-/pkg-1.0.0.tgz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tarball bytes".to_vec()))
        .mount(&mock_server)
        .await;

    let client = RegistryClient::with_base_url(&mock_server.uri()).unwrap();
    let url = format!("{}/pkg/-/pkg-1.0.0.tgz", mock_server.uri());

    let mut stream = client.download_tarball(&url).await.unwrap();
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, b"tarball bytes");
}

#[tokio::test]
async fn test_download_tarball_missing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = RegistryClient::with_base_url(&mock_server.uri()).unwrap();
    let url = format!("{}/pkg/-/pkg-9.9.9.tgz", mock_server.uri());

    assert!(client.download_tarball(&url).await.is_err());
}

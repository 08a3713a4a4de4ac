//! Unit tests for the request pipeline.
//!
//! Packages are laid out directly in the cache directory, so only the
//! registry document has to be served.

use super::*;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FILES: &[(&str, &str)] = &[
    ("package.json", r#"{"name":"left-pad","version":"1.3.0","main":"index.js"}"#),
    ("index.js", "module.exports = leftPad;"),
    ("lib/util.js", "exports.pad = 1;"),
    ("lib/nested/deep.js", "exports.deep = 1;"),
    ("README.md", "# left-pad"),
];

struct Fixture {
    registry: MockServer,
    cache_dir: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        let registry = MockServer::start().await;
        let cache_dir = tempfile::tempdir().unwrap();
        Self { registry, cache_dir }
    }

    /// Unpack a package by hand, as if it had been fetched before
    fn install(&self, name_at_version: &str, files: &[(&str, &str)]) {
        let root = self.cache_dir.path().join(name_at_version);
        for (file, contents) in files {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
    }

    async fn mount_document(&self, expected_hits: u64) {
        let document = serde_json::json!({
            "name": "left-pad",
            "dist-tags": { "latest": "1.3.0", "beta": "1.3.0" },
            "versions": {
                "1.1.0": { "version": "1.1.0", "dist": { "tarball": format!("{}/left-pad/-/left-pad-1.1.0.tgz", self.registry.uri()) } },
                "1.3.0": { "version": "1.3.0", "dist": { "tarball": format!("{}/left-pad/-/left-pad-1.3.0.tgz", self.registry.uri()) } }
            }
        });

        Mock::given(method("GET"))
            .and(path("/left-pad"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .expect(expected_hits)
            .mount(&self.registry)
            .await;
    }

    fn config(&self) -> ServerConfig {
        ServerConfig {
            registry_url: self.registry.uri(),
            cache_dir: self.cache_dir.path().to_path_buf(),
            redirect_ttl: 30,
            blacklist: vec!["evil".to_string()],
            ..ServerConfig::default()
        }
    }

    async fn orchestrator(&self) -> RequestOrchestrator {
        self.orchestrator_with(self.config()).await
    }

    async fn orchestrator_with(&self, config: ServerConfig) -> RequestOrchestrator {
        RequestOrchestrator::from_config(config).await.unwrap()
    }
}

fn expect_redirect(outcome: Outcome) -> (String, u64) {
    match outcome {
        Outcome::Redirect { location, max_age } => (location, max_age),
        other => panic!("Expected redirect, got {:?}", other),
    }
}

fn expect_file(outcome: Outcome) -> String {
    match outcome {
        Outcome::File { package_path, .. } => package_path,
        other => panic!("Expected file, got {:?}", other),
    }
}

fn expect_error(outcome: Outcome) -> CdnError {
    match outcome {
        Outcome::Error(error) => error,
        other => panic!("Expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_urls() {
    let fixture = Fixture::new().await;
    let orchestrator = fixture.orchestrator().await;

    for url in ["/", "/left-pad?foo=bar", "/left-pad@%zz/index.js"] {
        let error = expect_error(orchestrator.handle(url).await);
        assert!(matches!(error, CdnError::InvalidUrl { .. }), "{}", url);
        assert_eq!(error.to_string(), format!("Invalid URL: {}", url));
    }
}

#[tokio::test]
async fn test_version_cannot_leave_cache_dir() {
    let fixture = Fixture::new().await;
    fixture.install("cache/left-pad@1.3.0", FILES);
    fixture.install(
        "secret",
        &[("package.json", "{}"), ("credentials.txt", "TOPSECRET")],
    );
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&fixture.registry)
        .await;
    let orchestrator = fixture
        .orchestrator_with(ServerConfig {
            cache_dir: fixture.cache_dir.path().join("cache"),
            ..fixture.config()
        })
        .await;

    assert_eq!(expect_file(orchestrator.handle("/left-pad@1.3.0/index.js").await), "/index.js");

    for url in [
        "/left-pad@1.3.0%2F..%2F..%2Fsecret/credentials.txt",
        "/left-pad@..%2F..%2Fsecret/credentials.txt",
        "/left-pad@%2E%2E/secret/credentials.txt",
    ] {
        let error = expect_error(orchestrator.handle(url).await);
        assert!(matches!(error, CdnError::InvalidUrl { .. }), "{}", url);
        assert_eq!(error.status_code(), 403);
    }
}

#[tokio::test]
async fn test_blacklisted_package_never_reaches_registry() {
    let fixture = Fixture::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&fixture.registry)
        .await;
    let orchestrator = fixture.orchestrator().await;

    let error = expect_error(orchestrator.handle("/evil@1.0.0/index.js").await);
    assert_eq!(error.status_code(), 403);
    assert_eq!(error.to_string(), "Package evil is blacklisted");
}

#[tokio::test]
async fn test_unknown_package() {
    let fixture = Fixture::new().await;
    Mock::given(method("GET"))
        .and(path("/nope"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&fixture.registry)
        .await;
    let orchestrator = fixture.orchestrator().await;

    let error = expect_error(orchestrator.handle("/nope@1.0.0").await);
    assert_eq!(error.to_string(), "Not found: package \"nope\"");

    // The negative result is cached
    let error = expect_error(orchestrator.handle("/nope@2.0.0").await);
    assert_eq!(error.status_code(), 404);
}

#[tokio::test]
async fn test_registry_failure_is_a_server_error() {
    let fixture = Fixture::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&fixture.registry)
        .await;
    let orchestrator = fixture.orchestrator().await;

    let error = expect_error(orchestrator.handle("/left-pad@1.3.0").await);
    assert!(error.is_server_error());
}

#[tokio::test]
async fn test_tag_redirects_with_redirect_ttl() {
    let fixture = Fixture::new().await;
    fixture.mount_document(1).await;
    let orchestrator = fixture.orchestrator().await;

    let (location, max_age) = expect_redirect(orchestrator.handle("/left-pad/index.js?main=browser").await);
    assert_eq!(location, "/left-pad@1.3.0/index.js?main=browser");
    assert_eq!(max_age, 30);

    // Served from the registry info cache
    let (location, _) = expect_redirect(orchestrator.handle("/left-pad@beta").await);
    assert_eq!(location, "/left-pad@1.3.0");
}

#[tokio::test]
async fn test_range_redirects_to_max_satisfying() {
    let fixture = Fixture::new().await;
    fixture.mount_document(1).await;
    let orchestrator = fixture.orchestrator().await;

    let (location, _) = expect_redirect(orchestrator.handle("/left-pad@%5E1.1/lib/util.js").await);
    assert_eq!(location, "/left-pad@1.3.0/lib/util.js");

    let (location, _) = expect_redirect(orchestrator.handle("/left-pad@~1.1.0").await);
    assert_eq!(location, "/left-pad@1.1.0");

    let error = expect_error(orchestrator.handle("/left-pad@^9").await);
    assert_eq!(error.to_string(), "Not found: package left-pad@^9");
}

#[tokio::test]
async fn test_cached_package_skips_registry() {
    let fixture = Fixture::new().await;
    fixture.install("left-pad@1.3.0", FILES);
    fixture.mount_document(0).await;
    let orchestrator = fixture.orchestrator().await;

    assert_eq!(expect_file(orchestrator.handle("/left-pad@1.3.0/index.js").await), "/index.js");
    assert_eq!(expect_file(orchestrator.handle("/left-pad@1.3.0/lib/util").await), "/lib/util.js");
    assert_eq!(expect_file(orchestrator.handle("/left-pad@1.3.0").await), "/index.js");
}

#[tokio::test]
async fn test_missing_file() {
    let fixture = Fixture::new().await;
    fixture.install("left-pad@1.3.0", FILES);
    let orchestrator = fixture.orchestrator().await;

    let error = expect_error(orchestrator.handle("/left-pad@1.3.0/nope.js").await);
    assert_eq!(
        error.to_string(),
        "Not found: file \"/nope.js\" in package left-pad@1.3.0"
    );
}

#[tokio::test]
async fn test_directory_without_trailing_slash_redirects() {
    let fixture = Fixture::new().await;
    fixture.install("left-pad@1.3.0", FILES);
    let orchestrator = fixture.orchestrator().await;

    let (location, max_age) = expect_redirect(orchestrator.handle("/left-pad@1.3.0/lib?json").await);
    assert_eq!(location, "/left-pad@1.3.0/lib/?json");
    assert_eq!(max_age, ONE_YEAR);
}

#[tokio::test]
async fn test_directory_index_page() {
    let fixture = Fixture::new().await;
    fixture.install("left-pad@1.3.0", FILES);
    fixture.mount_document(1).await;
    let orchestrator = fixture.orchestrator().await;

    match orchestrator.handle("/left-pad@1.3.0/lib/").await {
        Outcome::Html { body, max_age } => {
            assert_eq!(max_age, ONE_YEAR);
            assert!(body.contains("<title>Index of /lib/</title>"));
            assert!(body.contains("href=\"nested/\""));
            assert!(body.contains("href=\"util.js\""));
            assert!(body.contains("left-pad@1.1.0</option>"));
        }
        other => panic!("Expected HTML, got {:?}", other),
    }
}

#[tokio::test]
async fn test_directory_without_auto_index() {
    let fixture = Fixture::new().await;
    fixture.install("left-pad@1.3.0", FILES);
    let orchestrator = fixture
        .orchestrator_with(ServerConfig {
            auto_index: false,
            ..fixture.config()
        })
        .await;

    let error = expect_error(orchestrator.handle("/left-pad@1.3.0/lib/").await);
    assert_eq!(error.status_code(), 403);
    assert_eq!(
        error.to_string(),
        "Invalid URL: left-pad@1.3.0/lib is a directory"
    );
}

#[tokio::test]
async fn test_json_metadata() {
    let fixture = Fixture::new().await;
    fixture.install("left-pad@1.3.0", FILES);
    let orchestrator = fixture
        .orchestrator_with(ServerConfig {
            maximum_depth: Some(1),
            ..fixture.config()
        })
        .await;

    match orchestrator.handle("/left-pad@1.3.0/lib/?json").await {
        Outcome::Json { body, max_age } => {
            assert_eq!(max_age, ONE_YEAR);
            assert_eq!(body.path, "/lib");
            let files = body.files.unwrap();
            assert_eq!(files.len(), 2);
            let nested = files.iter().find(|f| f.path == "/lib/nested").unwrap();
            assert!(nested.files.is_none());
        }
        other => panic!("Expected JSON, got {:?}", other),
    }
}

#[tokio::test]
async fn test_main_field_selection() {
    let fixture = Fixture::new().await;
    fixture.install(
        "multi@1.0.0",
        &[
            (
                "package.json",
                r#"{"main":"lib/main","browser":{"./x":"./y"},"module":"es/index.js","private":true}"#,
            ),
            ("lib/main.js", ""),
            ("es/index.js", ""),
        ],
    );
    let orchestrator = fixture.orchestrator().await;

    // Object-form browser is ignored
    assert_eq!(expect_file(orchestrator.handle("/multi@1.0.0").await), "/lib/main.js");
    assert_eq!(expect_file(orchestrator.handle("/multi@1.0.0?main=module").await), "/es/index.js");

    let error = expect_error(orchestrator.handle("/multi@1.0.0?main=unpkg").await);
    assert_eq!(error.to_string(), "Not found: field \"unpkg\" in multi@1.0.0/package.json");

    // Non-string values count as missing
    let error = expect_error(orchestrator.handle("/multi@1.0.0?main=private").await);
    assert_eq!(error.status_code(), 404);
}

#[tokio::test]
async fn test_missing_main_file() {
    let fixture = Fixture::new().await;
    fixture.install("hollow@1.0.0", &[("package.json", r#"{"main":"dist/hollow.js"}"#)]);
    let orchestrator = fixture.orchestrator().await;

    let error = expect_error(orchestrator.handle("/hollow@1.0.0").await);
    assert_eq!(
        error.to_string(),
        "Not found: main file \"dist/hollow.js\" in package hollow@1.0.0"
    );
}

#[tokio::test]
async fn test_unparsable_manifest() {
    let fixture = Fixture::new().await;
    fixture.install("broken@1.0.0", &[("package.json", "{ not json")]);
    let orchestrator = fixture.orchestrator().await;

    match orchestrator.handle("/broken@1.0.0").await {
        Outcome::Text { status, body } => {
            assert_eq!(status, 500);
            assert!(body.starts_with("Error parsing broken@1.0.0/package.json: "));
        }
        other => panic!("Expected text, got {:?}", other),
    }
}

#[tokio::test]
async fn test_disk_registry_cache_backend() {
    let fixture = Fixture::new().await;
    fixture.mount_document(1).await;
    let registry_cache = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        registry_cache: RegistryCacheKind::Disk {
            path: registry_cache.path().to_path_buf(),
        },
        ..fixture.config()
    };

    let orchestrator = fixture.orchestrator_with(config.clone()).await;
    expect_redirect(orchestrator.handle("/left-pad").await);

    // A second server sharing the directory reuses the cached document
    let orchestrator = fixture.orchestrator_with(config).await;
    expect_redirect(orchestrator.handle("/left-pad@beta").await);
}

//! Local package directories and the tarball fetch that fills them

use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures::Stream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use npmcdn_core::error::CdnError;
use npmcdn_registry::RegistryClient;

use crate::tarball::extract_stream;
use crate::CacheResult;

/// A package directory is complete once this file exists in it
pub const MARKER_FILE: &str = "package.json";

static STAGING_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Unique sibling of `package_dir` that a tarball is unpacked into before
/// it is moved into place
fn staging_dir(package_dir: &Path) -> PathBuf {
    let sequence = STAGING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut name = package_dir
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".partial-{}-{}", std::process::id(), sequence));
    package_dir.with_file_name(name)
}

async fn remove_dir_if_present(dir: &Path) -> CacheResult<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CdnError::io(format!("Failed to remove {}", dir.display()), e)),
    }
}

/// Ensures packages are unpacked under the cache directory, fetching each
/// one at most once even under concurrent requests.
#[derive(Debug, Clone)]
pub struct PackageFetcher {
    cache_dir: PathBuf,
    client: RegistryClient,
    /// One lock per package directory currently being fetched
    in_flight: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PackageFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>, client: RegistryClient) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            client,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// `<cache_dir>/<name>@<version>`, refused unless it stays inside the
    /// cache directory
    pub fn package_dir(&self, package_name: &str, version: &str) -> CacheResult<PathBuf> {
        let relative = PathBuf::from(format!("{}@{}", package_name, version));
        // `@scope/name@version` is the only name spanning two directories
        let depth = if package_name.starts_with('@') { 2 } else { 1 };

        let contained = relative.components().count() == depth
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !contained {
            return Err(CdnError::InvalidUrl {
                url: relative.to_string_lossy().into_owned(),
            });
        }

        Ok(self.cache_dir.join(relative))
    }

    /// Whether a complete copy of the package is on disk
    pub async fn is_cached(package_dir: &Path) -> bool {
        tokio::fs::metadata(package_dir.join(MARKER_FILE))
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false)
    }

    /// Download and unpack `tarball_url` into `package_dir` unless it is
    /// already there. The work runs on its own task, so it finishes (and
    /// warms the cache) even if the caller goes away.
    pub async fn fetch(&self, package_dir: &Path, tarball_url: &str) -> CacheResult<()> {
        let fetcher = self.clone();
        let package_dir = package_dir.to_path_buf();
        let tarball_url = tarball_url.to_string();

        tokio::spawn(async move { fetcher.fetch_once(&package_dir, &tarball_url).await })
            .await
            .map_err(|e| CdnError::server(format!("Package fetch task failed: {}", e)))?
    }

    async fn fetch_once(&self, package_dir: &Path, tarball_url: &str) -> CacheResult<()> {
        let lock = Arc::clone(
            self.in_flight
                .entry(package_dir.to_path_buf())
                .or_default()
                .value(),
        );

        let result = {
            let _guard = lock.lock().await;
            // Someone else may have finished while we waited
            if Self::is_cached(package_dir).await {
                Ok(())
            } else {
                self.download(package_dir, tarball_url).await
            }
        };

        drop(lock);
        self.in_flight
            .remove_if(package_dir, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn download(&self, package_dir: &Path, tarball_url: &str) -> CacheResult<()> {
        debug!("Local cache miss for {}", package_dir.display());

        let stream = self.client.download_tarball(tarball_url).await?;
        Self::unpack(package_dir, stream).await?;

        info!("Unpacked {} into {}", tarball_url, package_dir.display());
        Ok(())
    }

    /// Extract into a staging directory and rename it over `package_dir`
    /// only once every entry is on disk. The marker never shows up in
    /// `package_dir` before the rest of the package does.
    async fn unpack<S>(package_dir: &Path, stream: S) -> CacheResult<()>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
    {
        let staging = staging_dir(package_dir);

        if let Err(e) = extract_stream(stream, staging.clone()).await {
            if let Err(cleanup) = remove_dir_if_present(&staging).await {
                warn!("{}", cleanup);
            }
            return Err(e);
        }

        // Leftovers from an interrupted run have no marker
        remove_dir_if_present(package_dir).await?;

        if let Err(e) = tokio::fs::rename(&staging, package_dir).await {
            if let Err(cleanup) = remove_dir_if_present(&staging).await {
                warn!("{}", cleanup);
            }
            // Another process sharing the cache directory got there first
            if Self::is_cached(package_dir).await {
                return Ok(());
            }
            return Err(CdnError::io(
                format!("Failed to move package into {}", package_dir.display()),
                e,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::{Builder, EntryType, Header};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn file_header(name: &str, size: usize) -> Header {
        let mut header = Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(size as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        header
    }

    /// Plain tar whose second entry tries to climb out of the package
    fn tarball_failing_after_manifest() -> Vec<u8> {
        let mut tar = Builder::new(Vec::new());
        let manifest = br#"{"name":"left-pad","version":"1.3.0"}"#;
        tar.append(&file_header("package/package.json", manifest.len()), &manifest[..])
            .unwrap();

        let mut evil = Header::new_old();
        let name = b"package/../evil.js";
        evil.as_old_mut().name[..name.len()].copy_from_slice(name);
        evil.set_size(4);
        evil.set_mode(0o644);
        evil.set_entry_type(EntryType::Regular);
        evil.set_cksum();
        tar.append(&evil, &b"evil"[..]).unwrap();

        tar.append(&file_header("package/index.js", 2), &b"ok"[..]).unwrap();
        tar.into_inner().unwrap()
    }

    fn package_tarball() -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut tar = Builder::new(encoder);
        for (name, contents) in [
            ("package/package.json", &br#"{"name":"left-pad","version":"1.3.0"}"#[..]),
            ("package/index.js", &b"module.exports = leftPad;"[..]),
        ] {
            let mut header = Header::new_gnu();
            header.set_path(name).unwrap();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(EntryType::Regular);
            header.set_cksum();
            tar.append(&header, contents).unwrap();
        }
        tar.into_inner().unwrap().finish().unwrap()
    }

    async fn tarball_server(expected_hits: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/left-pad/-/left-pad-1.3.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(package_tarball()))
            .expect(expected_hits)
            .mount(&server)
            .await;
        server
    }

    fn fetcher(server: &MockServer, cache_dir: &Path) -> PackageFetcher {
        PackageFetcher::new(cache_dir, RegistryClient::with_base_url(&server.uri()).unwrap())
    }

    #[test]
    fn test_package_dir_layout() {
        let fetcher = PackageFetcher::new("/cache", RegistryClient::new().unwrap());
        assert_eq!(
            fetcher.package_dir("@scope/name", "1.0.0").unwrap(),
            PathBuf::from("/cache/@scope/name@1.0.0")
        );
    }

    #[test]
    fn test_package_dir_stays_in_cache() {
        let fetcher = PackageFetcher::new("/cache", RegistryClient::new().unwrap());

        for (name, version) in [
            ("left-pad", "1.3.0/../../secret"),
            ("left-pad", "1.0.0/x"),
            ("..", "/etc"),
            ("/abs", "1.0.0"),
            ("@a/b/c", "1.0.0"),
        ] {
            let result = fetcher.package_dir(name, version);
            assert!(
                matches!(result, Err(CdnError::InvalidUrl { .. })),
                "{}@{}",
                name,
                version
            );
        }
    }

    #[tokio::test]
    async fn test_fetch_unpacks_package() {
        let server = tarball_server(1).await;
        let cache_dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(&server, cache_dir.path());

        let dir = fetcher.package_dir("left-pad", "1.3.0").unwrap();
        assert!(!PackageFetcher::is_cached(&dir).await);

        let url = format!("{}/left-pad/-/left-pad-1.3.0.tgz", server.uri());
        fetcher.fetch(&dir, &url).await.unwrap();

        assert!(PackageFetcher::is_cached(&dir).await);
        assert!(dir.join("index.js").is_file());

        // Second fetch sees the marker and does not download again
        fetcher.fetch(&dir, &url).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_fetches_download_once() {
        let server = tarball_server(1).await;
        let cache_dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(&server, cache_dir.path());

        let dir = fetcher.package_dir("left-pad", "1.3.0").unwrap();
        let url = format!("{}/left-pad/-/left-pad-1.3.0.tgz", server.uri());

        let results = futures::future::join_all((0..8).map(|_| fetcher.fetch(&dir, &url))).await;
        assert!(results.iter().all(Result::is_ok));
        assert!(fetcher.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_partial_directory_is_replaced() {
        let server = tarball_server(1).await;
        let cache_dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(&server, cache_dir.path());

        let dir = fetcher.package_dir("left-pad", "1.3.0").unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stale.js"), "half written").unwrap();

        let url = format!("{}/left-pad/-/left-pad-1.3.0.tgz", server.uri());
        fetcher.fetch(&dir, &url).await.unwrap();

        assert!(!dir.join("stale.js").exists());
        assert!(PackageFetcher::is_cached(&dir).await);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_no_marker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let cache_dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(&server, cache_dir.path());

        let dir = fetcher.package_dir("left-pad", "1.3.0").unwrap();
        let url = format!("{}/left-pad/-/left-pad-1.3.0.tgz", server.uri());

        assert!(fetcher.fetch(&dir, &url).await.is_err());
        assert!(!PackageFetcher::is_cached(&dir).await);
    }

    #[tokio::test]
    async fn test_failed_extraction_leaves_no_marker() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball_failing_after_manifest()))
            .expect(2)
            .mount(&server)
            .await;
        let cache_dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(&server, cache_dir.path());

        let dir = fetcher.package_dir("left-pad", "1.3.0").unwrap();
        let url = format!("{}/left-pad/-/left-pad-1.3.0.tgz", server.uri());

        let result = fetcher.fetch(&dir, &url).await;
        assert!(matches!(result, Err(CdnError::Extraction { .. })));
        assert!(!PackageFetcher::is_cached(&dir).await);
        assert!(!dir.exists());
        // Staging directory is cleaned up too
        assert_eq!(std::fs::read_dir(cache_dir.path()).unwrap().count(), 0);

        // Nothing was cached, so the next request tries again
        assert!(fetcher.fetch(&dir, &url).await.is_err());
    }

    #[tokio::test]
    async fn test_marker_appears_only_when_complete() {
        let cache_dir = tempfile::tempdir().unwrap();
        let dir = cache_dir.path().join("left-pad@1.3.0");

        let mut tar = Builder::new(Vec::new());
        let manifest = br#"{"name":"left-pad","version":"1.3.0"}"#;
        tar.append(&file_header("package/package.json", manifest.len()), &manifest[..])
            .unwrap();
        tar.append(&file_header("package/index.js", 2), &b"ok"[..]).unwrap();
        let data = tar.into_inner().unwrap();
        // Header and padded contents of the manifest entry
        let (head, tail) = data.split_at(1024);

        let (sender, receiver) = futures::channel::mpsc::unbounded::<io::Result<Bytes>>();
        sender.unbounded_send(Ok(Bytes::copy_from_slice(head))).unwrap();

        let unpack = tokio::spawn({
            let dir = dir.clone();
            async move { PackageFetcher::unpack(&dir, receiver).await }
        });

        // Wait for the manifest to land in the staging directory
        let mut staged_manifest = None;
        for _ in 0..500 {
            staged_manifest = std::fs::read_dir(cache_dir.path())
                .unwrap()
                .filter_map(Result::ok)
                .map(|entry| entry.path().join(MARKER_FILE))
                .find(|path| path.is_file());
            if staged_manifest.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let staged_manifest = staged_manifest.expect("manifest was never staged");
        assert!(staged_manifest.starts_with(cache_dir.path()));
        assert_ne!(staged_manifest.parent().unwrap(), dir.as_path());
        assert!(!PackageFetcher::is_cached(&dir).await);

        sender.unbounded_send(Ok(Bytes::copy_from_slice(tail))).unwrap();
        drop(sender);
        unpack.await.unwrap().unwrap();

        assert!(PackageFetcher::is_cached(&dir).await);
        assert!(dir.join("index.js").is_file());
        assert!(!staged_manifest.exists());
    }
}

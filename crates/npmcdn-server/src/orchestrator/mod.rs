//! The request pipeline.
//!
//! Every request goes through three stages, each of which may answer early:
//!
//! 1. `fetch_package`: make sure the requested version is unpacked locally,
//!    redirecting tags and ranges to a concrete version
//! 2. `find_file`: map the URL (or the manifest's entry point) to a file
//! 3. `serve_file`: produce the file, its JSON metadata or an index page

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use npmcdn_cache::{
    list_directory, FileResolver, MetadataBuilder, MetadataNode, PackageFetcher, ResolvedFile,
    MARKER_FILE,
};
use npmcdn_config::{RegistryCacheKind, ServerConfig};
use npmcdn_core::error::{CdnError, CdnResult};
use npmcdn_core::{create_package_url, parse_package_url, PackageManifest, PackageRequest};
use npmcdn_registry::{CacheBackend, DiskBackend, MemoryBackend, PackageInfoService, RegistryClient};
use npmcdn_resolver::resolve::{resolve_version, Resolution};

use crate::index::IndexPage;

/// `max-age` of everything addressed by an exact version
pub const ONE_YEAR: u64 = 60 * 60 * 24 * 365;

/// What to send back for a request
#[derive(Debug)]
pub enum Outcome {
    Redirect {
        location: String,
        max_age: u64,
    },
    /// Plain text with an explicit status
    Text {
        status: u16,
        body: String,
    },
    File {
        /// Location on disk
        path: PathBuf,
        /// Path inside the package, used for the content type
        package_path: String,
        metadata: Metadata,
        max_age: u64,
    },
    Json {
        body: MetadataNode,
        max_age: u64,
    },
    Html {
        body: String,
        max_age: u64,
    },
    Error(CdnError),
}

/// Result of a pipeline stage: keep going, or answer now
enum Step<T> {
    Continue(T),
    Respond(Outcome),
}

/// Drives a request URL through the pipeline
#[derive(Debug, Clone)]
pub struct RequestOrchestrator {
    config: Arc<ServerConfig>,
    packages: PackageInfoService,
    fetcher: PackageFetcher,
}

/// Registry info cache described by the configuration
pub async fn build_cache_backend(kind: &RegistryCacheKind) -> CdnResult<Arc<dyn CacheBackend>> {
    let backend: Arc<dyn CacheBackend> = match kind {
        RegistryCacheKind::Memory { capacity } => Arc::new(MemoryBackend::with_capacity(*capacity)),
        RegistryCacheKind::Disk { path } => Arc::new(DiskBackend::open(path.clone()).await?),
    };
    Ok(backend)
}

impl RequestOrchestrator {
    pub fn new(config: ServerConfig, packages: PackageInfoService, fetcher: PackageFetcher) -> Self {
        Self {
            config: Arc::new(config),
            packages,
            fetcher,
        }
    }

    /// Wire up the registry client, info cache and fetcher from `config`
    pub async fn from_config(config: ServerConfig) -> CdnResult<Self> {
        let client = RegistryClient::with_base_url(&config.registry_url)?;
        let backend = build_cache_backend(&config.registry_cache).await?;
        let packages = PackageInfoService::new(client.clone(), backend);
        let fetcher = PackageFetcher::new(config.cache_dir.clone(), client);

        Ok(Self::new(config, packages, fetcher))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Answer a request for `url` (path plus query string)
    pub async fn handle(&self, url: &str) -> Outcome {
        match self.run(url).await {
            Ok(outcome) => outcome,
            Err(error) => Outcome::Error(error),
        }
    }

    async fn run(&self, url: &str) -> CdnResult<Outcome> {
        let request = parse_package_url(url).ok_or_else(|| CdnError::InvalidUrl {
            url: url.to_string(),
        })?;

        if self.config.is_blacklisted(&request.package_name) {
            return Err(CdnError::Blacklisted {
                name: request.package_name,
            });
        }

        let package_dir = match self.fetch_package(&request).await? {
            Step::Continue(dir) => dir,
            Step::Respond(outcome) => return Ok(outcome),
        };

        let file = match self.find_file(&request, &package_dir).await? {
            Step::Continue(file) => file,
            Step::Respond(outcome) => return Ok(outcome),
        };

        self.serve_file(&request, &package_dir, file).await
    }

    async fn fetch_package(&self, request: &PackageRequest) -> CdnResult<Step<PathBuf>> {
        let package_dir = self
            .fetcher
            .package_dir(&request.package_name, &request.version)?;

        if PackageFetcher::is_cached(&package_dir).await {
            return Ok(Step::Continue(package_dir));
        }

        let info = self
            .packages
            .get_package_info(&request.package_name)
            .await?
            .ok_or_else(|| CdnError::PackageNotFound {
                name: format!("\"{}\"", request.package_name),
            })?;

        match resolve_version(&info, &request.version)? {
            Resolution::Exact(version) => {
                self.fetcher
                    .fetch(&package_dir, &version.dist.tarball)
                    .await?;
                Ok(Step::Continue(package_dir))
            }
            Resolution::Redirect(version) => {
                let location = create_package_url(
                    &request.package_name,
                    Some(&version),
                    request.filename.as_deref(),
                    Some(&request.search),
                );
                Ok(Step::Respond(Outcome::Redirect {
                    location,
                    max_age: self.config.redirect_ttl,
                }))
            }
            Resolution::NotFound => Err(CdnError::PackageNotFound {
                name: request.display_name(),
            }),
        }
    }

    async fn find_file(&self, request: &PackageRequest, package_dir: &Path) -> CdnResult<Step<ResolvedFile>> {
        let resolver = FileResolver::new(package_dir);
        let display_name = request.display_name();

        if let Some(filename) = &request.filename {
            let file = resolver
                .resolve(filename, false)
                .await?
                .ok_or_else(|| CdnError::FileNotFound {
                    what: format!("file \"{}\" in package {}", filename, display_name),
                })?;

            if file.is_dir() && !request.has_trailing_slash() {
                return Ok(Step::Respond(Outcome::Redirect {
                    location: format!("{}/{}", request.pathname, request.search),
                    max_age: ONE_YEAR,
                }));
            }

            return Ok(Step::Continue(file));
        }

        let manifest_path = package_dir.join(MARKER_FILE);
        let raw = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| CdnError::io(format!("Failed to read {}", manifest_path.display()), e))?;

        let manifest = match PackageManifest::from_json(&raw) {
            Ok(manifest) => manifest,
            Err(e) => {
                return Ok(Step::Respond(Outcome::Text {
                    status: 500,
                    body: format!("Error parsing {}/package.json: {}", display_name, e),
                }))
            }
        };

        let query_main = request.query.main.as_deref();
        let main_filename = manifest
            .main_entry(query_main)
            .ok_or_else(|| CdnError::FileNotFound {
                what: format!(
                    "field \"{}\" in {}/package.json",
                    query_main.unwrap_or_default(),
                    display_name
                ),
            })?;

        let file = resolver
            .resolve(main_filename, true)
            .await?
            .ok_or_else(|| CdnError::FileNotFound {
                what: format!("main file \"{}\" in package {}", main_filename, display_name),
            })?;

        Ok(Step::Continue(file))
    }

    async fn serve_file(&self, request: &PackageRequest, package_dir: &Path, file: ResolvedFile) -> CdnResult<Outcome> {
        let display_name = request.display_name();

        if request.query.json {
            let node = MetadataBuilder::new(package_dir, self.config.maximum_depth)
                .build(&file.path, &file.metadata)
                .await
                .map_err(|e| {
                    warn!("Metadata for {}{} failed: {}", display_name, file.path, e);
                    CdnError::server(format!(
                        "unable to generate JSON metadata for {}{}",
                        display_name, file.path
                    ))
                })?;

            return Ok(Outcome::Json {
                body: node,
                max_age: ONE_YEAR,
            });
        }

        if file.is_file() {
            return Ok(Outcome::File {
                path: file.absolute,
                package_path: file.path,
                metadata: file.metadata,
                max_age: ONE_YEAR,
            });
        }

        if self.config.auto_index && file.is_dir() {
            let body = self.index_page(request, &file).await.map_err(|e| {
                warn!("Index page for {}{} failed: {}", display_name, file.path, e);
                CdnError::server(format!(
                    "unable to generate index page for {}{}",
                    display_name, file.path
                ))
            })?;

            return Ok(Outcome::Html {
                body,
                max_age: ONE_YEAR,
            });
        }

        Err(CdnError::InvalidUrl {
            url: format!("{}{} is a {}", display_name, file.path, file.file_type()),
        })
    }

    async fn index_page(&self, request: &PackageRequest, dir: &ResolvedFile) -> CdnResult<String> {
        let info = self
            .packages
            .get_package_info(&request.package_name)
            .await?
            .ok_or_else(|| CdnError::PackageNotFound {
                name: format!("\"{}\"", request.package_name),
            })?;

        let entries = list_directory(&dir.absolute).await?;
        debug!("Listing {} entries of {}", entries.len(), dir.absolute.display());

        let dir_path = if dir.path.ends_with('/') {
            dir.path.clone()
        } else {
            format!("{}/", dir.path)
        };

        let versions = info
            .versions
            .as_ref()
            .map(|versions| versions.keys().map(String::as_str).collect())
            .unwrap_or_default();

        Ok(IndexPage {
            package_name: &request.package_name,
            version: &request.version,
            versions,
            dir: &dir_path,
            entries: &entries,
        }
        .render())
    }
}

#[cfg(test)]
mod tests;

//! HTTP client for the upstream npm registry

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::debug;

use npmcdn_core::error::CdnError;
use crate::api::RegistryPackageInfo;
use crate::RegistryResult;

/// Default upstream registry
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Characters `encodeURIComponent` leaves alone
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A tarball response body, streamed as it arrives
pub type TarballStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// HTTP client for npm registry reads
#[derive(Debug, Clone)]
pub struct RegistryClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    /// Base registry URL, without trailing slash
    base_url: String,
}

impl RegistryClient {
    /// Create a client for the default registry
    pub fn new() -> RegistryResult<Self> {
        Self::with_base_url(DEFAULT_REGISTRY_URL)
    }

    /// Create a client for a specific registry
    pub fn with_base_url(base_url: &str) -> RegistryResult<Self> {
        let client = ClientBuilder::new()
            // Connection pooling configuration
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .user_agent(concat!("npmcdn/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CdnError::network(format!("Failed to create HTTP client: {}", e), e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base registry URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a package document. A 404 from the registry is `Ok(None)`.
    pub async fn fetch_package_info(
        &self,
        package_name: &str,
    ) -> RegistryResult<Option<RegistryPackageInfo>> {
        let url = format!("{}/{}", self.base_url, encode_package_name(package_name));
        debug!("Fetching registry info from {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| CdnError::network(format!("Failed to fetch {}: {}", url, e), e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let info = response.json::<RegistryPackageInfo>().await.map_err(|e| {
                    CdnError::network(format!("Failed to parse registry info for {}: {}", package_name, e), e)
                })?;
                Ok(Some(info))
            }
            status => Err(CdnError::Network {
                message: format!("Registry returned status {} for {}", status, package_name),
                source: None,
            }),
        }
    }

    /// Start downloading a tarball and return its body as a byte stream
    pub async fn download_tarball(&self, tarball_url: &str) -> RegistryResult<TarballStream> {
        debug!("Downloading tarball {}", tarball_url);

        let response = self
            .client
            .get(tarball_url)
            .send()
            .await
            .map_err(|e| CdnError::network(format!("Failed to download tarball: {}", e), e))?;

        if !response.status().is_success() {
            return Err(CdnError::Network {
                message: format!("Failed to download tarball {}: {}", tarball_url, response.status()),
                source: None,
            });
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(Box::pin(stream))
    }
}

/// Encode a package name for a registry URL. For scoped packages only the
/// part after the leading `@` is encoded: `@scope/name` becomes `@scope%2Fname`.
pub fn encode_package_name(name: &str) -> String {
    match name.strip_prefix('@') {
        Some(scoped) => format!("@{}", utf8_percent_encode(scoped, COMPONENT)),
        None => utf8_percent_encode(name, COMPONENT).to_string(),
    }
}

#[cfg(test)]
mod tests;

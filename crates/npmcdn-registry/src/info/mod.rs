//! Cached package info lookups

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::api::RegistryPackageInfo;
use crate::cache::{CacheBackend, CachedInfo};
use crate::client::RegistryClient;
use crate::RegistryResult;

/// How long a package document is reused
pub const POSITIVE_TTL: Duration = Duration::from_secs(60);

/// How long a registry 404 is remembered
pub const NEGATIVE_TTL: Duration = Duration::from_secs(POSITIVE_TTL.as_secs() * 5);

/// Registry lookups backed by a TTL cache
#[derive(Debug, Clone)]
pub struct PackageInfoService {
    client: RegistryClient,
    cache: Arc<dyn CacheBackend>,
}

impl PackageInfoService {
    pub fn new(client: RegistryClient, cache: Arc<dyn CacheBackend>) -> Self {
        Self { client, cache }
    }

    fn cache_key(&self, package_name: &str) -> String {
        format!("{}/{}", self.client.base_url(), package_name)
    }

    /// Look up a package document. `Ok(None)` means the registry does not
    /// know the package. Errors are never cached.
    pub async fn get_package_info(
        &self,
        package_name: &str,
    ) -> RegistryResult<Option<Arc<RegistryPackageInfo>>> {
        let key = self.cache_key(package_name);

        match self.cache.get(&key).await {
            Ok(Some(CachedInfo::Found(info))) => return Ok(Some(info)),
            Ok(Some(CachedInfo::NotFound)) => return Ok(None),
            Ok(None) => {}
            Err(e) => warn!("Registry cache read failed for {}: {}", package_name, e),
        }

        debug!("Registry cache miss for {}", package_name);

        match self.client.fetch_package_info(package_name).await {
            Ok(Some(info)) => {
                let info = Arc::new(info);
                self.store(&key, CachedInfo::Found(Arc::clone(&info)), POSITIVE_TTL)
                    .await;
                Ok(Some(info))
            }
            Ok(None) => {
                self.store(&key, CachedInfo::NotFound, NEGATIVE_TTL).await;
                Ok(None)
            }
            Err(e) => {
                if let Err(delete_error) = self.cache.delete(&key).await {
                    warn!("Failed to purge registry cache entry for {}: {}", package_name, delete_error);
                }
                Err(e)
            }
        }
    }

    async fn store(&self, key: &str, value: CachedInfo, ttl: Duration) {
        if let Err(e) = self.cache.set(key, value, ttl).await {
            warn!("Failed to cache registry info under {}: {}", key, e);
        }
    }
}

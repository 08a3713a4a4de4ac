//! Registry info caching with TTL support
//!
//! Values are either a package document or the "not found" sentinel, so
//! that 404s from the registry can be cached as well. Backends namespace
//! every key with [`KEY_PREFIX`] and enforce expiry on read.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::RegistryPackageInfo;
use crate::RegistryResult;

mod disk;
mod memory;

pub use disk::DiskBackend;
pub use memory::{MemoryBackend, DEFAULT_CAPACITY};

/// Prefix applied to every key stored by a backend
pub const KEY_PREFIX: &str = "registry:";

/// A cached registry lookup result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "info", rename_all = "camelCase")]
pub enum CachedInfo {
    /// The registry returned a package document
    Found(Arc<RegistryPackageInfo>),
    /// The registry answered 404
    NotFound,
}

/// Key/value store used in front of the registry
#[async_trait]
pub trait CacheBackend: Send + Sync + Debug {
    /// Get a live value; expired entries are removed and reported as absent
    async fn get(&self, key: &str) -> RegistryResult<Option<CachedInfo>>;

    /// Store a value that expires after `ttl`
    async fn set(&self, key: &str, value: CachedInfo, ttl: Duration) -> RegistryResult<()>;

    /// Remove a value
    async fn delete(&self, key: &str) -> RegistryResult<()>;
}

pub(crate) fn namespaced(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

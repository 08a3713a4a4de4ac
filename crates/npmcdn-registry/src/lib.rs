//! npm registry access for npmcdn
//!
//! This crate provides the HTTP client for package documents and tarballs,
//! the TTL cache that sits in front of it, and the service that combines
//! the two into a single package info lookup.

pub mod api;
pub mod cache;
pub mod client;
pub mod info;

// Re-export main types
pub use api::{DistInfo, RegistryPackageInfo, VersionConfig};
pub use cache::{CacheBackend, CachedInfo, DiskBackend, MemoryBackend};
pub use client::{encode_package_name, RegistryClient, TarballStream, DEFAULT_REGISTRY_URL};
pub use info::{PackageInfoService, NEGATIVE_TTL, POSITIVE_TTL};

use npmcdn_core::error::CdnError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, CdnError>;

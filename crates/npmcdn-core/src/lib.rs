//! # npmcdn-core
//!
//! Core types and utilities shared across all npmcdn crates.
//!
//! This crate provides:
//! - Package URL parsing (`/@scope/name@version/file?query`)
//! - Version and VersionReq types with npm range semantics
//! - The package manifest type used to pick entry points
//! - CdnError, the error taxonomy of the request pipeline
//! - File helpers (content types, file types, safe in-package paths)
//!
//! ## Architecture
//!
//! - `request`: URL parsing and construction
//! - `types`: Core data types (Version, PackageManifest)
//! - `error`: Error types and result aliases
//! - `utils`: Utility functions and helpers

pub mod error;
pub mod request;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{CdnError, CdnResult};
pub use request::{create_package_url, parse_package_url, PackageRequest, QueryOptions};
pub use types::{PackageManifest, Version, VersionReq};

//! Version specifier resolution for npmcdn
//!
//! Turns the version part of a package URL (an exact version, a dist-tag,
//! or an npm range) into either a concrete version to serve or a version
//! to redirect to.

pub mod resolve;
pub mod semver;

// Re-export main types
pub use resolve::{resolve_version, Resolution};
pub use semver::{max_satisfying, VersionSelector};

use npmcdn_core::error::CdnError;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, CdnError>;

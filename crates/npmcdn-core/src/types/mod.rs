//! Core data types for npmcdn.
//!
//! - Version types with npm range semantics
//! - The package manifest (`package.json`)

pub mod package;
pub mod version;

// Re-export all public types
pub use package::PackageManifest;
pub use version::{Comparator, ComparatorSet, Op, PartialVersion, Version, VersionError, VersionReq};

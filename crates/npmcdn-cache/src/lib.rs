//! Local package cache for npmcdn
//!
//! Packages are unpacked once into `<cache_dir>/<name>@<version>` and then
//! served straight from disk. This crate owns everything that touches that
//! directory: fetching and extracting tarballs, resolving request paths to
//! files, and describing files and directories for JSON and HTML output.

pub mod fetch;
pub mod listing;
pub mod metadata;
pub mod resolve;
pub mod tarball;

// Re-export main types
pub use fetch::{PackageFetcher, MARKER_FILE};
pub use listing::{list_directory, DirectoryEntry};
pub use metadata::{MetadataBuilder, MetadataNode};
pub use resolve::{FileResolver, ResolvedFile};
pub use tarball::{extract_stream, extract_tarball};

use npmcdn_core::error::CdnError;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CdnError>;

//! Configuration for the npmcdn server
//!
//! Settings come from built-in defaults, an optional `npmcdn.toml`,
//! `NPMCDN_*` environment variables and command line flags, in increasing
//! order of precedence.

pub mod merge;
pub mod toml;

// Re-export main types
pub use merge::{CliOverrides, ConfigLayering, ConfigLoader, ConfigSource, CONFIG_FILE_NAME};
pub use toml::{RegistryCacheKind, ServerConfig};

use npmcdn_core::error::CdnError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, CdnError>;

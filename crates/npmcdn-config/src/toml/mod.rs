//! npmcdn.toml parsing, serialization and validation

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use npmcdn_core::error::CdnError;
use crate::ConfigResult;

/// Default upstream registry
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Default listen address
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Default number of entries in the in-memory registry cache
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Registry to read package documents and tarballs from
    pub registry_url: String,

    /// `max-age` (seconds) of version redirects
    pub redirect_ttl: u64,

    /// Render HTML listings for directory URLs
    pub auto_index: bool,

    /// How deep `?json` trees descend; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_depth: Option<usize>,

    /// Packages that are never served
    pub blacklist: Vec<String>,

    /// Address the HTTP server binds to
    pub listen: SocketAddr,

    /// Where unpacked packages live
    pub cache_dir: PathBuf,

    /// Registry info cache backend
    pub registry_cache: RegistryCacheKind,
}

/// Registry info cache backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegistryCacheKind {
    /// Bounded in-process cache
    Memory {
        #[serde(default = "default_capacity")]
        capacity: usize,
    },
    /// JSON files in a directory, shareable between processes
    Disk { path: PathBuf },
}

fn default_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl Default for RegistryCacheKind {
    fn default() -> Self {
        RegistryCacheKind::Memory {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            redirect_ttl: 0,
            auto_index: true,
            maximum_depth: None,
            blacklist: Vec::new(),
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            cache_dir: std::env::temp_dir().join("npmcdn"),
            registry_cache: RegistryCacheKind::default(),
        }
    }
}

impl ServerConfig {
    /// Whether requests for `package_name` are refused
    pub fn is_blacklisted(&self, package_name: &str) -> bool {
        self.blacklist.iter().any(|name| name == package_name)
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> CdnError {
    CdnError::ConfigValidation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Parse TOML string to a validated configuration
pub fn parse_config(content: &str) -> ConfigResult<ServerConfig> {
    let config: ServerConfig =
        toml::from_str(content).map_err(|e| invalid("config", format!("TOML parsing error: {}", e)))?;

    validate_config(&config)?;

    Ok(config)
}

/// Serialize configuration to a TOML string
pub fn serialize_config(config: &ServerConfig) -> ConfigResult<String> {
    toml::to_string_pretty(config)
        .map_err(|e| invalid("config", format!("TOML serialization error: {}", e)))
}

/// Validate configuration values
pub fn validate_config(config: &ServerConfig) -> ConfigResult<()> {
    let registry = url::Url::parse(&config.registry_url)
        .map_err(|e| invalid("registry_url", format!("'{}' is not a URL: {}", config.registry_url, e)))?;
    if !matches!(registry.scheme(), "http" | "https") {
        return Err(invalid(
            "registry_url",
            format!("'{}' must use http or https", config.registry_url),
        ));
    }

    if config.cache_dir.as_os_str().is_empty() {
        return Err(invalid("cache_dir", "must not be empty"));
    }

    if let Some(name) = config.blacklist.iter().find(|name| name.trim().is_empty()) {
        return Err(invalid("blacklist", format!("entry '{}' is empty", name)));
    }

    match &config.registry_cache {
        RegistryCacheKind::Memory { capacity: 0 } => {
            return Err(invalid("registry_cache.capacity", "must be at least 1"));
        }
        RegistryCacheKind::Disk { path } if path.as_os_str().is_empty() => {
            return Err(invalid("registry_cache.path", "must not be empty"));
        }
        _ => {}
    }

    Ok(())
}

/// Load and parse npmcdn.toml from file path
pub async fn load_from_file(path: &Path) -> ConfigResult<ServerConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CdnError::io(format!("Failed to read {}", path.display()), e))?;

    parse_config(&content).map_err(|e| match e {
        CdnError::ConfigValidation { field, reason } => CdnError::ConfigValidation {
            field,
            reason: format!("in file {}: {}", path.display(), reason),
        },
        other => other,
    })
}

//! Configuration layering, file discovery, and environment overrides

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};

use npmcdn_core::error::CdnError;
use crate::toml::{load_from_file, validate_config, RegistryCacheKind, ServerConfig};
use crate::ConfigResult;

/// File looked up in the working directory and its ancestors
pub const CONFIG_FILE_NAME: &str = "npmcdn.toml";

/// Prefix of recognized environment variables
const ENV_PREFIX: &str = "NPMCDN_";

/// Finds and loads the configuration file
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Where the file layer of the configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// No file; built-in defaults
    Defaults,
    /// Path passed on the command line
    Explicit(Utf8PathBuf),
    /// npmcdn.toml found in the working directory or above
    Discovered(Utf8PathBuf),
}

/// Values given as command line flags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub listen: Option<SocketAddr>,
    pub registry_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
}

/// Applies environment and command line layers over a base configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLayering;

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    /// Loader rooted at the process working directory
    pub fn from_current_dir() -> ConfigResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| CdnError::io("Failed to read working directory".to_string(), e))?;
        let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| CdnError::ConfigValidation {
            field: "cwd".to_string(),
            reason: format!("Invalid working directory path: {}", e),
        })?;
        Ok(Self::new(cwd))
    }

    /// Find npmcdn.toml (walks up directory tree)
    pub fn find_config_file(&self) -> Option<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());

        while let Some(dir) = current {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }
            current = dir.parent();
        }

        None
    }

    /// Load the file layer: the explicit path if given (it must exist),
    /// otherwise a discovered npmcdn.toml, otherwise defaults.
    pub async fn load(&self, explicit: Option<&Utf8Path>) -> ConfigResult<(ServerConfig, ConfigSource)> {
        if let Some(path) = explicit {
            let path = self.cwd.join(path);
            let config = load_from_file(path.as_std_path()).await?;
            return Ok((config, ConfigSource::Explicit(path)));
        }

        match self.find_config_file() {
            Some(path) => {
                let config = load_from_file(path.as_std_path()).await?;
                Ok((config, ConfigSource::Discovered(path)))
            }
            None => Ok((ServerConfig::default(), ConfigSource::Defaults)),
        }
    }
}

fn invalid_env(key: &str, reason: String) -> CdnError {
    CdnError::ConfigValidation {
        field: key.to_string(),
        reason,
    }
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid_env(key, format!("'{}' is not a boolean", other))),
    }
}

impl ConfigLayering {
    /// Merge the layers: base (defaults or file) ← environment ← command line
    pub fn merge_configs(
        base: ServerConfig,
        env_overrides: &HashMap<String, String>,
        cli_overrides: &CliOverrides,
    ) -> ConfigResult<ServerConfig> {
        let mut merged = base;

        Self::apply_env_overrides(&mut merged, env_overrides)?;
        Self::apply_cli_overrides(&mut merged, cli_overrides);

        validate_config(&merged)?;
        Ok(merged)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: &mut ServerConfig, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            match key.as_str() {
                "NPMCDN_REGISTRY_URL" => {
                    config.registry_url = value.clone();
                }
                "NPMCDN_REDIRECT_TTL" => {
                    config.redirect_ttl = value
                        .trim()
                        .parse()
                        .map_err(|e| invalid_env(key, format!("Invalid number '{}': {}", value, e)))?;
                }
                "NPMCDN_AUTO_INDEX" => {
                    config.auto_index = parse_bool(key, value)?;
                }
                "NPMCDN_MAXIMUM_DEPTH" => {
                    config.maximum_depth = match value.trim() {
                        "" | "none" | "unlimited" => None,
                        depth => Some(
                            depth
                                .parse()
                                .map_err(|e| invalid_env(key, format!("Invalid depth '{}': {}", value, e)))?,
                        ),
                    };
                }
                "NPMCDN_BLACKLIST" => {
                    config.blacklist = value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "NPMCDN_LISTEN" => {
                    config.listen = value
                        .trim()
                        .parse()
                        .map_err(|e| invalid_env(key, format!("Invalid address '{}': {}", value, e)))?;
                }
                "NPMCDN_CACHE_DIR" => {
                    config.cache_dir = PathBuf::from(value);
                }
                "NPMCDN_REGISTRY_CACHE_DIR" => {
                    config.registry_cache = RegistryCacheKind::Disk {
                        path: PathBuf::from(value),
                    };
                }
                _ => {
                    // Unknown environment variable, ignore
                }
            }
        }

        Ok(())
    }

    /// Apply CLI flag overrides
    fn apply_cli_overrides(config: &mut ServerConfig, overrides: &CliOverrides) {
        if let Some(listen) = overrides.listen {
            config.listen = listen;
        }
        if let Some(registry_url) = &overrides.registry_url {
            config.registry_url = registry_url.clone();
        }
        if let Some(cache_dir) = &overrides.cache_dir {
            config.cache_dir = cache_dir.clone();
        }
    }

    /// Collect environment variable overrides from the process environment
    pub fn collect_env_overrides() -> HashMap<String, String> {
        Self::collect_env_overrides_from(std::env::vars())
    }

    /// Keep the `NPMCDN_*` variables out of `vars`
    pub fn collect_env_overrides_from<I>(vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect()
    }
}

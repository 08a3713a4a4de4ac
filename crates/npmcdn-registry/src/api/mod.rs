//! npm registry API response types

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Package document returned by `GET <registry>/<name>`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegistryPackageInfo {
    /// Package name
    pub name: String,
    /// Package description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Named aliases such as "latest"
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
    /// All published versions; absent for unpublished packages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<HashMap<String, VersionConfig>>,
}

/// The subset of a version's manifest needed to fetch and serve it
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VersionConfig {
    /// Version string
    #[serde(default)]
    pub version: String,
    /// Distribution information
    pub dist: DistInfo,
    /// Main entry point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<Value>,
    /// Entry point declared for CDNs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpkg: Option<Value>,
    /// Browser entry point (string) or replacement map (object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<Value>,
}

/// Distribution information for package tarball
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DistInfo {
    /// Tarball download URL
    pub tarball: String,
}

impl RegistryPackageInfo {
    /// Look up an exact version
    pub fn version(&self, version: &str) -> Option<&VersionConfig> {
        self.versions.as_ref()?.get(version)
    }

    /// Version a dist-tag points at
    pub fn tag(&self, tag: &str) -> Option<&str> {
        self.dist_tags.get(tag).map(String::as_str)
    }
}

impl VersionConfig {
    /// The `browser` field, only when it is a plain string
    pub fn browser_entry(&self) -> Option<&str> {
        self.browser.as_ref().and_then(Value::as_str)
    }
}

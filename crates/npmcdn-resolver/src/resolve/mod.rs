//! Version specifier resolution against a registry document

use tracing::debug;

use npmcdn_core::error::CdnError;
use npmcdn_registry::api::{RegistryPackageInfo, VersionConfig};

use crate::semver::max_satisfying;
use crate::ResolverResult;

/// What a version specifier resolves to
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The specifier is a published version; serve it
    Exact(VersionConfig),
    /// A dist-tag or range; redirect to this concrete version
    Redirect(String),
    /// Nothing published matches
    NotFound,
}

/// Resolve `spec` for a package. An exact version wins over a dist-tag of
/// the same name, and a dist-tag wins over range matching.
pub fn resolve_version(info: &RegistryPackageInfo, spec: &str) -> ResolverResult<Resolution> {
    let versions = info.versions.as_ref().ok_or_else(|| {
        CdnError::server(format!("Unable to retrieve info for package {}", info.name))
    })?;

    if let Some(config) = versions.get(spec) {
        return Ok(Resolution::Exact(config.clone()));
    }

    if let Some(tagged) = info.tag(spec) {
        debug!("Resolved tag {}@{} to {}", info.name, spec, tagged);
        return Ok(Resolution::Redirect(tagged.to_string()));
    }

    match max_satisfying(versions.keys().map(String::as_str), spec) {
        Some(version) => {
            debug!("Resolved range {}@{} to {}", info.name, spec, version);
            Ok(Resolution::Redirect(version))
        }
        None => Ok(Resolution::NotFound),
    }
}

//! Range satisfaction over a package's published versions

use std::collections::BTreeMap;
use std::str::FromStr;

use npmcdn_core::types::{Version, VersionReq};

/// Version selector for finding the best matching version
#[derive(Debug, Clone, Default)]
pub struct VersionSelector {
    /// Parsed versions, ordered, mapped to the string they were published as
    available_versions: BTreeMap<Version, String>,
}

impl VersionSelector {
    /// Create a selector from published version strings. Strings that are
    /// not valid versions are ignored.
    pub fn new<'a, I>(versions: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let available_versions = versions
            .into_iter()
            .filter_map(|raw| Version::from_str(raw).ok().map(|v| (v, raw.to_string())))
            .collect();

        Self { available_versions }
    }

    /// Highest version satisfying the requirement, as published
    pub fn select_best(&self, req: &VersionReq) -> Option<&str> {
        self.available_versions
            .iter()
            .rev() // Start with highest versions
            .find(|(version, _)| req.matches(version))
            .map(|(_, raw)| raw.as_str())
    }
}

/// Highest version in `versions` satisfying `range`. An unparsable range
/// satisfies nothing.
pub fn max_satisfying<'a, I>(versions: I, range: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let req = VersionReq::parse(range).ok()?;
    VersionSelector::new(versions)
        .select_best(&req)
        .map(str::to_string)
}

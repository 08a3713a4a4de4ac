//! Package URL parsing and construction.
//!
//! A package URL looks like `/@scope/name@1.2.3/lib/file.js?main=browser`.
//! Parsing is pure: malformed input yields `None`, never a panic.

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;

static URL_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/((?:@[^/@]+/)?[^/@]+)(?:@([^/]+))?(/.*)?$").expect("valid package URL regex")
});

/// Query keys a package URL may carry
const VALID_QUERY_KEYS: &[&str] = &["main", "json"];

/// Version used when the URL does not name one
pub const DEFAULT_VERSION: &str = "latest";

/// Recognized query options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Manifest field to use as the entry point (`?main=browser`)
    pub main: Option<String>,
    /// Serve the JSON metadata tree instead of the file (`?json`)
    pub json: bool,
}

/// A parsed package URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    /// Raw path, e.g. `/@scope/name@version/path.js`
    pub pathname: String,
    /// Raw query string including the leading `?`, or empty
    pub search: String,
    pub query: QueryOptions,
    /// `@scope/name` or `name`
    pub package_name: String,
    /// Version specifier: exact version, dist-tag, or range
    pub version: String,
    /// In-package path starting with `/`
    pub filename: Option<String>,
}

impl PackageRequest {
    /// `name@version`, as used in messages and cache directory names
    pub fn display_name(&self) -> String {
        format!("{}@{}", self.package_name, self.version)
    }

    /// Whether the request path ends with a slash
    pub fn has_trailing_slash(&self) -> bool {
        self.pathname.ends_with('/')
    }
}

/// Percent-decode a URL component, rejecting malformed escapes
fn decode_param(param: &str) -> Option<String> {
    let bytes = param.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(param)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// Whether `segment` can name a single directory under the cache
fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
}

fn parse_query(query: &str) -> Option<QueryOptions> {
    let mut options = QueryOptions::default();

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if !VALID_QUERY_KEYS.contains(&key.as_ref()) {
            return None;
        }

        match key.as_ref() {
            "main" => {
                if options.main.is_none() && !value.is_empty() {
                    options.main = Some(value.into_owned());
                }
            }
            _ => options.json = true,
        }
    }

    Some(options)
}

/// Parse a request URL (path plus optional query) into a `PackageRequest`
pub fn parse_package_url(url: &str) -> Option<PackageRequest> {
    let url = url.split_once('#').map_or(url, |(before, _)| before);

    let (pathname, search) = match url.find('?') {
        Some(index) => (&url[..index], &url[index..]),
        None => (url, ""),
    };

    let query = parse_query(search.trim_start_matches('?'))?;
    let captures = URL_FORMAT.captures(pathname)?;

    let package_name = captures.get(1)?.as_str().to_string();
    if !package_name.split('/').all(is_plain_segment) {
        return None;
    }

    let version = match captures.get(2) {
        Some(raw) => decode_param(raw.as_str())?,
        None => DEFAULT_VERSION.to_string(),
    };
    // Name and version become a directory name, so neither may carry a path
    if !is_plain_segment(&version) {
        return None;
    }
    let filename = match captures.get(3) {
        Some(raw) => Some(decode_param(raw.as_str())?),
        None => None,
    };

    Some(PackageRequest {
        pathname: pathname.to_string(),
        search: search.to_string(),
        query,
        package_name,
        version,
        filename,
    })
}

/// Build a package URL from its parts
pub fn create_package_url(
    package_name: &str,
    version: Option<&str>,
    filename: Option<&str>,
    search: Option<&str>,
) -> String {
    let mut pathname = format!("/{}", package_name);

    if let Some(version) = version {
        pathname.push('@');
        pathname.push_str(version);
    }

    if let Some(filename) = filename {
        pathname.push_str(filename);
    }

    if let Some(search) = search {
        pathname.push_str(search);
    }

    pathname
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn parse_then_create_round_trips(
            scope in prop::option::of("[a-z][a-z0-9-]{0,8}"),
            name in "[a-z][a-z0-9._-]{0,12}",
            version in "[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}",
            filename in prop::option::of("(/[a-zA-Z0-9_-]{1,8}){1,3}(\\.js|\\.json|/)?"),
            search in prop::sample::select(vec!["", "?json", "?main=browser", "?main=module&json"]),
        ) {
            let package_name = match scope {
                Some(scope) => format!("@{}/{}", scope, name),
                None => name,
            };
            let url = create_package_url(&package_name, Some(&version), filename.as_deref(), Some(search));

            let parsed = parse_package_url(&url).unwrap();
            prop_assert_eq!(&parsed.package_name, &package_name);
            prop_assert_eq!(&parsed.version, &version);
            prop_assert_eq!(&parsed.filename, &filename);

            let rebuilt = create_package_url(
                &parsed.package_name,
                Some(&parsed.version),
                parsed.filename.as_deref(),
                Some(&parsed.search),
            );
            prop_assert_eq!(rebuilt, url);
        }
    }
}

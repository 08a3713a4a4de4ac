//! Request path to file resolution, the way `require()` looks files up:
//! `p`, then `p.js`, then `p.json`, optionally falling back to `p/index`.

use std::ffi::OsString;
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};

use npmcdn_core::error::CdnError;
use npmcdn_core::utils::{resolve_in_package, FileType};

use crate::CacheResult;

/// Suffixes tried, in order, for every lookup
pub const RESOLVE_EXTENSIONS: &[&str] = &["", ".js", ".json"];

/// errno for "a path component is not a directory" on Linux and macOS
#[cfg(unix)]
const ENOTDIR: i32 = 20;

/// A file or directory found inside a package
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// Package-relative path with a leading `/`
    pub path: String,
    /// Location on disk
    pub absolute: PathBuf,
    /// Stats of the target (symlinks followed)
    pub metadata: Metadata,
}

impl ResolvedFile {
    pub fn file_type(&self) -> FileType {
        FileType::from_metadata(&self.metadata)
    }

    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.metadata.is_file()
    }
}

/// Resolves request paths inside one unpacked package
#[derive(Debug, Clone)]
pub struct FileResolver {
    root: PathBuf,
}

impl FileResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `filename` (relative to the package root). With `use_index`,
    /// a directory candidate is replaced by its `index` file when one exists.
    /// Paths that leave the package resolve to `None`.
    pub async fn resolve(&self, filename: &str, use_index: bool) -> CacheResult<Option<ResolvedFile>> {
        let Some(base) = resolve_in_package(&self.root, filename) else {
            return Ok(None);
        };

        for extension in RESOLVE_EXTENSIONS {
            let Some(candidate) = self.candidate(&base, extension) else {
                continue;
            };
            let Some(metadata) = stat(&candidate).await? else {
                continue;
            };

            if use_index && metadata.is_dir() {
                match self.resolve_exact(&candidate.join("index")).await? {
                    Some(index) => return Ok(Some(index)),
                    None => continue,
                }
            }

            return Ok(Some(self.resolved(candidate, metadata)));
        }

        Ok(None)
    }

    /// Lookup without index fallback, so `index/index` is never tried
    async fn resolve_exact(&self, base: &Path) -> CacheResult<Option<ResolvedFile>> {
        for extension in RESOLVE_EXTENSIONS {
            let Some(candidate) = self.candidate(base, extension) else {
                continue;
            };
            if let Some(metadata) = stat(&candidate).await? {
                return Ok(Some(self.resolved(candidate, metadata)));
            }
        }

        Ok(None)
    }

    fn candidate(&self, base: &Path, extension: &str) -> Option<PathBuf> {
        if extension.is_empty() {
            return Some(base.to_path_buf());
        }
        // `<root>.js` would sit outside the package
        if base == self.root {
            return None;
        }

        let mut name = OsString::from(base.as_os_str());
        name.push(extension);
        Some(PathBuf::from(name))
    }

    fn resolved(&self, absolute: PathBuf, metadata: Metadata) -> ResolvedFile {
        ResolvedFile {
            path: package_path(&self.root, &absolute),
            absolute,
            metadata,
        }
    }
}

/// `/lib/index.js` style path of `absolute` below `root`
pub fn package_path(root: &Path, absolute: &Path) -> String {
    let relative = absolute.strip_prefix(root).unwrap_or(absolute);
    let mut path = String::new();

    for component in relative.components() {
        if let Component::Normal(name) = component {
            path.push('/');
            path.push_str(&name.to_string_lossy());
        }
    }

    if path.is_empty() {
        path.push('/');
    }
    path
}

fn is_missing(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::NotFound {
        return true;
    }

    #[cfg(unix)]
    {
        error.raw_os_error() == Some(ENOTDIR)
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// `stat` that reports missing paths as `None`
async fn stat(path: &Path) -> CacheResult<Option<Metadata>> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if is_missing(&e) => Ok(None),
        Err(e) => Err(CdnError::io(format!("Failed to stat {}", path.display()), e)),
    }
}

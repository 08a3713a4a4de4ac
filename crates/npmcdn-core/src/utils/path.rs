//! Path utilities for safe file system operations.
//!
//! Request filenames come straight from the URL, so every in-package path is
//! normalized and checked before it is joined onto a package directory.

use std::path::{Component, Path, PathBuf};

/// Normalize a path by resolving . and .. components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if components.is_empty() {
                    // This would escape the base directory
                    components.push(component);
                } else {
                    components.pop();
                }
            }
            other => {
                components.push(other);
            }
        }
    }

    components.iter().collect()
}

/// Check if a path is safe (relative, never climbs above its base)
pub fn is_safe_path(path: &Path) -> bool {
    if path.is_absolute() {
        return false;
    }

    let mut depth = 0i32;

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::Normal(_) => {
                depth += 1;
            }
            _ => {
                return false;
            }
        }
    }

    true
}

/// Join an in-package path (e.g. `/lib/index.js` or `./dist/main`) onto a
/// package root. Returns `None` when the path would leave the root.
///
/// A trailing slash is dropped; `/` alone resolves to the root itself.
pub fn resolve_in_package(root: &Path, filename: &str) -> Option<PathBuf> {
    let relative = Path::new(filename.trim_start_matches('/'));

    if !is_safe_path(relative) {
        return None;
    }

    Some(root.join(normalize_path(relative)))
}

//! Tarball extraction functionality
//!
//! Entries lose their first path segment (`package/`, or whatever prefix the
//! publisher used), so the package root lands directly in the destination.
//! Paths that would escape the destination are rejected.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use npmcdn_core::error::CdnError;
use crate::CacheResult;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Bits OR-ed into every directory mode
const DIR_MODE: u32 = 0o755;
/// Bits OR-ed into every file mode
const FILE_MODE: u32 = 0o444;

fn extraction_error(message: impl Into<String>) -> CdnError {
    CdnError::Extraction {
        message: message.into(),
    }
}

fn io_error(context: &str, error: io::Error) -> CdnError {
    extraction_error(format!("{}: {}", context, error))
}

/// Extract a tarball, gzipped or not, to a destination directory
pub fn extract_tarball<R: Read>(reader: R, dest_dir: &Path) -> CacheResult<()> {
    let reader = maybe_gunzip(reader).map_err(|e| io_error("failed to read tarball", e))?;
    let mut archive = Archive::new(reader);

    fs::create_dir_all(dest_dir).map_err(|e| {
        CdnError::io(format!("Failed to create {}", dest_dir.display()), e)
    })?;

    let entries = archive
        .entries()
        .map_err(|e| io_error("failed to read tarball", e))?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| io_error("corrupt tarball entry", e))?;

        let raw_path = entry
            .path()
            .map_err(|e| io_error("invalid entry path", e))?
            .to_string_lossy()
            .into_owned();

        let relative = strip_first_segment(&raw_path);
        if relative.is_empty() {
            continue;
        }
        let safe_path = validate_extract_path(relative, dest_dir)?;
        if safe_path == dest_dir {
            continue;
        }

        let entry_type = entry.header().entry_type();
        let mode = entry.header().mode().unwrap_or(0) & 0o777;

        match entry_type {
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                extract_regular_file(&mut entry, &safe_path)?;
                set_mode(&safe_path, mode | FILE_MODE)?;
            }
            tar::EntryType::Directory => {
                fs::create_dir_all(&safe_path).map_err(|e| {
                    CdnError::io(format!("Failed to create {}", safe_path.display()), e)
                })?;
                set_mode(&safe_path, mode | DIR_MODE)?;
            }
            tar::EntryType::Symlink | tar::EntryType::Link => {
                debug!("Skipping link entry {}", raw_path);
            }
            _ => {
                // Skip other entry types (char devices, block devices, etc.)
                continue;
            }
        }
    }

    Ok(())
}

/// Decompress only when the stream starts with the gzip magic bytes
fn maybe_gunzip<'a, R: Read + 'a>(mut reader: R) -> io::Result<Box<dyn Read + 'a>> {
    let mut head = [0u8; 2];
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let rejoined = Cursor::new(head[..filled].to_vec()).chain(reader);
    if filled == head.len() && head == GZIP_MAGIC {
        Ok(Box::new(GzDecoder::new(rejoined)))
    } else {
        Ok(Box::new(rejoined))
    }
}

/// `package/lib/index.js` becomes `lib/index.js`; names without a slash are kept
fn strip_first_segment(name: &str) -> &str {
    match name.split_once('/') {
        Some((_, rest)) => rest,
        None => name,
    }
}

/// Validate extraction path to prevent directory traversal
fn validate_extract_path(relative: &str, dest_dir: &Path) -> CacheResult<PathBuf> {
    let mut safe_path = dest_dir.to_path_buf();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => safe_path.push(name),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(extraction_error(format!("directory traversal: {}", relative)));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(extraction_error(format!("absolute path: {}", relative)));
            }
        }
    }

    Ok(safe_path)
}

/// Extract a regular file from tar entry
fn extract_regular_file<R: Read>(entry: &mut tar::Entry<R>, dest_path: &Path) -> CacheResult<()> {
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CdnError::io(format!("Failed to create {}", parent.display()), e))?;
    }

    // Stream extraction without loading into memory
    let mut file = fs::File::create(dest_path)
        .map_err(|e| CdnError::io(format!("Failed to create {}", dest_path.display()), e))?;

    io::copy(entry, &mut file).map_err(|e| io_error("failed to write entry", e))?;

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> CacheResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| CdnError::io(format!("Failed to set permissions on {}", path.display()), e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> CacheResult<()> {
    Ok(())
}

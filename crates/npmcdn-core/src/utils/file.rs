//! File display helpers: content types, entry types, timestamps.

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::time::SystemTime;

/// Files served as `text/plain` regardless of extension
static TEXT_FILES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/?(LICENSE|README|CHANGES|AUTHORS|Makefile|\.[a-z]*rc|\.git[a-z]*|\.[a-z]*ignore)$")
        .expect("valid text file regex")
});

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    let content_type = match extension {
        "js" | "mjs" | "cjs" => "application/javascript",
        "json" | "map" => "application/json",
        "ts" | "mts" | "cts" | "tsx" => "application/typescript",
        "jsx" => "text/jsx",
        "css" => "text/css",
        "html" | "htm" => "text/html",
        "md" | "markdown" => "text/markdown",
        "txt" | "text" => "text/plain",
        "xml" => "application/xml",
        "yml" | "yaml" => "text/yaml",
        "csv" => "text/csv",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "sh" => "application/x-sh",
        _ => return None,
    };
    Some(content_type)
}

/// Content type for a path, derived from its file name
pub fn get_content_type(path: &str) -> &'static str {
    if TEXT_FILES.is_match(path) {
        return "text/plain";
    }

    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name
        .rsplit_once('.')
        .and_then(|(_, extension)| content_type_for_extension(&extension.to_ascii_lowercase()))
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileType {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharacterDevice,
    Socket,
    Fifo,
    Unknown,
}

impl FileType {
    /// Classify an entry from its (l)stat metadata
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let file_type = metadata.file_type();

        if file_type.is_file() {
            return FileType::File;
        }
        if file_type.is_dir() {
            return FileType::Directory;
        }
        if file_type.is_symlink() {
            return FileType::Symlink;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;

            if file_type.is_block_device() {
                return FileType::BlockDevice;
            }
            if file_type.is_char_device() {
                return FileType::CharacterDevice;
            }
            if file_type.is_socket() {
                return FileType::Socket;
            }
            if file_type.is_fifo() {
                return FileType::Fifo;
            }
        }

        FileType::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::File => "file",
            FileType::Directory => "directory",
            FileType::Symlink => "symlink",
            FileType::BlockDevice => "blockDevice",
            FileType::CharacterDevice => "characterDevice",
            FileType::Socket => "socket",
            FileType::Fifo => "fifo",
            FileType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ISO-8601 timestamp with millisecond precision, e.g. `2017-01-01T00:00:00.000Z`
pub fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

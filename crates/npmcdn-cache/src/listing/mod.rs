//! Directory entries for index pages

use std::fs::Metadata;
use std::path::Path;
use std::time::SystemTime;

use futures::future::join_all;

use npmcdn_core::error::CdnError;
use npmcdn_core::utils::FileType;

use crate::CacheResult;

/// One row of a directory listing
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    /// `lstat` result
    pub metadata: Metadata,
}

impl DirectoryEntry {
    pub fn file_type(&self) -> FileType {
        FileType::from_metadata(&self.metadata)
    }

    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }

    pub fn size(&self) -> u64 {
        self.metadata.len()
    }

    pub fn modified(&self) -> SystemTime {
        self.metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

/// List a directory, stat'ing entries concurrently. Entries are sorted by name.
pub async fn list_directory(dir: &Path) -> CacheResult<Vec<DirectoryEntry>> {
    let read_error = |e: std::io::Error| CdnError::io(format!("Failed to read {}", dir.display()), e);

    let mut read_dir = tokio::fs::read_dir(dir).await.map_err(read_error)?;
    let mut names = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(read_error)? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let stats = join_all(names.iter().map(|name| tokio::fs::symlink_metadata(dir.join(name)))).await;

    names
        .into_iter()
        .zip(stats)
        .map(|(name, stat)| {
            stat.map(|metadata| DirectoryEntry { name, metadata })
                .map_err(read_error)
        })
        .collect()
}

//! JSON metadata trees for files and directories inside a package

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;

use npmcdn_core::error::CdnError;
use npmcdn_core::utils::{format_time, get_content_type, FileType};

use crate::CacheResult;

/// Description of one file or directory
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataNode {
    pub path: String,
    pub last_modified: String,
    pub content_type: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: FileType,
    /// Directory children; absent for files and at the depth limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<MetadataNode>>,
}

/// Builds metadata trees below a package root, descending at most
/// `maximum_depth` levels (`None` for no limit).
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    root: PathBuf,
    maximum_depth: Option<usize>,
}

impl MetadataBuilder {
    pub fn new(root: impl Into<PathBuf>, maximum_depth: Option<usize>) -> Self {
        Self {
            root: root.into(),
            maximum_depth,
        }
    }

    /// Describe the entry at package path `path` whose stats are already known
    pub async fn build(&self, path: &str, metadata: &Metadata) -> CacheResult<MetadataNode> {
        self.node(path.to_string(), metadata.clone(), self.maximum_depth)
            .await
    }

    fn node(
        &self,
        path: String,
        metadata: Metadata,
        depth: Option<usize>,
    ) -> BoxFuture<'_, CacheResult<MetadataNode>> {
        async move {
            let mut node = MetadataNode {
                last_modified: format_time(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
                content_type: get_content_type(&path).to_string(),
                size: metadata.len(),
                file_type: FileType::from_metadata(&metadata),
                files: None,
                path,
            };

            if !metadata.is_dir() || depth == Some(0) {
                return Ok(node);
            }

            let child_depth = depth.map(|d| d - 1);
            let entries = self.entries(&node.path).await?;
            let children = join_all(
                entries
                    .into_iter()
                    .map(|(child_path, child_metadata)| self.node(child_path, child_metadata, child_depth)),
            )
            .await
            .into_iter()
            .collect::<CacheResult<Vec<_>>>()?;

            node.files = Some(children);
            Ok(node)
        }
        .boxed()
    }

    /// Children of a directory with their `lstat` results, in listing order
    async fn entries(&self, path: &str) -> CacheResult<Vec<(String, Metadata)>> {
        let dir = self.absolute(path);
        let mut read_dir = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| CdnError::io(format!("Failed to read {}", dir.display()), e))?;

        let mut names = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| CdnError::io(format!("Failed to read {}", dir.display()), e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }

        let stats = join_all(names.iter().map(|name| tokio::fs::symlink_metadata(dir.join(name)))).await;

        names
            .into_iter()
            .zip(stats)
            .map(|(name, stat)| {
                let child_path = join_package_path(path, &name);
                stat.map(|metadata| (child_path, metadata))
                    .map_err(|e| CdnError::io(format!("Failed to stat {}/{}", dir.display(), name), e))
            })
            .collect()
    }

    fn absolute(&self, path: &str) -> PathBuf {
        self.root.join(Path::new(path.trim_start_matches('/')))
    }
}

fn join_package_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

//! On-disk cache backend, shared by every process pointed at the same directory

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use npmcdn_core::error::CdnError;
use npmcdn_core::utils::blake3_hash;
use super::{namespaced, CacheBackend, CachedInfo};
use crate::RegistryResult;

/// Stored form of one entry
#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    key: String,
    /// Milliseconds since the Unix epoch
    expires_at: u64,
    value: CachedInfo,
}

/// One JSON file per key, named after the blake3 hash of the namespaced key
#[derive(Debug)]
pub struct DiskBackend {
    root: PathBuf,
    temp_counter: AtomicU64,
}

impl DiskBackend {
    /// Open (and create if needed) a cache directory
    pub async fn open(root: impl Into<PathBuf>) -> RegistryResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            CdnError::io(format!("Failed to create cache directory {}", root.display()), e)
        })?;

        Ok(Self {
            root,
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, namespaced_key: &str) -> PathBuf {
        self.root
            .join(format!("{}.json", blake3_hash(namespaced_key.as_bytes())))
    }

    async fn remove_file(path: &Path) -> RegistryResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CdnError::io(
                format!("Failed to remove cache entry {}", path.display()),
                e,
            )),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl CacheBackend for DiskBackend {
    async fn get(&self, key: &str) -> RegistryResult<Option<CachedInfo>> {
        let key = namespaced(key);
        let path = self.entry_path(&key);

        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CdnError::io(
                    format!("Failed to read cache entry {}", path.display()),
                    e,
                ))
            }
        };

        let entry: DiskEntry = match serde_json::from_slice(&contents) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Discarding unreadable cache entry {}: {}", path.display(), e);
                Self::remove_file(&path).await?;
                return Ok(None);
            }
        };

        if entry.key != key || now_millis() >= entry.expires_at {
            Self::remove_file(&path).await?;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: CachedInfo, ttl: Duration) -> RegistryResult<()> {
        let key = namespaced(key);
        let path = self.entry_path(&key);
        let entry = DiskEntry {
            key,
            expires_at: now_millis().saturating_add(ttl.as_millis() as u64),
            value,
        };

        let bytes = serde_json::to_vec(&entry).map_err(|e| CdnError::JsonParse {
            message: format!("Failed to serialize cache entry: {}", e),
        })?;

        // Write then rename so readers never see a partial file
        let temp_path = path.with_extension(format!(
            "tmp.{}.{}",
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&temp_path, &bytes).await.map_err(|e| {
            CdnError::io(format!("Failed to write cache entry {}", temp_path.display()), e)
        })?;
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(CdnError::io(
                format!("Failed to store cache entry {}", path.display()),
                e,
            ));
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> RegistryResult<()> {
        Self::remove_file(&self.entry_path(&namespaced(key))).await
    }
}

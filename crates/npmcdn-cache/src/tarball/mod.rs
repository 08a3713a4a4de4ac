//! Tarball extraction
//!
//! Registry tarballs are unpacked while they download: the response body is
//! bridged into a blocking reader and fed through gzip and tar decoding on
//! the blocking thread pool.

use std::io;
use std::path::PathBuf;

use bytes::Bytes;
use futures::Stream;
use tokio_util::io::{StreamReader, SyncIoBridge};

use npmcdn_core::error::CdnError;
use crate::CacheResult;

pub mod extract;

// Re-export main functions
pub use extract::extract_tarball;

/// Extract a tarball body into `dest_dir` as it streams in
pub async fn extract_stream<S>(stream: S, dest_dir: PathBuf) -> CacheResult<()>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    let reader = SyncIoBridge::new(StreamReader::new(stream));

    tokio::task::spawn_blocking(move || extract_tarball(reader, &dest_dir))
        .await
        .map_err(|e| CdnError::Extraction {
            message: format!("extraction task failed: {}", e),
        })?
}

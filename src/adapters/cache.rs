//! Content-addressed GIF cache on the local filesystem.
//!
//! Entries are named `<sha256(url) as hex>.gif` inside the cache directory.
//! Writers stage next to the final path and rename into place, so readers
//! only ever see complete files.

use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

pub const CACHE_EXTENSION: &str = "gif";

#[derive(Clone, Debug)]
pub struct FsCache {
    dir: PathBuf,
}

impl FsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the cache directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Hex-encoded SHA-256 of the normalized source URL.
    pub fn key_for(&self, normalized_url: &str) -> String {
        hex::encode(Sha256::digest(normalized_url.as_bytes()))
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, CACHE_EXTENSION))
    }

    pub async fn exists(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.path(key)).await.unwrap_or(false)
    }
}

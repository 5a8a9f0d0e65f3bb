//! Local filesystem store.
//!
//! Objects live directly under the store root at their key path. Writes go
//! to a `.staging/` sibling first and are renamed into place, so a key is
//! either fully readable or absent.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

use crate::key::clean_key;
use crate::{BlobReader, BlobStat, BlobStore, PutReceipt, StorageError};

const STAGING_DIR: &str = ".staging";

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    public_base: String,
}

impl LocalStore {
    /// Create a store rooted at `root`, minting URLs under `public_base`
    /// (e.g. `http://localhost:8080/v1/files`).
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(root.join(STAGING_DIR)).map_err(StorageError::unavailable)?;

        Ok(Self {
            root,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// The store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(clean_key(key)?))
    }

    fn staging_path(&self) -> PathBuf {
        self.root
            .join(STAGING_DIR)
            .join(Uuid::new_v4().to_string())
    }

    async fn publish(&self, staged: &Path, key: &str) -> Result<(), StorageError> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(StorageError::unavailable)?;
        }
        // Same filesystem as the staging dir, so this rename is atomic.
        fs::rename(staged, &dest)
            .await
            .map_err(StorageError::unavailable)
    }

    async fn open_file(&self, key: &str) -> Result<fs::File, StorageError> {
        let path = self.object_path(key)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::unavailable(e)),
        }
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<PutReceipt, StorageError> {
        clean_key(key)?;
        let staged = self.staging_path();
        fs::write(&staged, data)
            .await
            .map_err(StorageError::unavailable)?;
        self.publish(&staged, key).await?;

        Ok(PutReceipt {
            url: self.url_for(key),
            size: data.len() as u64,
        })
    }

    async fn put_stream(
        &self,
        key: &str,
        mut reader: BlobReader,
    ) -> Result<PutReceipt, StorageError> {
        clean_key(key)?;
        let staged = self.staging_path();
        let mut file = fs::File::create(&staged)
            .await
            .map_err(StorageError::unavailable)?;

        let size = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(StorageError::unavailable)?;
        file.flush().await.map_err(StorageError::unavailable)?;
        drop(file);

        self.publish(&staged, key).await?;

        Ok(PutReceipt {
            url: self.url_for(key),
            size,
        })
    }

    async fn open(&self, key: &str) -> Result<BlobReader, StorageError> {
        let file = self.open_file(key).await?;
        Ok(Box::pin(file))
    }

    async fn open_range(
        &self,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<BlobReader, StorageError> {
        let mut file = self.open_file(key).await?;
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(StorageError::unavailable)?;
        let len = end.saturating_sub(start) + 1;
        Ok(Box::pin(file.take(len)))
    }

    async fn stat(&self, key: &str) -> Result<BlobStat, StorageError> {
        let path = self.object_path(key)?;
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(StorageError::unavailable(e)),
        };

        let modified = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t));

        Ok(BlobStat {
            size: meta.len(),
            modified,
        })
    }

    fn resolve_path(&self, key: &str) -> Option<PathBuf> {
        self.object_path(key).ok()
    }

    fn url_for(&self, key: &str) -> String {
        let cleaned = clean_key(key).unwrap_or_else(|_| key.to_string());
        format!("{}/{}", self.public_base, cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), "http://localhost:8080/v1/files").unwrap();
        (dir, store)
    }

    async fn read_all(mut reader: BlobReader) -> Vec<u8> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn put_then_open_round_trips() {
        let (_dir, store) = store();
        let receipt = store.put("assets/2026/08/a/mix.wav", b"RIFFdata").await.unwrap();
        assert_eq!(receipt.size, 8);
        assert_eq!(
            receipt.url,
            "http://localhost:8080/v1/files/assets/2026/08/a/mix.wav"
        );

        let body = read_all(store.open("assets/2026/08/a/mix.wav").await.unwrap()).await;
        assert_eq!(body, b"RIFFdata");
    }

    #[tokio::test]
    async fn put_overwrites() {
        let (_dir, store) = store();
        store.put("k", b"one").await.unwrap();
        store.put("k", b"two").await.unwrap();
        assert_eq!(read_all(store.open("k").await.unwrap()).await, b"two");
    }

    #[tokio::test]
    async fn open_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.open("nope").await,
            Err(StorageError::NotFound { .. })
        ));
        assert!(matches!(
            store.stat("nope").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn open_range_is_inclusive_and_bounded() {
        let (_dir, store) = store();
        store.put("r", b"0123456789").await.unwrap();

        let body = read_all(store.open_range("r", 2, 5).await.unwrap()).await;
        assert_eq!(body, b"2345");

        // Range past EOF just truncates.
        let tail = read_all(store.open_range("r", 8, 100).await.unwrap()).await;
        assert_eq!(tail, b"89");
    }

    #[tokio::test]
    async fn stat_reports_size() {
        let (_dir, store) = store();
        store.put("s", b"abcde").await.unwrap();
        let stat = store.stat("s").await.unwrap();
        assert_eq!(stat.size, 5);
        assert!(stat.modified.is_some());
    }

    #[tokio::test]
    async fn put_stream_writes_everything() {
        let (_dir, store) = store();
        let reader: BlobReader = Box::pin(std::io::Cursor::new(b"streamed bytes".to_vec()));
        let receipt = store.put_stream("st", reader).await.unwrap();
        assert_eq!(receipt.size, 14);
        assert_eq!(read_all(store.open("st").await.unwrap()).await, b"streamed bytes");
    }

    #[tokio::test]
    async fn no_object_visible_at_traversal_keys() {
        let (_dir, store) = store();
        assert!(matches!(
            store.put("../escape", b"x").await,
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[test]
    fn resolve_path_stays_under_root() {
        let (dir, store) = store();
        let path = store.resolve_path("a/b.wav").unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(store.resolve_path("a/b.wav").unwrap().ends_with("a/b.wav"));
    }
}

//! Blob storage for Jamboree.
//!
//! Produced media is addressed by POSIX-style relative keys
//! (`assets/2026/08/<uuid>/mix.wav`) and written through the [`BlobStore`]
//! trait. Two backends exist: a local filesystem store with atomic
//! write-to-temp + rename publishing, and an S3-compatible store where a
//! single PUT gives the same all-or-nothing visibility.
//!
//! Readers are plain `AsyncRead` streams so the HTTP layer can forward them
//! without buffering; `open_range` backs byte-range requests.

pub mod key;
pub mod local;
pub mod s3;

pub use key::clean_key;
pub use local::LocalStore;
pub use s3::{S3Options, S3Store};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage failures the caller can distinguish.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("no object at key {key}")]
    NotFound { key: String },

    #[error("invalid storage key {key}")]
    InvalidKey { key: String },
}

impl StorageError {
    pub(crate) fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// A sequential byte stream over stored content.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Result of a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    /// Externally resolvable URL for the stored object.
    pub url: String,
    /// Bytes written.
    pub size: u64,
}

/// Size and modification time of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobStat {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Storage backend contract.
///
/// Keys are POSIX-style relative paths; a leading `/` is stripped and
/// traversal components are rejected. Writes are create-or-overwrite and
/// never leave a partially written object visible at the key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a complete byte buffer.
    async fn put(&self, key: &str, data: &[u8]) -> Result<PutReceipt, StorageError>;

    /// Write from a sequential reader.
    async fn put_stream(&self, key: &str, reader: BlobReader) -> Result<PutReceipt, StorageError>;

    /// Open for sequential reading from the start.
    async fn open(&self, key: &str) -> Result<BlobReader, StorageError>;

    /// Open a bounded reader over the inclusive byte range `start..=end`.
    async fn open_range(
        &self,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<BlobReader, StorageError>;

    /// Size and mtime without reading content.
    async fn stat(&self, key: &str) -> Result<BlobStat, StorageError>;

    /// Filesystem path for the key, when the backend has one (local only).
    fn resolve_path(&self, key: &str) -> Option<PathBuf>;

    /// The externally resolvable URL this backend mints for a key.
    fn url_for(&self, key: &str) -> String;
}
